//! OAuth credential lifecycle for Google Fit.
//!
//! States are Unloaded, Loaded (valid or expired) and Authorizing. Every
//! transition runs while holding the manager's async mutex, so at most one
//! file load, refresh or authorization is in flight at a time.

use async_trait::async_trait;
use axum::{extract::Query, extract::State, response::Html, Router};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};

pub const GOOGLE_OAUTH_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_OAUTH_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

pub const FITNESS_SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/fitness.activity.read",
    "https://www.googleapis.com/auth/fitness.heart_rate.read",
    "https://www.googleapis.com/auth/fitness.sleep.read",
];

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// How long the consent flow waits for the browser redirect.
const CONSENT_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Error, Clone, PartialEq)]
pub enum CredentialError {
    #[error("Token file error: {0}")]
    TokenFile(String),

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    #[error("Authorization failed: {0}")]
    AuthorizationFailed(String),

    #[error("Interactive authorization is disabled and no usable token is stored")]
    AuthorizationDisabled,
}

/// Stored OAuth credential, laid out like Google's authorized-user JSON so an
/// existing `token.json` can be reused.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct Credential {
    pub token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("token", &"[REDACTED]")
            .field("has_refresh_token", &self.refresh_token.is_some())
            .field("client_id", &self.client_id)
            .field("scopes", &self.scopes)
            .field("expiry", &self.expiry)
            .finish()
    }
}

impl Credential {
    /// A credential without an expiry never expires.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - ChronoDuration::seconds(EXPIRY_SKEW_SECS) > now,
            None => true,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(Utc::now())
    }
}

/// Token endpoint reply for both the refresh and the code exchange grants.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    scope: Option<String>,
}

/// OAuth client settings taken from configuration.
#[derive(Debug, Clone)]
pub struct OAuthSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<Secret<String>>,
    pub token_url: String,
    pub scopes: Vec<String>,
}

impl Default for OAuthSettings {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            token_url: GOOGLE_OAUTH_TOKEN_URL.to_string(),
            scopes: FITNESS_SCOPES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Token file on disk. Writes go to a sibling temp file which is then renamed
/// over the target.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored credential. A missing file is `Ok(None)`.
    pub async fn load(&self) -> Result<Option<Credential>, CredentialError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(CredentialError::TokenFile(format!(
                    "{}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| CredentialError::TokenFile(format!("{}: {}", self.path.display(), e)))
    }

    pub async fn save(&self, credential: &Credential) -> Result<(), CredentialError> {
        let json = serde_json::to_string_pretty(credential)
            .map_err(|e| CredentialError::TokenFile(e.to_string()))?;

        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        let io_err =
            |e: std::io::Error| CredentialError::TokenFile(format!("{}: {}", tmp.display(), e));
        tokio::fs::write(&tmp, json).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;

        Ok(())
    }
}

/// Obtains a brand-new credential when nothing usable is stored.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self) -> Result<Credential, CredentialError>;
}

/// Authorizer for headless deployments.
pub struct DisabledAuthorizer;

#[async_trait]
impl Authorizer for DisabledAuthorizer {
    async fn authorize(&self) -> Result<Credential, CredentialError> {
        Err(CredentialError::AuthorizationDisabled)
    }
}

/// `installed` / `web` section of a downloaded client-secrets file.
#[derive(Debug, Clone, Deserialize)]
struct ClientSecrets {
    client_id: String,
    client_secret: String,
    #[serde(default)]
    auth_uri: Option<String>,
    #[serde(default)]
    token_uri: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    #[serde(default)]
    installed: Option<ClientSecrets>,
    #[serde(default)]
    web: Option<ClientSecrets>,
}

#[derive(Debug, Deserialize)]
struct ConsentCallback {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

type CallbackSender = Arc<std::sync::Mutex<Option<oneshot::Sender<ConsentCallback>>>>;

/// Interactive installed-app consent flow: listens on a loopback port, logs the
/// consent URL, waits for the redirect and exchanges the code for tokens.
pub struct ConsentAuthorizer {
    client_secrets_path: PathBuf,
    redirect_uri: Option<String>,
    settings: OAuthSettings,
    http: Client,
}

impl ConsentAuthorizer {
    pub fn new(
        client_secrets_path: impl Into<PathBuf>,
        redirect_uri: Option<String>,
        settings: OAuthSettings,
        http: Client,
    ) -> Self {
        Self {
            client_secrets_path: client_secrets_path.into(),
            redirect_uri,
            settings,
            http,
        }
    }

    /// Client id/secret from the secrets file, falling back to configuration.
    async fn client_secrets(&self) -> Result<ClientSecrets, CredentialError> {
        match tokio::fs::read_to_string(&self.client_secrets_path).await {
            Ok(raw) => {
                let file: ClientSecretsFile = serde_json::from_str(&raw).map_err(|e| {
                    CredentialError::AuthorizationFailed(format!(
                        "{}: {}",
                        self.client_secrets_path.display(),
                        e
                    ))
                })?;
                file.installed.or(file.web).ok_or_else(|| {
                    CredentialError::AuthorizationFailed(
                        "Client secrets file has no 'installed' or 'web' section".to_string(),
                    )
                })
            }
            Err(e) => match (&self.settings.client_id, &self.settings.client_secret) {
                (Some(id), Some(secret)) => Ok(ClientSecrets {
                    client_id: id.clone(),
                    client_secret: secret.expose_secret().clone(),
                    auth_uri: None,
                    token_uri: None,
                }),
                _ => Err(CredentialError::AuthorizationFailed(format!(
                    "{}: {}",
                    self.client_secrets_path.display(),
                    e
                ))),
            },
        }
    }

    async fn bind_listener(&self) -> Result<(TcpListener, String), CredentialError> {
        let failed = CredentialError::AuthorizationFailed;

        match &self.redirect_uri {
            Some(uri) => {
                let url = Url::parse(uri).map_err(|e| failed(format!("Redirect URI: {}", e)))?;
                let host = url.host_str().unwrap_or("127.0.0.1").to_string();
                let port = url.port_or_known_default().unwrap_or(80);
                let listener = TcpListener::bind((host.as_str(), port))
                    .await
                    .map_err(|e| failed(format!("Bind {}:{}: {}", host, port, e)))?;
                Ok((listener, uri.clone()))
            }
            None => {
                let listener = TcpListener::bind("127.0.0.1:0")
                    .await
                    .map_err(|e| failed(format!("Bind loopback listener: {}", e)))?;
                let port = listener
                    .local_addr()
                    .map_err(|e| failed(e.to_string()))?
                    .port();
                Ok((listener, format!("http://127.0.0.1:{}/", port)))
            }
        }
    }

    fn consent_url(
        &self,
        secrets: &ClientSecrets,
        redirect_uri: &str,
        state: &str,
    ) -> Result<Url, CredentialError> {
        let auth_uri = secrets.auth_uri.as_deref().unwrap_or(GOOGLE_OAUTH_AUTH_URL);
        let scope = self.settings.scopes.join(" ");

        Url::parse_with_params(
            auth_uri,
            &[
                ("response_type", "code"),
                ("client_id", secrets.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", scope.as_str()),
                ("access_type", "offline"),
                ("prompt", "consent"),
                ("state", state),
            ],
        )
        .map_err(|e| CredentialError::AuthorizationFailed(format!("Consent URL: {}", e)))
    }

    async fn await_callback(listener: TcpListener) -> Result<ConsentCallback, CredentialError> {
        let (tx, rx) = oneshot::channel::<ConsentCallback>();
        let sender: CallbackSender = Arc::new(std::sync::Mutex::new(Some(tx)));

        async fn callback(
            State(sender): State<CallbackSender>,
            Query(params): Query<ConsentCallback>,
        ) -> Html<&'static str> {
            if let Some(tx) = sender.lock().ok().and_then(|mut s| s.take()) {
                let _ = tx.send(params);
            }
            Html("<p>Authorization complete. You may close this window.</p>")
        }

        // The redirect URI may carry any path, so every path is the callback.
        let app = Router::new().fallback(callback).with_state(sender);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let server = tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
        });

        let result = tokio::time::timeout(CONSENT_TIMEOUT, rx).await;
        let _ = shutdown_tx.send(());
        let _ = server.await;

        match result {
            Ok(Ok(params)) => Ok(params),
            Ok(Err(_)) => Err(CredentialError::AuthorizationFailed(
                "Consent callback channel closed".to_string(),
            )),
            Err(_) => Err(CredentialError::AuthorizationFailed(
                "Timed out waiting for consent".to_string(),
            )),
        }
    }
}

#[async_trait]
impl Authorizer for ConsentAuthorizer {
    async fn authorize(&self) -> Result<Credential, CredentialError> {
        let secrets = self.client_secrets().await?;
        let (listener, redirect_uri) = self.bind_listener().await?;
        let state = uuid::Uuid::new_v4().to_string();
        let url = self.consent_url(&secrets, &redirect_uri, &state)?;

        tracing::info!(consent_url = %url, "Open this URL to authorize Google Fit access");

        let callback = Self::await_callback(listener).await?;
        if let Some(error) = callback.error {
            return Err(CredentialError::AuthorizationFailed(error));
        }
        if callback.state.as_deref() != Some(state.as_str()) {
            return Err(CredentialError::AuthorizationFailed(
                "State mismatch in consent callback".to_string(),
            ));
        }
        let code = callback.code.ok_or_else(|| {
            CredentialError::AuthorizationFailed("Consent callback carried no code".to_string())
        })?;

        let token_uri = secrets
            .token_uri
            .clone()
            .unwrap_or_else(|| self.settings.token_url.clone());

        let reply = post_token_request(
            &self.http,
            &token_uri,
            &[
                ("grant_type", "authorization_code"),
                ("code", code.as_str()),
                ("client_id", secrets.client_id.as_str()),
                ("client_secret", secrets.client_secret.as_str()),
                ("redirect_uri", redirect_uri.as_str()),
            ],
        )
        .await
        .map_err(CredentialError::AuthorizationFailed)?;

        Ok(Credential {
            token: reply.access_token,
            refresh_token: reply.refresh_token,
            token_uri: Some(token_uri),
            client_id: Some(secrets.client_id),
            client_secret: Some(secrets.client_secret),
            scopes: scopes_from(reply.scope.as_deref(), &self.settings.scopes),
            expiry: expiry_from(reply.expires_in).map_err(CredentialError::AuthorizationFailed)?,
        })
    }
}

async fn post_token_request(
    http: &Client,
    url: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse, String> {
    let response = http
        .post(url)
        .form(form)
        .send()
        .await
        .map_err(|e| e.to_string())?;

    let status = response.status();
    let body = response.text().await.map_err(|e| e.to_string())?;
    if !status.is_success() {
        return Err(format!("token endpoint returned {}: {}", status, body));
    }

    serde_json::from_str(&body).map_err(|e| format!("token endpoint reply: {}", e))
}

/// Absolute expiry for a token lifetime in seconds.
fn expiry_from(expires_in: Option<i64>) -> Result<Option<DateTime<Utc>>, String> {
    expires_in
        .map(|secs| {
            ChronoDuration::try_seconds(secs)
                .and_then(|lifetime| Utc::now().checked_add_signed(lifetime))
                .ok_or_else(|| format!("token lifetime out of range: {}s", secs))
        })
        .transpose()
}

fn scopes_from(granted: Option<&str>, fallback: &[String]) -> Vec<String> {
    match granted {
        Some(s) if !s.trim().is_empty() => s.split_whitespace().map(str::to_string).collect(),
        _ => fallback.to_vec(),
    }
}

enum CredentialState {
    Unloaded,
    Loaded(Credential),
}

/// Owns the cached credential and drives load, refresh and authorization.
pub struct CredentialManager {
    store: TokenStore,
    settings: OAuthSettings,
    authorizer: Arc<dyn Authorizer>,
    http: Client,
    state: Mutex<CredentialState>,
}

impl CredentialManager {
    pub fn new(
        store: TokenStore,
        settings: OAuthSettings,
        authorizer: Arc<dyn Authorizer>,
        http: Client,
    ) -> Self {
        Self {
            store,
            settings,
            authorizer,
            http,
            state: Mutex::new(CredentialState::Unloaded),
        }
    }

    /// Return a usable access token, loading, refreshing or authorizing as
    /// needed.
    pub async fn access_token(&self) -> Result<String, CredentialError> {
        let mut state = self.state.lock().await;

        if let CredentialState::Unloaded = *state {
            match self.store.load().await {
                Ok(Some(stored)) => {
                    tracing::debug!(
                        path = %self.store.path().display(),
                        "Loaded stored Google Fit credential"
                    );
                    *state = CredentialState::Loaded(stored);
                }
                Ok(None) => {}
                // Left Unloaded so the authorizer can replace the file.
                Err(e) => tracing::warn!(error = %e, "Ignoring unreadable Google Fit token file"),
            }
        }

        let cached = match &*state {
            CredentialState::Loaded(credential) => Some(credential.clone()),
            CredentialState::Unloaded => None,
        };

        if let Some(credential) = cached {
            if credential.is_valid() {
                return Ok(credential.token);
            }

            if credential.refresh_token.is_some() {
                match self.refresh(&credential).await {
                    Ok(refreshed) => {
                        tracing::info!("Refreshed Google Fit access token");
                        return Ok(self.persist(&mut state, refreshed).await);
                    }
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            "Token refresh failed; falling back to authorization"
                        );
                    }
                }
            }
        }

        let authorized = self.authorizer.authorize().await?;
        tracing::info!("Obtained new Google Fit credential");
        Ok(self.persist(&mut state, authorized).await)
    }

    /// Mark the cached credential expired after the provider rejected it.
    pub async fn invalidate(&self) {
        let mut state = self.state.lock().await;
        if let CredentialState::Loaded(credential) = &mut *state {
            credential.expiry = Some(Utc::now() - ChronoDuration::days(1));
            tracing::info!("Invalidated cached Google Fit credential");
        }
    }

    async fn refresh(&self, credential: &Credential) -> Result<Credential, CredentialError> {
        let refresh_token = credential
            .refresh_token
            .as_deref()
            .ok_or_else(|| CredentialError::RefreshFailed("No refresh token".to_string()))?;

        let client_id = credential
            .client_id
            .clone()
            .or_else(|| self.settings.client_id.clone())
            .ok_or_else(|| CredentialError::RefreshFailed("No OAuth client id".to_string()))?;
        let client_secret = credential
            .client_secret
            .clone()
            .or_else(|| {
                self.settings
                    .client_secret
                    .as_ref()
                    .map(|s| s.expose_secret().clone())
            })
            .ok_or_else(|| CredentialError::RefreshFailed("No OAuth client secret".to_string()))?;

        let token_uri = credential
            .token_uri
            .clone()
            .unwrap_or_else(|| self.settings.token_url.clone());

        let reply = post_token_request(
            &self.http,
            &token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", client_id.as_str()),
                ("client_secret", client_secret.as_str()),
            ],
        )
        .await
        .map_err(CredentialError::RefreshFailed)?;

        Ok(Credential {
            token: reply.access_token,
            refresh_token: reply
                .refresh_token
                .or_else(|| credential.refresh_token.clone()),
            token_uri: Some(token_uri),
            client_id: Some(client_id),
            client_secret: Some(client_secret),
            scopes: scopes_from(reply.scope.as_deref(), &credential.scopes),
            expiry: expiry_from(reply.expires_in).map_err(CredentialError::RefreshFailed)?,
        })
    }

    /// Cache the credential and write it to the token file. A failed write
    /// is logged; the in-memory credential is still used.
    async fn persist(&self, state: &mut CredentialState, credential: Credential) -> String {
        if let Err(e) = self.store.save(&credential).await {
            tracing::warn!(error = %e, "Failed to persist Google Fit credential");
        }
        let token = credential.token.clone();
        *state = CredentialState::Loaded(credential);
        token
    }
}
