//! Application startup and lifecycle management.

use crate::config::CompanionConfig;
use crate::handlers::{health, health_data, metrics, symptoms};
use crate::services::fitness::{
    Authorizer, ConsentAuthorizer, CredentialManager, DisabledAuthorizer, GoogleFitClient,
    GoogleFitConfig, OAuthSettings, TokenStore,
};
use crate::services::metrics::{init_metrics, metrics_middleware};
use crate::services::providers::gemini::{GeminiConfig, GeminiTextProvider};
use crate::services::{FitnessProvider, HealthAssistant};
use axum::{
    body::Body,
    http::{HeaderValue, Request},
    middleware,
    routing::{get, post},
    Router,
};
use secrecy::ExposeSecret;
use service_core::error::AppError;
use service_core::middleware::{request_id_middleware, REQUEST_ID_HEADER};
use service_core::retry::RetryConfig;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub assistant: Arc<HealthAssistant>,
    pub fitness: Arc<dyn FitnessProvider>,
    /// Retry policy for AI calls.
    pub retry: RetryConfig,
}

impl AppState {
    /// Construct the upstream clients from configuration.
    pub fn from_config(config: &CompanionConfig) -> Result<Self, AppError> {
        let config_error =
            |e: &dyn std::fmt::Display| AppError::ConfigError(anyhow::anyhow!("{}", e));

        if config.gemini.api_key.expose_secret().is_empty() {
            tracing::warn!("GOOGLE_API_KEY is not set; symptom analysis will fail");
        }

        let text_provider = GeminiTextProvider::new(GeminiConfig {
            api_key: config.gemini.api_key.clone(),
            model: config.gemini.model.clone(),
            api_base: config.gemini.api_base.clone(),
            timeout: config.upstream_timeout,
        })
        .map_err(|e| config_error(&e))?;

        tracing::info!(model = %config.gemini.model, "Initialized Gemini text provider");

        let fit = &config.google_fit;
        let oauth_http = reqwest::Client::builder()
            .timeout(config.upstream_timeout)
            .build()
            .map_err(|e| config_error(&e))?;

        let settings = OAuthSettings {
            client_id: fit.client_id.clone(),
            client_secret: fit.client_secret.clone(),
            token_url: fit.token_url.clone(),
            ..OAuthSettings::default()
        };

        let authorizer: Arc<dyn Authorizer> = if fit.interactive_auth {
            Arc::new(ConsentAuthorizer::new(
                fit.client_secrets_path.clone(),
                fit.redirect_uri.clone(),
                settings.clone(),
                oauth_http.clone(),
            ))
        } else {
            Arc::new(DisabledAuthorizer)
        };

        let credentials = Arc::new(CredentialManager::new(
            TokenStore::new(fit.token_path.clone()),
            settings,
            authorizer,
            oauth_http,
        ));

        let fitness = GoogleFitClient::new(
            GoogleFitConfig {
                api_base: fit.api_base.clone(),
                timeout: config.upstream_timeout,
                failure_policy: fit.failure_policy,
            },
            credentials,
        )
        .map_err(|e| config_error(&e))?;

        tracing::info!(
            token_path = %fit.token_path.display(),
            interactive_auth = fit.interactive_auth,
            failure_policy = ?fit.failure_policy,
            "Initialized Google Fit client"
        );

        Ok(Self {
            assistant: Arc::new(HealthAssistant::new(Arc::new(text_provider))),
            fitness: Arc::new(fitness),
            retry: RetryConfig::with_max_retries(config.ai_max_retries),
        })
    }
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origin = if allowed_origins.is_empty() || allowed_origins.iter().any(|o| o == "*") {
        AllowOrigin::from(Any)
    } else {
        AllowOrigin::list(
            allowed_origins
                .iter()
                .filter_map(|o| HeaderValue::from_str(o).ok()),
        )
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Build the HTTP router with all endpoints and middleware.
pub fn build_router(state: AppState, allowed_origins: &[String]) -> Router {
    let trace_layer = TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
        let request_id = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-");
        tracing::info_span!(
            "http_request",
            method = %request.method(),
            uri = %request.uri(),
            request_id = %request_id,
        )
    });

    Router::new()
        .route("/api/analyze_symptoms", post(symptoms::analyze_symptoms))
        .route("/api/generate_followup", post(symptoms::generate_followup))
        .route("/api/triage", post(symptoms::triage))
        .route("/api/preliminary_analysis", post(symptoms::preliminary_analysis))
        .route("/api/health_data/:days", get(health_data::get_health_data))
        .route("/health", get(health::health_check))
        .route("/metrics", get(metrics::metrics))
        .with_state(state)
        .layer(middleware::from_fn(metrics_middleware))
        .layer(trace_layer)
        .layer(cors_layer(allowed_origins))
        .layer(middleware::from_fn(request_id_middleware))
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    router: Router,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: CompanionConfig) -> Result<Self, AppError> {
        init_metrics().map_err(|e| AppError::ConfigError(anyhow::anyhow!("metrics: {}", e)))?;

        let state = AppState::from_config(&config)?;
        let router = build_router(state, &config.cors_allowed_origins);

        // Port 0 = random port for testing
        let addr = format!("{}:{}", config.common.host, config.common.port);
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            tracing::error!("Failed to bind HTTP listener to {}: {}", addr, e);
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port, "Companion service listening");

        Ok(Self {
            port,
            listener,
            router,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Serve until SIGINT/SIGTERM.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        axum::serve(self.listener, self.router)
            .with_graceful_shutdown(shutdown_signal())
            .await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
