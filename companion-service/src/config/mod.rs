use crate::services::fitness::credentials::GOOGLE_OAUTH_TOKEN_URL;
use crate::services::fitness::google_fit::GOOGLE_FIT_API_BASE;
use crate::services::fitness::UpstreamFailurePolicy;
use crate::services::providers::gemini::GEMINI_API_BASE;
use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;
const DEFAULT_AI_MAX_RETRIES: u32 = 1;

#[derive(Debug, Clone)]
pub struct CompanionConfig {
    pub common: core_config::Config,
    pub is_prod: bool,
    pub gemini: GeminiSettings,
    pub google_fit: GoogleFitSettings,
    /// Per-call timeout for both upstream providers.
    pub upstream_timeout: Duration,
    pub ai_max_retries: u32,
    /// `["*"]` allows any origin.
    pub cors_allowed_origins: Vec<String>,
    /// Accepted for compatibility; nothing is persisted.
    pub database_url: Option<String>,
    pub otlp_endpoint: Option<String>,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: Secret<String>,
    pub model: String,
    pub api_base: String,
}

#[derive(Debug, Clone)]
pub struct GoogleFitSettings {
    pub client_id: Option<String>,
    pub client_secret: Option<Secret<String>>,
    pub redirect_uri: Option<String>,
    pub token_path: PathBuf,
    pub client_secrets_path: PathBuf,
    pub api_base: String,
    pub token_url: String,
    pub failure_policy: UpstreamFailurePolicy,
    pub interactive_auth: bool,
}

impl CompanionConfig {
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build the service configuration from `lookup`. In production
    /// (`ENVIRONMENT=prod`) the API key and OAuth client settings must be set.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars {
            lookup: &lookup,
            is_prod: lookup("ENVIRONMENT").as_deref() == Some("prod"),
        };

        let api_key = vars
            .get("GOOGLE_API_KEY")
            .or_else(|| vars.get("GEMINI_API_KEY"));
        let api_key = vars.secret("GOOGLE_API_KEY", api_key)?.unwrap_or_default();

        let client_id = vars.secret("GOOGLE_FIT_CLIENT_ID", vars.get("GOOGLE_FIT_CLIENT_ID"))?;
        let client_secret =
            vars.secret("GOOGLE_FIT_CLIENT_SECRET", vars.get("GOOGLE_FIT_CLIENT_SECRET"))?;

        let fail_open = vars.flag("GOOGLE_FIT_FAIL_OPEN", true)?;
        let interactive_auth = vars.flag("GOOGLE_FIT_INTERACTIVE_AUTH", !vars.is_prod)?;

        Ok(CompanionConfig {
            common,
            is_prod: vars.is_prod,
            gemini: GeminiSettings {
                api_key: Secret::new(api_key),
                model: vars.or("GEMINI_MODEL", DEFAULT_GEMINI_MODEL),
                api_base: vars.or("GEMINI_API_BASE", GEMINI_API_BASE),
            },
            google_fit: GoogleFitSettings {
                client_id,
                client_secret: client_secret.map(Secret::new),
                redirect_uri: vars.get("GOOGLE_FIT_REDIRECT_URI"),
                token_path: vars.or("GOOGLE_FIT_TOKEN_PATH", "token.json").into(),
                client_secrets_path: vars
                    .or("GOOGLE_FIT_CLIENT_SECRETS_PATH", "credentials.json")
                    .into(),
                api_base: vars.or("GOOGLE_FIT_API_BASE", GOOGLE_FIT_API_BASE),
                token_url: vars.or("GOOGLE_OAUTH_TOKEN_URL", GOOGLE_OAUTH_TOKEN_URL),
                failure_policy: if fail_open {
                    UpstreamFailurePolicy::DegradeToEmpty
                } else {
                    UpstreamFailurePolicy::Propagate
                },
                interactive_auth,
            },
            upstream_timeout: Duration::from_secs(
                vars.parsed("UPSTREAM_TIMEOUT_SECS", DEFAULT_UPSTREAM_TIMEOUT_SECS)?,
            ),
            ai_max_retries: vars.parsed("AI_MAX_RETRIES", DEFAULT_AI_MAX_RETRIES)?,
            cors_allowed_origins: vars
                .or("CORS_ALLOWED_ORIGINS", "*")
                .split(',')
                .map(str::trim)
                .filter(|o| !o.is_empty())
                .map(str::to_string)
                .collect(),
            database_url: vars.get("DATABASE_URL"),
            otlp_endpoint: vars.get("OTLP_ENDPOINT"),
        })
    }
}

struct Vars<'a, F: Fn(&str) -> Option<String>> {
    lookup: &'a F,
    is_prod: bool,
}

impl<F: Fn(&str) -> Option<String>> Vars<'_, F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key).filter(|v| !v.is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    /// Secrets are optional in development and mandatory in production.
    fn secret(&self, key: &str, value: Option<String>) -> Result<Option<String>, AppError> {
        match value {
            Some(v) => Ok(Some(v)),
            None if self.is_prod => Err(AppError::ConfigError(anyhow::anyhow!(
                "{} is required in production but not set",
                key
            ))),
            None => Ok(None),
        }
    }

    fn flag(&self, key: &str, default: bool) -> Result<bool, AppError> {
        match self.get(key) {
            None => Ok(default),
            Some(v) => match v.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(AppError::ConfigError(anyhow::anyhow!(
                    "{} must be a boolean, got '{}'",
                    key,
                    v
                ))),
            },
        }
    }

    fn parsed<T: std::str::FromStr>(&self, key: &str, default: T) -> Result<T, AppError>
    where
        T::Err: std::fmt::Display,
    {
        match self.get(key) {
            None => Ok(default),
            Some(v) => v.parse().map_err(|e| {
                AppError::ConfigError(anyhow::anyhow!("{} is invalid ('{}'): {}", key, v, e))
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::collections::HashMap;

    fn common() -> core_config::Config {
        core_config::Config {
            host: "127.0.0.1".to_string(),
            port: 0,
            log_level: "info".to_string(),
        }
    }

    fn load(vars: &[(&str, &str)]) -> Result<CompanionConfig, AppError> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        CompanionConfig::from_lookup(common(), |key| map.get(key).cloned())
    }

    #[test]
    fn development_defaults() {
        let config = load(&[]).unwrap();

        assert!(!config.is_prod);
        assert_eq!(config.gemini.model, "gemini-2.0-flash");
        assert_eq!(config.gemini.api_key.expose_secret(), "");
        assert_eq!(config.google_fit.token_path, PathBuf::from("token.json"));
        assert_eq!(config.google_fit.failure_policy, UpstreamFailurePolicy::DegradeToEmpty);
        assert!(config.google_fit.interactive_auth);
        assert_eq!(config.upstream_timeout, Duration::from_secs(30));
        assert_eq!(config.ai_max_retries, 1);
        assert_eq!(config.cors_allowed_origins, vec!["*"]);
    }

    #[test]
    fn gemini_key_alias_is_accepted() {
        let config = load(&[("GEMINI_API_KEY", "alias-key")]).unwrap();
        assert_eq!(config.gemini.api_key.expose_secret(), "alias-key");

        let config =
            load(&[("GEMINI_API_KEY", "alias-key"), ("GOOGLE_API_KEY", "primary")]).unwrap();
        assert_eq!(config.gemini.api_key.expose_secret(), "primary");
    }

    #[test]
    fn production_requires_secrets() {
        let err = load(&[("ENVIRONMENT", "prod")]).unwrap_err();
        assert!(err.to_string().contains("GOOGLE_API_KEY"));

        let config = load(&[
            ("ENVIRONMENT", "prod"),
            ("GOOGLE_API_KEY", "k"),
            ("GOOGLE_FIT_CLIENT_ID", "id"),
            ("GOOGLE_FIT_CLIENT_SECRET", "secret"),
        ])
        .unwrap();
        assert!(config.is_prod);
        assert!(!config.google_fit.interactive_auth);
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("GOOGLE_FIT_FAIL_OPEN", "false"),
            ("UPSTREAM_TIMEOUT_SECS", "5"),
            ("AI_MAX_RETRIES", "0"),
            ("CORS_ALLOWED_ORIGINS", "http://localhost:3000, https://app.example.com"),
        ])
        .unwrap();

        assert_eq!(config.google_fit.failure_policy, UpstreamFailurePolicy::Propagate);
        assert_eq!(config.upstream_timeout, Duration::from_secs(5));
        assert_eq!(config.ai_max_retries, 0);
        assert_eq!(
            config.cors_allowed_origins,
            vec!["http://localhost:3000", "https://app.example.com"]
        );
    }

    #[test]
    fn malformed_values_are_config_errors() {
        assert!(load(&[("UPSTREAM_TIMEOUT_SECS", "soon")]).is_err());
        assert!(load(&[("GOOGLE_FIT_FAIL_OPEN", "maybe")]).is_err());
    }
}
