use companion_service::config::CompanionConfig;
use companion_service::startup::Application;
use service_core::observability::init_tracing;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = CompanionConfig::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        std::io::Error::other(format!("Configuration error: {}", e))
    })?;

    init_tracing(
        "companion-service",
        &config.common.log_level,
        config.otlp_endpoint.as_deref(),
    );

    if config.database_url.is_some() {
        tracing::info!("DATABASE_URL is set but this service keeps no persistent state");
    }

    let application = Application::build(config).await.map_err(|e| {
        tracing::error!("Failed to build application: {}", e);
        std::io::Error::other(format!("Startup error: {}", e))
    })?;

    application.run_until_stopped().await
}
