mod logging;

use std::process::ExitCode;
use std::sync::Arc;

use inbox_cleaner::{
    serve, AccessTokenSource, AppState, ConfigError, Database, DatabaseError, GmailProvider,
    MailProvider, ProviderError, Settings, StoredTokenSource,
};
use log::info;
use tokio::net::TcpListener;

#[derive(Debug, thiserror::Error)]
enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(#[from] logging::LoggingError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Provider setup failed: {0}")]
    Provider(#[from] ProviderError),

    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Server exited with error");
            eprintln!("inbox-cleaner-server: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<(), ServerError> {
    let settings = Settings::from_env()?;
    logging::init(settings.log_format)?;

    info!(
        "Starting {} v{} for {}",
        settings.app_name,
        env!("CARGO_PKG_VERSION"),
        settings.owner_email
    );

    let db = Database::open_location(&settings.database, settings.dev_create_all)?;

    let tokens: Arc<dyn AccessTokenSource> =
        Arc::new(StoredTokenSource::from_settings(db.clone(), &settings)?);
    let provider: Arc<dyn MailProvider> = Arc::new(GmailProvider::with_base_url(
        settings.gmail_api_base.clone(),
        Arc::clone(&tokens),
    )?);

    let state = AppState::new(&settings, db, provider, tokens);
    let listener = TcpListener::bind(settings.bind_addr).await?;
    serve(listener, state, shutdown_signal()).await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections");
}
