//! HTTP surface.

use std::future::Future;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub mod error;
pub mod routes;

pub use error::ApiError;

use crate::config::Settings;
use crate::db::Database;
use crate::provider::{AccessTokenSource, MailProvider};
use crate::scan::{AggregateStore, ScanService};

/// Shared handler state.
#[derive(Clone, Debug)]
pub struct AppState {
    pub app_name: String,
    pub scans: ScanService,
}

impl AppState {
    pub fn new(
        settings: &Settings,
        db: Database,
        provider: Arc<dyn MailProvider>,
        tokens: Arc<dyn AccessTokenSource>,
    ) -> Self {
        let store = AggregateStore::new(db, settings.counting_mode);
        let scans = ScanService::new(provider, tokens, store, settings.owner_email.clone())
            .with_retry(settings.retry);
        Self {
            app_name: settings.app_name.clone(),
            scans,
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(routes::root))
        .route("/health", get(routes::health))
        .route("/version", get(routes::version))
        .route("/scan", post(routes::scan))
        .route("/scan/cancel", post(routes::cancel_scan))
        .route("/metrics", get(routes::metrics))
        .route("/reports/latest", get(routes::latest_report))
        .route("/reports/latest.pdf", get(routes::latest_report_pdf))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Serves the API on `listener` until `shutdown` resolves.
pub async fn serve<F>(listener: TcpListener, state: AppState, shutdown: F) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Inbox cleaner API listening on {}", addr);
    }
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
}
