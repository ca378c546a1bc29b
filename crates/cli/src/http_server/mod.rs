//! Health, manual trigger and restore browsing over HTTP
//!
//! Provides:
//! - `/health`, `/ready`: liveness with the persisted markers, readiness
//! - `/backup`: run a cycle now (409 while one is in flight)
//! - `/ui`: browser page with snapshots, history and preview tabs
//! - `/ui/*`: browse and restore from git commits and restic snapshots

use anyhow::Result;
use axum::routing::{get, post};
use axum::Router;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::context::AppContext;

mod backup;
mod error;
mod health;
mod ui;

pub type SharedContext = Arc<AppContext>;

pub fn router(ctx: SharedContext) -> Router {
    Router::new()
        .route("/health", get(health::handler))
        .route("/ready", get(health::ready))
        .route("/backup", post(backup::handler))
        .route("/ui", get(ui::page))
        .route("/ui/snapshots", get(ui::snapshots))
        .route("/ui/files", get(ui::files))
        .route("/ui/log", get(ui::log))
        .route("/ui/preview", get(ui::preview))
        .route("/ui/download", get(ui::download))
        .route("/ui/restore", post(ui::restore))
        .with_state(ctx)
}

/// Serve until `shutdown` resolves, then finish in-flight requests
pub async fn serve<F>(listener: TcpListener, ctx: SharedContext, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr()?;
    info!(%addr, "HTTP server listening");

    axum::serve(listener, router(ctx))
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("HTTP server stopped");
    Ok(())
}
