//! HTTP server - axum front end for the agent

mod error;
mod routes;

use std::sync::Arc;

use log::info;
use tokio::net::TcpListener;

use crate::agent::Agent;
use crate::error::Result;

pub use error::{AppError, ErrorBody};
pub use routes::{AskRequest, AskResponse, build_router};

/// Serve the agent on `bind` until Ctrl-C
pub async fn serve(agent: Arc<Agent>, bind: &str) -> Result<()> {
    let listener = TcpListener::bind(bind).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, build_router(agent))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("Shutdown requested");
    }
}
