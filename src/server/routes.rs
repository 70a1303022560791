//! HTTP routes

use std::sync::Arc;

use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::routing::{get, post};
use axum::{Json, Router};
use log::warn;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use crate::agent::Agent;
use crate::error::AgentError;
use crate::tools::ToolDescriptor;

use super::error::AppError;

#[derive(Debug, Serialize, Deserialize)]
pub struct AskRequest {
    pub prompt: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AskResponse {
    pub answer: String,
}

pub fn build_router(agent: Arc<Agent>) -> Router {
    Router::new()
        .route("/ask", post(ask))
        .route("/health", get(health))
        .route("/tools", get(tools))
        .with_state(agent)
}

async fn ask(
    State(agent): State<Arc<Agent>>,
    payload: Result<Json<AskRequest>, JsonRejection>,
) -> Result<Json<AskResponse>, AppError> {
    let Json(request) = payload.map_err(|e| AgentError::InvalidRequest(e.body_text()))?;

    // Dropped with the handler future, so a client disconnect cancels the loop
    let cancel = CancellationToken::new();
    let _disconnect = cancel.clone().drop_guard();

    // Past the deadline the loop is cancelled, not dropped, so it still finishes and audits
    let timeout = agent.config().server.request_timeout();
    let ask = agent.ask(&request.prompt, &cancel);
    tokio::pin!(ask);
    let result = tokio::select! {
        result = &mut ask => result,
        _ = tokio::time::sleep(timeout) => {
            warn!("Request exceeded {:?}, cancelling", timeout);
            cancel.cancel();
            ask.await
        }
    };

    Ok(Json(AskResponse { answer: result? }))
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn tools(State(agent): State<Arc<Agent>>) -> Json<Vec<ToolDescriptor>> {
    Json(agent.registry().descriptors().to_vec())
}
