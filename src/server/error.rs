//! Mapping agent failures onto HTTP responses

use axum::Json;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use log::{error, info};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

/// Seconds a client should wait before retrying a 503
const RETRY_AFTER_SECS: &str = "5";

/// Wire form of a failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub kind: String,
    pub message: String,
}

/// Handler error; never carries raw database text to the client
#[derive(Debug)]
pub struct AppError(pub AgentError);

impl From<AgentError> for AppError {
    fn from(err: AgentError) -> Self {
        AppError(err)
    }
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AgentError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            AgentError::Cancelled => StatusCode::REQUEST_TIMEOUT,
            AgentError::OracleUnavailable(_) => StatusCode::BAD_GATEWAY,
            AgentError::ResourceExhausted(_) | AgentError::DatabaseUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!("Request failed ({}): {}", status, self.0);
        } else {
            info!("Request rejected ({}): {}", status, self.0);
        }

        let body = Json(ErrorBody {
            kind: self.0.kind().to_string(),
            message: self.0.safe_message(),
        });

        if status == StatusCode::SERVICE_UNAVAILABLE {
            (status, [(header::RETRY_AFTER, RETRY_AFTER_SECS)], body).into_response()
        } else {
            (status, body).into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        let cases = [
            (AgentError::InvalidRequest("x".into()), StatusCode::BAD_REQUEST),
            (AgentError::StepLimitExceeded { max_steps: 15 }, StatusCode::INTERNAL_SERVER_ERROR),
            (
                AgentError::MalformedStepBudgetExceeded { malformed: 4, budget: 3 },
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (AgentError::OracleUnavailable("401".into()), StatusCode::BAD_GATEWAY),
            (AgentError::ResourceExhausted("busy".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AgentError::DatabaseUnavailable("gone".into()), StatusCode::SERVICE_UNAVAILABLE),
            (AgentError::Cancelled, StatusCode::REQUEST_TIMEOUT),
        ];
        for (err, status) in cases {
            assert_eq!(AppError(err).status(), status);
        }
    }

    #[test]
    fn test_retry_after_on_unavailable() {
        let response = AppError(AgentError::ResourceExhausted("busy".into())).into_response();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), RETRY_AFTER_SECS);

        let response = AppError(AgentError::StepLimitExceeded { max_steps: 1 }).into_response();
        assert!(response.headers().get(header::RETRY_AFTER).is_none());
    }
}
