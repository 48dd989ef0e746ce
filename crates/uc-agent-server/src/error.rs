use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use uc_agent::errors::EndpointError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Endpoint(#[from] EndpointError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Endpoint(EndpointError::ContextLengthExceeded(_)) => StatusCode::BAD_REQUEST,
            ApiError::Endpoint(
                EndpointError::RateLimited(_) | EndpointError::RetriesExhausted { .. },
            ) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Endpoint(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        tracing::error!("predict failed: {}", self);
        (self.status(), Json(json!({"error": self.to_string()}))).into_response()
    }
}
