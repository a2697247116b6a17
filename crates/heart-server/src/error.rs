use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use heart_common::error::CommonError;
use heart_common::openai::OpenAiClientError;
use heart_common::polling::RunState;
use tracing::{error, warn};

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("assistant run {0}")]
    Run(RunState),

    #[error("assistant request failed: {0}")]
    OpenAi(#[from] OpenAiClientError),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(error = %self, "request failed");
        } else {
            warn!(error = %self, "request rejected");
        }
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
