use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;

/// Failure kinds of one upload pass.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("OpenAI API key is not configured")]
    ConfigurationMissing,

    #[error("{0}")]
    InputInvalid(String),

    #[error("Uploaded file is too large: {0}")]
    InputTooLarge(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("upstream request timed out after {0} seconds")]
    UpstreamTimeout(u64),

    #[error("could not parse model response: {0}")]
    ResponseUnparseable(String),

    #[error("No dishes found in the menu image")]
    NoDishesFound,

    #[error("history persistence failed: {0}")]
    Persistence(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::ConfigurationMissing => StatusCode::SERVICE_UNAVAILABLE,
            Self::InputInvalid(_) => StatusCode::BAD_REQUEST,
            Self::InputTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::NoDishesFound => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Upstream(_) | Self::ResponseUnparseable(_) => StatusCode::BAD_GATEWAY,
            Self::UpstreamTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            Self::Persistence(_) | Self::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Classifies a transport error, keeping timeouts distinct.
    #[must_use]
    pub fn from_reqwest(e: &reqwest::Error, timeout_secs: u64) -> Self {
        if e.is_timeout() {
            Self::UpstreamTimeout(timeout_secs)
        } else {
            Self::Upstream(e.to_string())
        }
    }
}

#[derive(Debug)]
pub enum AppError {
    /// Return just a status code with an empty body.
    Status(StatusCode),
    /// A pipeline failure; status derived from its kind.
    Pipeline(PipelineError),
    /// Internal error -> 500 with JSON body; logged.
    Anyhow(anyhow::Error),
}

impl From<StatusCode> for AppError {
    fn from(code: StatusCode) -> Self {
        Self::Status(code)
    }
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        Self::Pipeline(e)
    }
}

impl From<anyhow::Error> for AppError {
    fn from(e: anyhow::Error) -> Self {
        Self::Anyhow(e)
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        Self::Anyhow(e.into())
    }
}

impl From<axum::extract::multipart::MultipartError> for AppError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            return Self::Pipeline(PipelineError::InputTooLarge(e.body_text()));
        }
        Self::Pipeline(PipelineError::InputInvalid(format!("multipart error: {e}")))
    }
}

#[derive(Serialize)]
struct ErrBody {
    error: String,
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            Self::Status(code) => code.into_response(),
            Self::Pipeline(err) => {
                let status = err.status();
                if status.is_server_error() {
                    tracing::error!(%status, "{err}");
                } else {
                    tracing::warn!(%status, "{err}");
                }
                let body = Json(ErrBody {
                    error: err.to_string(),
                });
                (status, body).into_response()
            }
            Self::Anyhow(err) => {
                tracing::error!("{:#}", err);
                let body = Json(ErrBody {
                    error: err.to_string(),
                });
                (StatusCode::INTERNAL_SERVER_ERROR, body).into_response()
            }
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;
