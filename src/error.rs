use actix_web::http::StatusCode;
use actix_web::ResponseError;

use thiserror::Error;

use crate::repo::StoreError;

pub type RestResult<T> = Result<T, RestError>;

#[derive(Debug, Error)]
pub enum RestError {
    #[error("Parse Error: {0}")]
    ParseError(String),

    #[error("Failed to authenticate")]
    FailedToAuthenticate(anyhow::Error),

    #[error("Internal Server Error: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<StoreError> for RestError {
    fn from(e: StoreError) -> Self {
        tracing::error!(error = %e, "Store error in controller");
        Self::InternalError("Database error".into())
    }
}

impl ResponseError for RestError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::ParseError(_) => StatusCode::BAD_REQUEST,
            Self::FailedToAuthenticate(_) => StatusCode::UNAUTHORIZED,
            Self::InternalError(_) | Self::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}
