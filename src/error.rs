//! Error types for staffing-planner

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

use crate::platform::{AuthError, StoreError};
use crate::relay::RelayError;
use crate::schedule::workflow::TransitionError;

/// Result type for staffing-planner
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Relay(#[from] RelayError),

    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Not signed in")]
    Unauthorized,

    #[error("Admin role required")]
    Forbidden,

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Session error: {0}")]
    Session(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found<S: Into<String>>(what: S) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::Validation(_) | Error::Transition(_) | Error::Csv(_) => StatusCode::BAD_REQUEST,
            Error::Relay(RelayError::InvalidMessage(_)) => StatusCode::BAD_REQUEST,
            Error::Unauthorized | Error::Auth(AuthError::InvalidCredentials) => StatusCode::UNAUTHORIZED,
            Error::Forbidden => StatusCode::FORBIDDEN,
            Error::NotFound(_) | Error::Store(StoreError::NotFound { .. }) | Error::Auth(AuthError::NotFound(_)) => {
                StatusCode::NOT_FOUND
            }
            Error::Conflict(_) | Error::Store(StoreError::Conflict(_)) | Error::Auth(AuthError::AlreadyExists(_)) => {
                StatusCode::CONFLICT
            }
            Error::Store(_) | Error::Auth(_) | Error::Relay(_) => StatusCode::BAD_GATEWAY,
            Error::Io(_) | Error::Serialization(_) | Error::Session(_) | Error::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(serde_json::json!({
            "success": false,
            "error": self.to_string(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schedule::types::StatutCommande;

    #[test]
    fn errors_map_to_http_statuses() {
        assert_eq!(Error::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            Error::from(TransitionError::Terminal(StatutCommande::Absence)).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(Error::from(StoreError::conflict("taken")).status_code(), StatusCode::CONFLICT);
        assert_eq!(Error::from(StoreError::not_found("commandes", 1)).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(Error::from(StoreError::Backend("down".into())).status_code(), StatusCode::BAD_GATEWAY);
        assert_eq!(Error::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
    }
}
