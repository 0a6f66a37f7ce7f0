//! Thin request/response handlers wrapping third-party services

pub mod mail;
pub mod users;

use thiserror::Error;

pub use mail::{EmailRequest, HttpMailer, Mailer, RecordingMailer};
pub use users::{provision_user, remove_user, ProvisionRequest};

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Mail relay is not configured")]
    NotConfigured,

    #[error("Mail relay rejected the message: {0}")]
    Rejected(String),

    #[error("Mail relay request failed: {0}")]
    Http(#[from] reqwest::Error),
}
