//! Top-level error and exit codes.

use thiserror::Error;

use crate::collector::{ConnectionError, QueryError};
use crate::config::ConfigError;
use crate::credentials::CredentialError;
use crate::monitor::MonitorError;
use crate::report::OutputError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Credential(#[from] CredentialError),

    #[error("connection failed: {0}")]
    Connection(#[from] ConnectionError),

    #[error("{0}")]
    Query(#[from] QueryError),

    #[error("{0}")]
    Output(#[from] OutputError),
}

impl From<MonitorError> for AppError {
    fn from(err: MonitorError) -> Self {
        match err {
            MonitorError::Query(e) => Self::Query(e),
            MonitorError::Output(e) => Self::Output(e),
        }
    }
}

impl AppError {
    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Config(_) | Self::Credential(_) => 2,
            Self::Connection(_) => 3,
            Self::Query(_) => 4,
            Self::Output(_) => 5,
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
