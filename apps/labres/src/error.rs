//! Application-level errors.

use labres_core::LabError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Lab(#[from] LabError),

    #[error("config error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    Input(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server error: {0}")]
    Server(String),
}

impl AppError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub(crate) fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }
}

pub type AppResult<T> = Result<T, AppError>;
