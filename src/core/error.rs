use thiserror::Error;

use crate::catalog::CatalogLoadError;
use crate::core::types::{CheckId, CheckType, InstanceId, PreviewId};
use crate::dice::DiceError;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Unknown check: {0}")]
    UnknownCheck(CheckId),

    #[error("Check {check_id} is an {expected} check, but the context says {actual}")]
    CheckTypeMismatch {
        check_id: CheckId,
        expected: CheckType,
        actual: CheckType,
    },

    #[error("Resolution error for {check_id}: {message}")]
    Resolution { check_id: CheckId, message: String },

    #[error("Dice error: {0}")]
    DiceError(#[from] DiceError),

    #[error("Catalog error: {0}")]
    CatalogError(#[from] CatalogLoadError),

    #[error("Preview not found: {0}")]
    PreviewNotFound(PreviewId),

    #[error("Unknown instance: {0}")]
    UnknownInstance(InstanceId),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerdeError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, PipelineError>;
