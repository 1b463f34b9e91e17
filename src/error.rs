//! Error type for the PACS facade

use dimse::{DimseError, ErrorKind};
use thiserror::Error;

use crate::config::ConfigError;

pub type Result<T> = std::result::Result<T, PacsError>;

#[derive(Debug, Error)]
pub enum PacsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Dimse(#[from] DimseError),
}

impl PacsError {
    /// Classification shared with the DIMSE engine
    pub fn kind(&self) -> ErrorKind {
        match self {
            PacsError::Config(_) => ErrorKind::Configuration,
            PacsError::Dimse(e) => e.kind(),
        }
    }
}
