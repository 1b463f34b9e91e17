//! Radlink: a PACS client for radiology reporting.
//!
//! [`PacsClient`] verifies connectivity (C-ECHO), searches studies (C-FIND)
//! and files PDF reports as Encapsulated PDF instances (C-STORE). The DICOM
//! networking itself lives in the [`dimse`] crate.

pub mod client;
pub mod config;
pub mod encapsulated_pdf;
pub mod error;
pub mod format;
pub mod logging;
pub mod models;

pub use client::PacsClient;
pub use config::{AppConfig, ConfigError, LoggingConfig, PacsConfig, PacsNode};
pub use encapsulated_pdf::{build_encapsulated_pdf, ReportMetadata};
pub use error::{PacsError, Result};
pub use models::{
    ConnectionStatus, DicomStudy, QueryResult, StoreResult, StudyQueryParams, StudyView,
};

pub use dimse::{Credentials, ErrorKind};
pub use tokio_util::sync::CancellationToken;
