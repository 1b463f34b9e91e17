//! DIMSE (DICOM Message Service Element) client implementation
//!
//! This crate implements the Service Class User side of DICOM networking:
//! the data set codec, upper layer PDU framing, association negotiation and
//! the C-ECHO, C-FIND and C-STORE services on top of them.
//!
//! # Features
//! - Implicit and Explicit VR Little Endian data set encoding, sequences included
//! - Association negotiation with user identity and implementation identification
//! - P-DATA fragmentation to the peer's maximum PDU length
//! - C-FIND as a stream of matches, with cooperative cancellation
//! - Per-PDU and per-operation timeouts; any failure aborts the association

pub mod association;
pub mod command;
pub mod config;
pub mod dataset;
pub mod dictionary;
pub mod error;
pub mod pdu;
pub mod scu;
pub mod transfer_syntax;
pub mod types;
pub mod uid;

// Re-export commonly used types
pub use association::{AssociationOptions, AssociationState, ClientAssociation};
pub use config::{Credentials, DimseConfig, RemoteNode};
pub use dataset::{DataElement, Dataset, Value};
pub use error::{DimseError, ErrorKind, Result};
pub use scu::DimseScu;
pub use transfer_syntax::TransferSyntax;
pub use types::{
    DimseStatus, EchoOutcome, FindEvent, FindQuery, FindSummary, Priority, QueryLevel,
    StoreOutcome, StoreRequest,
};
pub use uid::generate_uid;

/// DIMSE protocol version
pub const DIMSE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default DICOM port (non-TLS)
pub const DEFAULT_DIMSE_PORT: u16 = 11112;
