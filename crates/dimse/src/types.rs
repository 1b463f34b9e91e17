//! Common types for DIMSE operations

use serde::{Deserialize, Serialize};

use crate::dataset::Dataset;

/// Verification SOP Class
pub const VERIFICATION_SOP_CLASS: &str = "1.2.840.10008.1.1";
/// Study Root Query/Retrieve Information Model - FIND
pub const STUDY_ROOT_QR_FIND: &str = "1.2.840.10008.5.1.4.1.2.2.1";
/// Patient Root Query/Retrieve Information Model - FIND
pub const PATIENT_ROOT_QR_FIND: &str = "1.2.840.10008.5.1.4.1.2.1.1";
/// Encapsulated PDF Storage
pub const ENCAPSULATED_PDF_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.104.1";

/// DIMSE operation status, classified from the 16-bit status code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DimseStatus {
    /// 0x0000
    Success,
    /// 0xFF00 or 0xFF01, more responses follow
    Pending(u16),
    /// 0xFE00, matching terminated by a cancel request
    Cancel,
    /// 0x0001 or 0xBxxx
    Warning(u16),
    /// Anything else
    Failure(u16),
}

impl DimseStatus {
    pub fn from_code(code: u16) -> Self {
        match code {
            0x0000 => DimseStatus::Success,
            0xFF00 | 0xFF01 => DimseStatus::Pending(code),
            0xFE00 => DimseStatus::Cancel,
            0x0001 | 0xB000..=0xBFFF => DimseStatus::Warning(code),
            _ => DimseStatus::Failure(code),
        }
    }

    pub fn code(&self) -> u16 {
        match *self {
            DimseStatus::Success => 0x0000,
            DimseStatus::Cancel => 0xFE00,
            DimseStatus::Pending(code) | DimseStatus::Warning(code) | DimseStatus::Failure(code) => {
                code
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, DimseStatus::Success)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, DimseStatus::Pending(_))
    }

    /// Human readable meaning of the status code
    pub fn description(&self) -> &'static str {
        match self.code() {
            0x0000 => "Success",
            0xFF00 => "Pending: matches are continuing",
            0xFF01 => "Pending: optional keys not supported",
            0xFE00 => "Cancel: matching terminated",
            0x0001 => "Warning: requested optional attributes not supported",
            0xB000 => "Warning: coercion of data elements",
            0xB006 => "Warning: elements discarded",
            0xB007 => "Warning: data set does not match SOP class",
            0x0110 => "Failure: processing failure",
            0x0112 => "Failure: no such SOP instance",
            0x0122 => "Refused: SOP class not supported",
            0x0124 => "Refused: not authorized",
            0x0211 => "Failure: unrecognized operation",
            0xA700..=0xA7FF => "Refused: out of resources",
            0xA900..=0xA9FF => "Error: data set does not match SOP class",
            0xC000..=0xCFFF => "Error: cannot understand",
            _ => match self {
                DimseStatus::Warning(_) => "Warning",
                _ => "Failure",
            },
        }
    }
}

impl std::fmt::Display for DimseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x{:04X} ({})", self.code(), self.description())
    }
}

/// DICOM query/retrieve levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum QueryLevel {
    Patient,
    Study,
    Series,
    Image,
}

impl std::fmt::Display for QueryLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueryLevel::Patient => write!(f, "PATIENT"),
            QueryLevel::Study => write!(f, "STUDY"),
            QueryLevel::Series => write!(f, "SERIES"),
            QueryLevel::Image => write!(f, "IMAGE"),
        }
    }
}

impl std::str::FromStr for QueryLevel {
    type Err = crate::error::DimseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "PATIENT" => Ok(QueryLevel::Patient),
            "STUDY" => Ok(QueryLevel::Study),
            "SERIES" => Ok(QueryLevel::Series),
            "IMAGE" => Ok(QueryLevel::Image),
            _ => Err(crate::error::DimseError::config(format!("Invalid query level: {}", s))),
        }
    }
}

/// Priority of a DIMSE request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub fn code(self) -> u16 {
        match self {
            Priority::Medium => 0x0000,
            Priority::High => 0x0001,
            Priority::Low => 0x0002,
        }
    }
}

/// Parameters of a C-FIND request
#[derive(Debug, Clone)]
pub struct FindQuery {
    /// Abstract syntax (information model) to query
    pub sop_class_uid: String,

    /// Identifier: matching keys with values, return keys empty
    pub identifier: Dataset,

    /// Stop after this many matches by cancelling (0 = unlimited)
    pub max_results: usize,

    pub priority: Priority,
}

impl FindQuery {
    /// Study Root query with the given identifier
    pub fn study_root(identifier: Dataset) -> Self {
        Self {
            sop_class_uid: STUDY_ROOT_QR_FIND.to_string(),
            identifier,
            max_results: 0,
            priority: Priority::Medium,
        }
    }

    /// Set maximum number of results
    pub fn with_max_results(mut self, max: usize) -> Self {
        self.max_results = max;
        self
    }
}

/// Item produced by a C-FIND stream
#[derive(Debug, Clone)]
pub enum FindEvent {
    /// A pending response's identifier, in receipt order
    Match(Dataset),
    /// Final status, produced once after the association has been closed
    Completed(FindSummary),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FindSummary {
    /// Status of the final response
    pub status: DimseStatus,
    /// Whether a C-CANCEL was issued (by the caller or `max_results`)
    pub cancelled: bool,
    /// Number of matches delivered
    pub matches: usize,
    pub error_comment: Option<String>,
}

impl FindSummary {
    /// A find ends well on success, or on a cancel status we asked for
    pub fn is_success(&self) -> bool {
        self.status.is_success() || (self.cancelled && self.status == DimseStatus::Cancel)
    }
}

/// Parameters of a C-STORE request
#[derive(Debug, Clone)]
pub struct StoreRequest {
    pub sop_class_uid: String,
    pub sop_instance_uid: String,
    pub dataset: Dataset,
    pub priority: Priority,
}

impl StoreRequest {
    pub fn new(
        sop_class_uid: impl Into<String>,
        sop_instance_uid: impl Into<String>,
        dataset: Dataset,
    ) -> Self {
        Self {
            sop_class_uid: sop_class_uid.into(),
            sop_instance_uid: sop_instance_uid.into(),
            dataset,
            priority: Priority::Medium,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreOutcome {
    pub status: DimseStatus,
    pub sop_instance_uid: String,
    pub error_comment: Option<String>,
}

impl StoreOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Result of a C-ECHO exchange. A non-success status is a verification
/// failure, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoOutcome {
    pub status: DimseStatus,
}

impl EchoOutcome {
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
