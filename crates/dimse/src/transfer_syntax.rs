//! Transfer syntaxes supported by the client

use dicom_dictionary_std::uids;
use serde::{Deserialize, Serialize};

/// Transfer syntaxes this client can encode and decode.
///
/// Only the uncompressed little endian syntaxes are supported; Implicit VR
/// Little Endian is the mandatory fallback every peer must accept.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferSyntax {
    ImplicitVrLittleEndian,
    ExplicitVrLittleEndian,
}

impl TransferSyntax {
    /// Default proposal order: preferred first
    pub const PREFERRED: [TransferSyntax; 2] = [
        TransferSyntax::ExplicitVrLittleEndian,
        TransferSyntax::ImplicitVrLittleEndian,
    ];

    pub fn uid(self) -> &'static str {
        match self {
            TransferSyntax::ImplicitVrLittleEndian => uids::IMPLICIT_VR_LITTLE_ENDIAN,
            TransferSyntax::ExplicitVrLittleEndian => uids::EXPLICIT_VR_LITTLE_ENDIAN,
        }
    }

    /// Look up a transfer syntax by UID, ignoring trailing padding
    pub fn from_uid(uid: &str) -> Option<Self> {
        let uid = uid.trim_end_matches(|c: char| c == '\0' || c == ' ');
        Self::PREFERRED.into_iter().find(|ts| ts.uid() == uid)
    }

    pub fn is_explicit_vr(self) -> bool {
        matches!(self, TransferSyntax::ExplicitVrLittleEndian)
    }
}

impl std::fmt::Display for TransferSyntax {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferSyntax::ImplicitVrLittleEndian => write!(f, "Implicit VR Little Endian"),
            TransferSyntax::ExplicitVrLittleEndian => write!(f, "Explicit VR Little Endian"),
        }
    }
}
