//! Configuration types for DIMSE services

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{DimseError, Result};
use crate::transfer_syntax::TransferSyntax;
use crate::DEFAULT_DIMSE_PORT;

/// Smallest and largest receive PDU length we accept in configuration
pub const MIN_MAX_PDU: u32 = 16_384;
pub const MAX_MAX_PDU: u32 = 131_072;

/// Default bound on a reassembled data set
pub const DEFAULT_MAX_MESSAGE_LENGTH: usize = 64 * 1024 * 1024;

/// Configuration of the local (calling) application entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DimseConfig {
    /// Local Application Entity Title
    pub local_aet: String,

    /// Maximum PDU length we advertise and accept, in bytes
    #[serde(default = "default_max_pdu")]
    pub max_pdu: u32,

    /// Connection timeout in milliseconds
    #[serde(default = "default_timeout")]
    pub connect_timeout_ms: u64,

    /// Bound on each PDU read and write, in milliseconds
    #[serde(default = "default_timeout")]
    pub read_timeout_ms: u64,

    /// Bound on a whole operation (connect to release), in milliseconds
    #[serde(default = "default_timeout")]
    pub operation_timeout_ms: u64,

    /// Transfer syntaxes proposed for every context, in order of preference
    #[serde(default = "default_transfer_syntaxes")]
    pub transfer_syntaxes: Vec<TransferSyntax>,

    /// Largest data set accepted from the peer once its fragments are joined
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
}

/// Username and passcode sent as user identity during negotiation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    #[serde(alias = "passcode")]
    pub password: String,
}

/// Configuration for a remote DICOM node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteNode {
    /// Remote Application Entity Title
    pub ae_title: String,

    /// Remote host address
    pub host: String,

    /// Remote port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Timeout in milliseconds for this node (overrides every global timeout)
    #[serde(default)]
    pub timeout_ms: Option<u64>,

    /// Maximum PDU size for this node (overrides global setting)
    #[serde(default)]
    pub max_pdu: Option<u32>,

    /// User identity negotiated with this node
    #[serde(default)]
    pub credentials: Option<Credentials>,
}

impl Default for DimseConfig {
    fn default() -> Self {
        Self {
            local_aet: "RADLINK".to_string(),
            max_pdu: default_max_pdu(),
            connect_timeout_ms: default_timeout(),
            read_timeout_ms: default_timeout(),
            operation_timeout_ms: default_timeout(),
            transfer_syntaxes: default_transfer_syntaxes(),
            max_message_length: default_max_message_length(),
        }
    }
}

impl DimseConfig {
    pub fn new(local_aet: impl Into<String>) -> Self {
        Self {
            local_aet: local_aet.into(),
            ..Self::default()
        }
    }

    /// Use one timeout for connect, each PDU and the whole operation
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.connect_timeout_ms = timeout_ms;
        self.read_timeout_ms = timeout_ms;
        self.operation_timeout_ms = timeout_ms;
        self
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_ae_title(&self.local_aet, "Local")?;

        if self.max_pdu < MIN_MAX_PDU || self.max_pdu > MAX_MAX_PDU {
            return Err(DimseError::config(format!(
                "Max PDU size must be between {} and {} bytes",
                MIN_MAX_PDU, MAX_MAX_PDU
            )));
        }

        if self.connect_timeout_ms == 0 || self.read_timeout_ms == 0 || self.operation_timeout_ms == 0
        {
            return Err(DimseError::config("Timeouts must be greater than 0"));
        }

        if self.max_message_length == 0 {
            return Err(DimseError::config("Max message length must be greater than 0"));
        }

        if self.transfer_syntaxes.is_empty() {
            return Err(DimseError::config(
                "At least one transfer syntax must be proposed",
            ));
        }

        Ok(())
    }
}

impl RemoteNode {
    /// Create a new remote node configuration
    pub fn new(ae_title: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            ae_title: ae_title.into(),
            host: host.into(),
            port,
            timeout_ms: None,
            max_pdu: None,
            credentials: None,
        }
    }

    /// Set timeout for this node
    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = Some(timeout_ms);
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    /// `host:port` as used for connecting
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Validate the remote node configuration
    pub fn validate(&self) -> Result<()> {
        validate_ae_title(&self.ae_title, "Remote")?;

        if self.host.trim().is_empty() {
            return Err(DimseError::config("Remote host cannot be empty"));
        }

        if self.port == 0 {
            return Err(DimseError::config("Remote port must be greater than 0"));
        }

        if self.timeout_ms == Some(0) {
            return Err(DimseError::config("Remote timeout must be greater than 0"));
        }

        if let Some(max_pdu) = self.max_pdu {
            if !(MIN_MAX_PDU..=MAX_MAX_PDU).contains(&max_pdu) {
                return Err(DimseError::config(format!(
                    "Remote max PDU size must be between {} and {} bytes",
                    MIN_MAX_PDU, MAX_MAX_PDU
                )));
            }
        }

        Ok(())
    }
}

/// AE titles are 1-16 characters of printable ASCII, not all spaces, and
/// may not contain a backslash.
pub fn validate_ae_title(ae_title: &str, which: &str) -> Result<()> {
    if ae_title.trim().is_empty() || ae_title.len() > 16 {
        return Err(DimseError::config(format!(
            "{} AE title must be 1-16 characters",
            which
        )));
    }
    if !ae_title.bytes().all(|b| (0x20..0x7F).contains(&b) && b != b'\\') {
        return Err(DimseError::config(format!(
            "{} AE title {:?} contains characters not allowed in an AE title",
            which, ae_title
        )));
    }
    Ok(())
}

// Default value functions
fn default_port() -> u16 {
    DEFAULT_DIMSE_PORT
}

fn default_max_pdu() -> u32 {
    MIN_MAX_PDU
}

fn default_timeout() -> u64 {
    30_000 // 30 seconds
}

fn default_transfer_syntaxes() -> Vec<TransferSyntax> {
    TransferSyntax::PREFERRED.to_vec()
}

fn default_max_message_length() -> usize {
    DEFAULT_MAX_MESSAGE_LENGTH
}
