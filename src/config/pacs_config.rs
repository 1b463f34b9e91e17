use std::time::Duration;

use dimse::config::{validate_ae_title, MAX_MAX_PDU, MIN_MAX_PDU};
use dimse::{Credentials, DimseConfig, RemoteNode, DEFAULT_DIMSE_PORT};
use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Connection settings for the PACS.
///
/// Field names are snake_case in TOML; the camelCase spellings used by the
/// web front end are accepted as aliases.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacsConfig {
    /// Our (calling) AE title
    #[serde(alias = "localAeTitle", alias = "aeTitle")]
    pub local_ae_title: String,

    /// The PACS (called) AE title
    #[serde(alias = "remoteAeTitle")]
    pub remote_ae_title: String,

    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Optional username/passcode user identity
    #[serde(default, alias = "auth")]
    pub credentials: Option<Credentials>,

    /// Budget in milliseconds for connecting, for each PDU and for each
    /// whole operation
    #[serde(default = "default_timeout_ms", alias = "timeout")]
    pub timeout_ms: u64,

    /// Largest PDU we advertise and accept
    #[serde(default = "default_max_pdu_length", alias = "maxPduLength")]
    pub max_pdu_length: u32,

    /// Query/Retrieve endpoint, when it differs from the main node
    #[serde(default, alias = "queryNode")]
    pub query_node: Option<PacsNode>,

    /// Storage endpoint, when it differs from the main node
    #[serde(default, alias = "storeNode")]
    pub store_node: Option<PacsNode>,
}

/// A PACS endpoint overriding the main host/port/AE title for one service.
/// Credentials are shared with the main node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacsNode {
    #[serde(alias = "aeTitle")]
    pub ae_title: String,
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default, alias = "timeout")]
    pub timeout_ms: Option<u64>,
}

impl PacsConfig {
    pub fn new(
        local_ae_title: impl Into<String>,
        remote_ae_title: impl Into<String>,
        host: impl Into<String>,
        port: u16,
    ) -> Self {
        Self {
            local_ae_title: local_ae_title.into(),
            remote_ae_title: remote_ae_title.into(),
            host: host.into(),
            port,
            credentials: None,
            timeout_ms: default_timeout_ms(),
            max_pdu_length: default_max_pdu_length(),
            query_node: None,
            store_node: None,
        }
    }

    pub fn with_timeout(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.credentials = Some(Credentials {
            username: username.into(),
            password: password.into(),
        });
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_ae_title(&self.local_ae_title, "Local").map_err(invalid)?;
        validate_ae_title(&self.remote_ae_title, "Remote").map_err(invalid)?;

        if self.host.trim().is_empty() {
            return Err(ConfigError::invalid("PACS host cannot be empty"));
        }
        if self.port == 0 {
            return Err(ConfigError::invalid("PACS port must be greater than 0"));
        }
        if self.timeout_ms == 0 {
            return Err(ConfigError::invalid("PACS timeout must be greater than 0"));
        }
        if !(MIN_MAX_PDU..=MAX_MAX_PDU).contains(&self.max_pdu_length) {
            return Err(ConfigError::invalid(format!(
                "max_pdu_length must be between {} and {} bytes",
                MIN_MAX_PDU, MAX_MAX_PDU
            )));
        }
        if let Some(credentials) = &self.credentials {
            if credentials.username.is_empty() {
                return Err(ConfigError::invalid("PACS username cannot be empty"));
            }
        }

        for node in [&self.query_node, &self.store_node].into_iter().flatten() {
            self.resolve(Some(node)).validate().map_err(invalid)?;
        }
        Ok(())
    }

    /// Settings for the local application entity
    pub fn dimse_config(&self) -> DimseConfig {
        let mut config = DimseConfig::new(self.local_ae_title.clone()).with_timeout(self.timeout_ms);
        config.max_pdu = self.max_pdu_length;
        config
    }

    /// The main PACS node, used for verification
    pub fn remote(&self) -> RemoteNode {
        self.resolve(None)
    }

    /// Node answering C-FIND
    pub fn query_remote(&self) -> RemoteNode {
        self.resolve(self.query_node.as_ref())
    }

    /// Node accepting C-STORE
    pub fn store_remote(&self) -> RemoteNode {
        self.resolve(self.store_node.as_ref())
    }

    fn resolve(&self, node: Option<&PacsNode>) -> RemoteNode {
        let mut remote = match node {
            Some(node) => {
                let mut remote = RemoteNode::new(node.ae_title.clone(), node.host.clone(), node.port);
                remote.timeout_ms = node.timeout_ms;
                remote
            }
            None => RemoteNode::new(self.remote_ae_title.clone(), self.host.clone(), self.port),
        };
        remote.credentials = self.credentials.clone();
        remote
    }
}

fn invalid(e: dimse::DimseError) -> ConfigError {
    match e {
        dimse::DimseError::Config(msg) => ConfigError::Invalid(msg),
        other => ConfigError::Invalid(other.to_string()),
    }
}

fn default_port() -> u16 {
    DEFAULT_DIMSE_PORT
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_pdu_length() -> u32 {
    MIN_MAX_PDU
}
