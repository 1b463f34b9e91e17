use std::io::Write;

use radlink::{AppConfig, ConfigError, ErrorKind, PacsError};

#[test]
fn test_load_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[pacs]
local_ae_title = "RADLINK"
remote_ae_title = "ORTHANC"
host = "127.0.0.1"
port = 4242
timeout_ms = 10000

[pacs.query_node]
ae_title = "ORTHANC_QR"
host = "127.0.0.2"
port = 4243

[logging]
log_to_file = true
log_file_path = "/tmp/radlink.log"
"#
    )
    .unwrap();

    let config = AppConfig::from_file(file.path()).unwrap();
    assert_eq!(config.pacs.remote().address(), "127.0.0.1:4242");
    assert_eq!(config.pacs.query_remote().address(), "127.0.0.2:4243");
    assert_eq!(config.pacs.store_remote().ae_title, "ORTHANC");
    assert_eq!(config.pacs.dimse_config().connect_timeout_ms, 10_000);
    assert!(config.logging.log_to_file);
}

#[test]
fn test_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let err = AppConfig::from_file(dir.path().join("absent.toml")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
    assert!(err.to_string().contains("absent.toml"));
}

#[test]
fn test_invalid_node_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"
[pacs]
local_ae_title = "RADLINK"
remote_ae_title = "ORTHANC"
host = "127.0.0.1"

[pacs.store_node]
ae_title = "ARCHIVE"
host = ""
"#
    )
    .unwrap();

    let err = AppConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid(_)));
    assert_eq!(PacsError::from(err).kind(), ErrorKind::Configuration);
}
