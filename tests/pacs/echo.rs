#[path = "../common/mod.rs"]
mod common;

use std::time::{Duration, Instant};

use common::{stalled_listener, unused_port, MockPacs, Scenario, LOCAL_AE_TITLE, MOCK_AE_TITLE};
use radlink::{ErrorKind, PacsClient, PacsConfig};

#[tokio::test]
async fn test_connection_succeeds() {
    let pacs = MockPacs::start(Scenario::Echo { status: 0x0000 }).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    assert!(!client.is_connected());
    assert!(client.test_connection().await.unwrap());
    assert!(client.is_connected());

    let associations = pacs.associations();
    assert_eq!(associations.len(), 1);
    assert_eq!(associations[0].calling_ae_title, LOCAL_AE_TITLE);
    assert_eq!(associations[0].called_ae_title, MOCK_AE_TITLE);
    assert_eq!(
        associations[0].presentation_contexts[0].abstract_syntax,
        "1.2.840.10008.1.1"
    );

    client.disconnect();
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_connection_failure_status_is_not_an_error() {
    let pacs = MockPacs::start(Scenario::Echo { status: 0x0110 }).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    assert!(!client.test_connection().await.unwrap());
    assert!(!client.is_connected());
}

#[tokio::test]
async fn test_rejected_association_is_connection_error() {
    let pacs = MockPacs::start(Scenario::RejectAssociation).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let err = client.test_connection().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
    assert!(err.to_string().contains("called AE title not recognized"));
}

#[tokio::test]
async fn test_no_accepted_context_is_connection_error() {
    let pacs = MockPacs::start(Scenario::RejectAllContexts).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let err = client.test_connection().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn test_connection_refused() {
    let port = unused_port().await;
    let config = PacsConfig::new(LOCAL_AE_TITLE, MOCK_AE_TITLE, "127.0.0.1", port).with_timeout(2_000);
    let client = PacsClient::new(config).unwrap();

    let err = client.test_connection().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Connection);
}

#[tokio::test]
async fn test_silent_peer_times_out() {
    let pacs = MockPacs::start(Scenario::Silent).await;
    let client = PacsClient::new(pacs.config().with_timeout(100)).unwrap();

    let started = Instant::now();
    let err = client.test_connection().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(started.elapsed() < Duration::from_millis(150), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn test_connect_that_never_completes_times_out() {
    let stalled = stalled_listener().await;
    let config =
        PacsConfig::new(LOCAL_AE_TITLE, MOCK_AE_TITLE, "127.0.0.1", stalled.port).with_timeout(100);
    let client = PacsClient::new(config).unwrap();

    let started = Instant::now();
    let err = client.test_connection().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout, "{}", err);
    assert!(started.elapsed() >= Duration::from_millis(100), "took {:?}", started.elapsed());
    assert!(started.elapsed() < Duration::from_millis(150), "took {:?}", started.elapsed());
}

#[tokio::test]
async fn test_connection_status_report() {
    let pacs = MockPacs::start(Scenario::RejectAssociation).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let status = client.connection_status().await;
    assert!(!status.success);
    assert_eq!(status.port, pacs.addr.port());
    assert_eq!(status.remote_ae_title, MOCK_AE_TITLE);
    assert!(status.error.unwrap().contains("rejected"));
}

#[tokio::test]
async fn test_update_config_resets_connection() {
    let pacs = MockPacs::start(Scenario::Echo { status: 0x0000 }).await;
    let client = PacsClient::new(pacs.config()).unwrap();
    assert!(client.test_connection().await.unwrap());

    let updated = pacs.config().with_timeout(5_000);
    client.update_config(updated.clone()).unwrap();
    assert!(!client.is_connected());
    assert_eq!(*client.config(), updated);

    let mut invalid = updated;
    invalid.remote_ae_title = String::new();
    let err = client.update_config(invalid).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
    assert_eq!(client.config().timeout_ms, 5_000);
}

#[tokio::test]
async fn test_invalid_config_rejected_before_io() {
    let mut config = PacsConfig::new(LOCAL_AE_TITLE, MOCK_AE_TITLE, "127.0.0.1", 104);
    config.local_ae_title = "WAY_TOO_LONG_AE_TITLE".to_string();
    let err = PacsClient::new(config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}
