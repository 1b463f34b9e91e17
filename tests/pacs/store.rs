#[path = "../common/mod.rs"]
mod common;

use base64::Engine;
use dicom_core::VR;
use dicom_dictionary_std::tags;
use dimse::command::C_STORE_RQ;
use dimse::dictionary::MIME_TYPE_OF_ENCAPSULATED_DOCUMENT;
use dimse::Value;
use radlink::{PacsClient, PacsNode, ReportMetadata};

use common::{MockPacs, Scenario};

const ENCAPSULATED_PDF_STORAGE: &str = "1.2.840.10008.5.1.4.1.1.104.1";

fn metadata() -> ReportMetadata {
    ReportMetadata {
        study_instance_uid: "1.2.3.1".to_string(),
        patient_name: "DOE^JANE".to_string(),
        patient_id: "P001".to_string(),
        study_date: "20240105".to_string(),
        accession_number: "ACC-P001".to_string(),
        study_description: Some("CT CHEST".to_string()),
        ..Default::default()
    }
}

/// Even length, so the stored bytes come back without padding
fn pdf() -> Vec<u8> {
    let pdf = b"%PDF-1.4\n1 0 obj <<>> endobj\ntrailer <<>>\n%%EOF\n".to_vec();
    assert_eq!(pdf.len() % 2, 0);
    pdf
}

#[tokio::test]
async fn test_store_report() {
    let pacs = MockPacs::start(Scenario::Store { status: 0x0000, comment: None }).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let result = client.store_report_pdf(&pdf(), &metadata()).await;
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.status, Some(0x0000));
    let sop_instance_uid = result.sop_instance_uid.unwrap();
    assert!(sop_instance_uid.starts_with("2.25."));

    let requests = pacs.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.command_field(), Some(C_STORE_RQ));
    assert_eq!(
        request.command.string(tags::AFFECTED_SOP_CLASS_UID),
        Some(ENCAPSULATED_PDF_STORAGE)
    );
    assert_eq!(
        request.command.string(tags::AFFECTED_SOP_INSTANCE_UID),
        Some(sop_instance_uid.as_str())
    );

    let stored = request.data.as_ref().unwrap();
    assert_eq!(stored.string(tags::SOP_INSTANCE_UID), Some(sop_instance_uid.as_str()));
    assert_eq!(stored.string(tags::STUDY_INSTANCE_UID), Some("1.2.3.1"));
    assert_eq!(stored.string(tags::PATIENT_NAME), Some("DOE^JANE"));
    assert_eq!(stored.string(tags::MODALITY), Some("DOC"));
    assert_eq!(stored.string(MIME_TYPE_OF_ENCAPSULATED_DOCUMENT), Some("application/pdf"));

    let document = stored.get(tags::ENCAPSULATED_DOCUMENT).unwrap();
    assert_eq!(document.vr, VR::OB);
    assert_eq!(document.value, Value::Bytes(pdf()));
}

#[tokio::test]
async fn test_store_refused() {
    let pacs = MockPacs::start(Scenario::Store {
        status: 0xA700,
        comment: Some("Storage full"),
    })
    .await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let result = client.store_report_pdf(&pdf(), &metadata()).await;
    assert!(!result.success);
    assert!(result.sop_instance_uid.is_none());
    assert_eq!(result.status, Some(0xA700));
    let error = result.error.unwrap();
    assert!(error.contains("0xA700"), "{}", error);
    assert!(error.contains("Storage full"), "{}", error);
}

#[tokio::test]
async fn test_store_keeps_supplied_uid() {
    let pacs = MockPacs::start(Scenario::Store { status: 0x0000, comment: None }).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let meta = ReportMetadata {
        sop_instance_uid: Some("1.2.826.0.1.3680043.8.498.1".to_string()),
        ..metadata()
    };
    let result = client.store_report_pdf(&pdf(), &meta).await;
    assert_eq!(result.sop_instance_uid.as_deref(), Some("1.2.826.0.1.3680043.8.498.1"));
}

#[tokio::test]
async fn test_store_rejects_bad_input_before_io() {
    let pacs = MockPacs::start(Scenario::Store { status: 0x0000, comment: None }).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let meta = ReportMetadata {
        sop_instance_uid: Some("not-a-uid".to_string()),
        ..metadata()
    };
    let result = client.store_report_pdf(&pdf(), &meta).await;
    assert!(!result.success);

    let result = client.store_report_pdf(&[], &metadata()).await;
    assert!(!result.success);

    let result = client.store_report_base64("%%% not base64", &metadata()).await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("base64"));

    assert!(pacs.associations().is_empty());
}

#[tokio::test]
async fn test_store_base64_report() {
    let pacs = MockPacs::start(Scenario::Store { status: 0x0000, comment: None }).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let encoded = base64::engine::general_purpose::STANDARD.encode(pdf());
    let result = client.store_report_base64(&encoded, &metadata()).await;
    assert!(result.success, "{:?}", result.error);

    let stored = pacs.requests()[0].data.clone().unwrap();
    assert_eq!(
        stored.get(tags::ENCAPSULATED_DOCUMENT).unwrap().value,
        Value::Bytes(pdf())
    );
}

#[tokio::test]
async fn test_store_uses_store_node() {
    let main = MockPacs::start(Scenario::RejectAssociation).await;
    let archive = MockPacs::start(Scenario::Store { status: 0x0000, comment: None }).await;

    let mut config = main.config();
    config.store_node = Some(PacsNode {
        ae_title: "ARCHIVE".to_string(),
        host: "127.0.0.1".to_string(),
        port: archive.addr.port(),
        timeout_ms: Some(2_000),
    });
    let client = PacsClient::new(config).unwrap();

    let result = client.store_report_pdf(&pdf(), &metadata()).await;
    assert!(result.success, "{:?}", result.error);
    assert!(main.associations().is_empty());
    assert_eq!(archive.associations()[0].called_ae_title, "ARCHIVE");
}
