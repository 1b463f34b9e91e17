#[path = "../common/mod.rs"]
mod common;

use common::{study, FindBehavior, MockPacs, Scenario};
use dicom_core::{Tag, VR};
use dicom_dictionary_std::tags;
use radlink::{PacsClient, StudyQueryParams};

fn fixtures() -> Vec<dimse::Dataset> {
    vec![
        study("1.2.3.1", "DOE^JANE", "P001", "CT", "20240105"),
        study("1.2.3.2", "DOE^JOHN", "P002", "MR", "20240210"),
        study("1.2.3.3", "SMITH^ANNE", "P003", "CT", "20240301"),
        study("1.2.3.4", "DOE^JIM", "P004", "CT\\SR", "20240415"),
    ]
}

#[tokio::test]
async fn test_query_by_name_and_modality() {
    let pacs = MockPacs::start(Scenario::Find(FindBehavior::new(fixtures()))).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let params = StudyQueryParams {
        patient_name: Some("DOE*".to_string()),
        modality: Some("CT".to_string()),
        ..Default::default()
    };
    let result = client.query_studies(&params).await;

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.total_results, 2);
    let uids: Vec<_> = result.studies.iter().map(|s| s.study_instance_uid.as_str()).collect();
    assert_eq!(uids, ["1.2.3.1", "1.2.3.4"]);
    assert_eq!(result.studies[1].modalities, "CT\\SR");
    assert_eq!(result.studies[0].number_of_study_related_instances, Some(120));

    let views = result.views();
    assert_eq!(views[0].patient_name, "JANE DOE");
    assert_eq!(views[0].study_date, "2024-01-05");
    assert_eq!(views[0].study_time.as_deref(), Some("10:15:00"));

    // the identifier the PACS saw
    let requests = pacs.requests();
    assert_eq!(requests.len(), 1);
    let identifier = requests[0].data.as_ref().unwrap();
    assert_eq!(identifier.string(tags::QUERY_RETRIEVE_LEVEL), Some("STUDY"));
    assert_eq!(identifier.string(tags::PATIENT_NAME), Some("DOE*"));
    assert!(identifier.get(tags::STUDY_DATE).unwrap().is_empty());
    assert!(identifier.contains(tags::NUMBER_OF_STUDY_RELATED_INSTANCES));
}

#[tokio::test]
async fn test_end_to_end_single_ct_study() {
    let fixture = vec![
        study("1.2.3.10", "DOE^JOHN", "P010", "CT", "20241113"),
        study("1.2.3.11", "DOE^JOHN", "P010", "MR", "20241114"),
    ];
    let pacs = MockPacs::start(Scenario::Find(FindBehavior::new(fixture))).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let params = StudyQueryParams {
        patient_name: Some("DOE*".to_string()),
        modality: Some("CT".to_string()),
        ..Default::default()
    };
    let result = client.query_studies(&params).await;

    assert!(result.success);
    assert_eq!(result.studies.len(), 1);
    assert_eq!(result.studies[0].modalities, "CT");
    assert_eq!(result.views()[0].patient_name, "JOHN DOE");
}

#[tokio::test]
async fn test_query_date_range() {
    let pacs = MockPacs::start(Scenario::Find(FindBehavior::new(fixtures()))).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let params = StudyQueryParams {
        study_date: Some("20240201-20240331".to_string()),
        ..Default::default()
    };
    let result = client.query_studies(&params).await;

    assert!(result.success);
    let ids: Vec<_> = result.studies.iter().map(|s| s.patient_id.as_str()).collect();
    assert_eq!(ids, ["P002", "P003"]);
}

#[tokio::test]
async fn test_query_no_matches() {
    let pacs = MockPacs::start(Scenario::Find(FindBehavior::new(fixtures()))).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let params = StudyQueryParams {
        patient_id: Some("NOBODY".to_string()),
        ..Default::default()
    };
    let result = client.query_studies(&params).await;

    assert!(result.success);
    assert!(result.studies.is_empty());
    assert_eq!(result.total_results, 0);
}

#[tokio::test]
async fn test_query_max_results_cancels() {
    let pacs = MockPacs::start(Scenario::Find(FindBehavior::new(fixtures()))).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let params = StudyQueryParams {
        max_results: Some(2),
        ..Default::default()
    };
    let result = client.query_studies(&params).await;

    assert!(result.success, "{:?}", result.error);
    assert!(result.cancelled);
    assert_eq!(result.total_results, 2);
    assert_eq!(result.studies[0].study_instance_uid, "1.2.3.1");
    assert_eq!(result.studies[1].study_instance_uid, "1.2.3.2");
}

#[tokio::test]
async fn test_query_failure_status() {
    let behavior = FindBehavior {
        final_status: 0xC001,
        ..FindBehavior::new(Vec::new())
    };
    let pacs = MockPacs::start(Scenario::Find(behavior)).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let result = client.query_studies(&StudyQueryParams::default()).await;
    assert!(!result.success);
    assert!(result.studies.is_empty());
    assert!(result.error.unwrap().contains("0xC001"));
}

#[tokio::test]
async fn test_query_abort_keeps_partial_results() {
    let behavior = FindBehavior {
        abort_after: Some(1),
        ..FindBehavior::new(fixtures())
    };
    let pacs = MockPacs::start(Scenario::Find(behavior)).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let result = client.query_studies(&StudyQueryParams::default()).await;
    assert!(!result.success);
    assert_eq!(result.total_results, 1);
    assert_eq!(result.studies[0].patient_name, "DOE^JANE");
    assert!(result.error.unwrap().contains("aborted"));
}

#[tokio::test]
async fn test_query_keeps_vendor_attributes() {
    let mut tagged = study("1.2.3.9", "ROE^RICHARD", "P009", "US", "20240501");
    tagged.put_str(Tag(0x0009, 0x0010), VR::LO, "ACME");
    tagged.put_str(Tag(0x0009, 0x1001), VR::LO, "PRIORITY-HIGH");
    let pacs = MockPacs::start(Scenario::Find(FindBehavior::new(vec![tagged]))).await;
    let client = PacsClient::new(pacs.config()).unwrap();

    let result = client.query_studies(&StudyQueryParams::default()).await;
    assert!(result.success);
    let extensions = &result.studies[0].extensions;
    assert_eq!(extensions.get("00090010").map(String::as_str), Some("ACME"));
    assert_eq!(extensions.get("00091001").map(String::as_str), Some("PRIORITY-HIGH"));
}

#[tokio::test]
async fn test_query_unreachable_pacs() {
    let port = common::unused_port().await;
    let mut config = radlink::PacsConfig::new("RADLINK", "MOCKPACS", "127.0.0.1", port);
    config.timeout_ms = 2_000;
    let client = PacsClient::new(config).unwrap();

    let result = client.query_studies(&StudyQueryParams::default()).await;
    assert!(!result.success);
    assert!(result.studies.is_empty());
    assert!(result.error.is_some());
}
