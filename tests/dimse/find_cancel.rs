#[path = "../common/mod.rs"]
mod common;

use common::{study, FindBehavior, MockPacs, Scenario};
use dimse::command::C_CANCEL_RQ;
use dimse::{DimseScu, DimseStatus, FindEvent, FindQuery};
use futures_util::{pin_mut, StreamExt};
use radlink::{CancellationToken, StudyQueryParams};

#[tokio::test]
async fn test_cancel_after_second_match() {
    let behavior = FindBehavior {
        hold_until_cancel: true,
        ..FindBehavior::new(vec![
            study("1.2.3.1", "DOE^JANE", "P001", "CT", "20240105"),
            study("1.2.3.2", "DOE^JOHN", "P002", "CT", "20240210"),
            study("1.2.3.3", "DOE^JIM", "P003", "CT", "20240301"),
        ])
    };
    let pacs = MockPacs::start(Scenario::Find(behavior)).await;
    let scu = DimseScu::new(pacs.config().dimse_config());

    let cancel = CancellationToken::new();
    let query = FindQuery::study_root(StudyQueryParams::default().to_identifier());
    let stream = scu.find(&pacs.node(), query, cancel.clone());
    pin_mut!(stream);

    let mut matches = Vec::new();
    let mut summary = None;
    while let Some(event) = stream.next().await {
        match event.unwrap() {
            FindEvent::Match(identifier) => {
                matches.push(identifier);
                if matches.len() == 2 {
                    cancel.cancel();
                }
            }
            FindEvent::Completed(s) => summary = Some(s),
        }
    }

    assert_eq!(matches.len(), 2);
    let summary = summary.expect("stream completes after cancel");
    assert_eq!(summary.status, DimseStatus::Cancel);
    assert!(summary.cancelled);
    assert!(summary.is_success());
    assert_eq!(summary.matches, 2);

    // C-FIND-RQ, then C-CANCEL-RQ naming it
    let requests = pacs.requests();
    assert_eq!(requests.len(), 2);
    let find_id = requests[0].command.u16(dicom_dictionary_std::tags::MESSAGE_ID);
    assert_eq!(requests[1].command_field(), Some(C_CANCEL_RQ));
    assert_eq!(
        requests[1].command.u16(dicom_dictionary_std::tags::MESSAGE_ID_BEING_RESPONDED_TO),
        find_id
    );
}

#[tokio::test]
async fn test_cancel_before_first_match() {
    let behavior = FindBehavior {
        hold_until_cancel: true,
        ..FindBehavior::new(vec![study("1.2.3.1", "DOE^JANE", "P001", "CT", "20240105")])
    };
    let pacs = MockPacs::start(Scenario::Find(behavior)).await;
    let client = radlink::PacsClient::new(pacs.config()).unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = client
        .query_studies_with_cancel(&StudyQueryParams::default(), cancel)
        .await;

    assert!(result.success, "{:?}", result.error);
    assert!(result.cancelled);
    assert!(result.studies.is_empty());
}
