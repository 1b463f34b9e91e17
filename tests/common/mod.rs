//! In-process PACS used by the integration tests.
//!
//! Speaks the upper layer protocol over a real TCP socket and answers
//! C-ECHO, C-FIND and C-STORE according to a [`Scenario`].

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, bail};
use dicom_core::VR;
use dicom_dictionary_std::tags;
use dimse::command::{self, C_CANCEL_RQ, C_ECHO_RQ, C_ECHO_RSP, C_FIND_RQ, C_FIND_RSP, C_STORE_RQ, C_STORE_RSP};
use dimse::pdu::{
    AssociationAc, AssociationRj, AssociationRq, PDataValue, PDataValueType, Pdu, PduCodec,
    PresentationContextResult, PresentationContextResultReason, UserVariableItem,
    APPLICATION_CONTEXT_NAME, PROTOCOL_VERSION,
};
use dimse::{DataElement, Dataset, RemoteNode, TransferSyntax};
use futures_util::{SinkExt, StreamExt};
use radlink::PacsConfig;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

pub const MOCK_AE_TITLE: &str = "MOCKPACS";
pub const LOCAL_AE_TITLE: &str = "RADLINK";

type Peer = Framed<TcpStream, PduCodec>;

/// How the mock PACS behaves on every association
#[derive(Debug, Clone)]
pub enum Scenario {
    /// Answer A-ASSOCIATE-RQ with a permanent rejection
    RejectAssociation,
    /// Accept the association but none of its presentation contexts
    RejectAllContexts,
    /// Answer C-ECHO with `status`
    Echo { status: u16 },
    Find(FindBehavior),
    /// Answer C-STORE with `status` and an optional error comment
    Store { status: u16, comment: Option<&'static str> },
    /// Accept the TCP connection and never say anything
    Silent,
}

#[derive(Debug, Clone)]
pub struct FindBehavior {
    /// Studies the PACS knows about
    pub studies: Vec<Dataset>,
    /// After the last pending response, wait for C-CANCEL and answer 0xFE00
    pub hold_until_cancel: bool,
    /// Send A-ABORT instead of the pending response with this index
    pub abort_after: Option<usize>,
    pub final_status: u16,
}

impl FindBehavior {
    pub fn new(studies: Vec<Dataset>) -> Self {
        Self {
            studies,
            hold_until_cancel: false,
            abort_after: None,
            final_status: 0x0000,
        }
    }
}

/// A DIMSE request as the mock received it
#[derive(Debug, Clone)]
pub struct Request {
    pub presentation_context_id: u8,
    pub command: Dataset,
    pub data: Option<Dataset>,
}

impl Request {
    pub fn command_field(&self) -> Option<u16> {
        self.command.u16(tags::COMMAND_FIELD)
    }
}

#[derive(Debug, Default)]
struct Recorded {
    associations: Mutex<Vec<AssociationRq>>,
    requests: Mutex<Vec<Request>>,
}

pub struct MockPacs {
    pub addr: SocketAddr,
    recorded: Arc<Recorded>,
    task: JoinHandle<()>,
}

impl MockPacs {
    pub async fn start(scenario: Scenario) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let recorded = Arc::new(Recorded::default());
        let scenario = Arc::new(scenario);

        let task = tokio::spawn({
            let recorded = recorded.clone();
            async move {
                while let Ok((socket, _)) = listener.accept().await {
                    let scenario = scenario.clone();
                    let recorded = recorded.clone();
                    tokio::spawn(async move {
                        if let Err(e) = serve(socket, &scenario, &recorded).await {
                            eprintln!("mock PACS: {}", e);
                        }
                    });
                }
            }
        });

        Self { addr, recorded, task }
    }

    /// Client configuration pointing at this PACS
    pub fn config(&self) -> PacsConfig {
        PacsConfig::new(LOCAL_AE_TITLE, MOCK_AE_TITLE, "127.0.0.1", self.addr.port()).with_timeout(2_000)
    }

    pub fn node(&self) -> RemoteNode {
        RemoteNode::new(MOCK_AE_TITLE, "127.0.0.1", self.addr.port()).with_timeout(2_000)
    }

    pub fn associations(&self) -> Vec<AssociationRq> {
        self.recorded.associations.lock().unwrap().clone()
    }

    pub fn requests(&self) -> Vec<Request> {
        self.recorded.requests.lock().unwrap().clone()
    }
}

impl Drop for MockPacs {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A port nothing listens on
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}

/// A listener that never accepts and whose backlog is already full, so new
/// connection attempts hang in the TCP handshake
pub struct StalledListener {
    pub port: u16,
    _listener: TcpListener,
    _backlog: Vec<TcpStream>,
}

pub async fn stalled_listener() -> StalledListener {
    let socket = TcpSocket::new_v4().unwrap();
    socket.bind("127.0.0.1:0".parse().unwrap()).unwrap();
    let listener = socket.listen(0).unwrap();
    let addr = listener.local_addr().unwrap();

    let mut backlog = Vec::new();
    for _ in 0..8 {
        if let Ok(Ok(stream)) =
            tokio::time::timeout(Duration::from_millis(50), TcpStream::connect(addr)).await
        {
            backlog.push(stream);
        }
    }

    StalledListener {
        port: addr.port(),
        _listener: listener,
        _backlog: backlog,
    }
}

/// Study-level response fixture
pub fn study(uid: &str, patient_name: &str, patient_id: &str, modalities: &str, date: &str) -> Dataset {
    Dataset::new()
        .with_text(tags::STUDY_INSTANCE_UID, uid)
        .with_text(tags::PATIENT_NAME, patient_name)
        .with_text(tags::PATIENT_ID, patient_id)
        .with_text(tags::MODALITIES_IN_STUDY, modalities)
        .with_text(tags::STUDY_DATE, date)
        .with_text(tags::STUDY_TIME, "101500")
        .with_text(tags::ACCESSION_NUMBER, &format!("ACC-{}", patient_id))
        .with_text(tags::STUDY_DESCRIPTION, "ROUTINE")
        .with_text(tags::PATIENT_BIRTH_DATE, "19700101")
        .with_text(tags::PATIENT_SEX, "M")
        .with_text(tags::NUMBER_OF_STUDY_RELATED_SERIES, "2")
        .with_text(tags::NUMBER_OF_STUDY_RELATED_INSTANCES, "120")
}

enum Incoming {
    Message(Request),
    Released,
    Closed,
}

async fn serve(socket: TcpStream, scenario: &Scenario, recorded: &Recorded) -> anyhow::Result<()> {
    if let Scenario::Silent = scenario {
        tokio::time::sleep(Duration::from_secs(10)).await;
        return Ok(());
    }

    let mut peer = Framed::new(socket, PduCodec::new(0));
    let rq = match peer.next().await {
        Some(Ok(Pdu::AssociationRq(rq))) => rq,
        other => bail!("expected A-ASSOCIATE-RQ, got {:?}", other),
    };
    recorded.associations.lock().unwrap().push(rq.clone());

    if let Scenario::RejectAssociation = scenario {
        peer.send(Pdu::AssociationRj(AssociationRj { result: 1, source: 1, reason: 7 }))
            .await?;
        return Ok(());
    }

    let accept = !matches!(scenario, Scenario::RejectAllContexts);
    let mut contexts = HashMap::new();
    let mut results = Vec::new();
    for pc in &rq.presentation_contexts {
        let ts = pc.transfer_syntaxes.iter().find_map(|uid| TransferSyntax::from_uid(uid));
        match ts.filter(|_| accept) {
            Some(ts) => {
                contexts.insert(pc.id, ts);
                results.push(PresentationContextResult {
                    id: pc.id,
                    reason: PresentationContextResultReason::Acceptance,
                    transfer_syntax: ts.uid().to_string(),
                });
            }
            None => results.push(PresentationContextResult {
                id: pc.id,
                reason: PresentationContextResultReason::AbstractSyntaxNotSupported,
                transfer_syntax: TransferSyntax::ImplicitVrLittleEndian.uid().to_string(),
            }),
        }
    }

    peer.send(Pdu::AssociationAc(AssociationAc {
        protocol_version: PROTOCOL_VERSION,
        calling_ae_title: rq.calling_ae_title.clone(),
        called_ae_title: rq.called_ae_title.clone(),
        application_context_name: APPLICATION_CONTEXT_NAME.to_string(),
        presentation_contexts: results,
        user_variables: vec![UserVariableItem::MaxLength(16_384)],
    }))
    .await?;

    loop {
        let request = match read_message(&mut peer, &contexts).await? {
            Incoming::Message(request) => request,
            Incoming::Released | Incoming::Closed => return Ok(()),
        };
        recorded.requests.lock().unwrap().push(request.clone());

        let pc = request.presentation_context_id;
        let ts = contexts[&pc];
        let message_id = request.command.u16(tags::MESSAGE_ID).unwrap_or(0);
        let sop_class = request
            .command
            .string(tags::AFFECTED_SOP_CLASS_UID)
            .unwrap_or_default()
            .to_string();

        match (request.command_field(), scenario) {
            (Some(C_ECHO_RQ), scenario) => {
                let status = match scenario {
                    Scenario::Echo { status } => *status,
                    _ => 0x0000,
                };
                let rsp = command::response(&sop_class, C_ECHO_RSP, message_id, status, false);
                reply(&mut peer, pc, ts, &rsp, None).await?;
            }
            (Some(C_FIND_RQ), Scenario::Find(behavior)) => {
                let identifier = request
                    .data
                    .as_ref()
                    .ok_or_else(|| anyhow!("C-FIND-RQ without identifier"))?;
                let open = answer_find(
                    &mut peer, &contexts, recorded, pc, ts, &sop_class, message_id, identifier, behavior,
                )
                .await?;
                if !open {
                    return Ok(());
                }
            }
            (Some(C_STORE_RQ), scenario) => {
                let (status, comment) = match scenario {
                    Scenario::Store { status, comment } => (*status, *comment),
                    _ => (0x0000, None),
                };
                let mut rsp = command::response(&sop_class, C_STORE_RSP, message_id, status, false);
                if let Some(uid) = request.command.string(tags::AFFECTED_SOP_INSTANCE_UID) {
                    rsp.put_text(tags::AFFECTED_SOP_INSTANCE_UID, uid);
                }
                if let Some(comment) = comment {
                    rsp.put_text(tags::ERROR_COMMENT, comment);
                }
                reply(&mut peer, pc, ts, &rsp, None).await?;
            }
            // a cancel that raced the final response
            (Some(C_CANCEL_RQ), _) => {}
            (field, _) => bail!("unexpected command {:?}", field),
        }
    }
}

/// Returns whether the association is still open
#[allow(clippy::too_many_arguments)]
async fn answer_find(
    peer: &mut Peer,
    contexts: &HashMap<u8, TransferSyntax>,
    recorded: &Recorded,
    pc: u8,
    ts: TransferSyntax,
    sop_class: &str,
    message_id: u16,
    identifier: &Dataset,
    behavior: &FindBehavior,
) -> anyhow::Result<bool> {
    let matches = behavior.studies.iter().filter(|study| matches_identifier(study, identifier));

    for (index, study) in matches.enumerate() {
        if behavior.abort_after == Some(index) {
            peer.send(Pdu::Abort { source: 2, reason: 0 }).await?;
            return Ok(false);
        }
        let rsp = command::response(sop_class, C_FIND_RSP, message_id, 0xFF00, true);
        reply(peer, pc, ts, &rsp, Some(&response_identifier(study, identifier))).await?;
    }

    let status = if behavior.hold_until_cancel {
        match read_message(peer, contexts).await? {
            Incoming::Message(request) if request.command_field() == Some(C_CANCEL_RQ) => {
                recorded.requests.lock().unwrap().push(request);
                0xFE00
            }
            Incoming::Message(request) => bail!("expected C-CANCEL-RQ, got {:?}", request.command_field()),
            Incoming::Released | Incoming::Closed => return Ok(false),
        }
    } else {
        behavior.final_status
    };

    let rsp = command::response(sop_class, C_FIND_RSP, message_id, status, false);
    reply(peer, pc, ts, &rsp, None).await?;
    Ok(true)
}

/// Requested keys filled from the study, plus any private attributes
fn response_identifier(study: &Dataset, identifier: &Dataset) -> Dataset {
    let mut response = Dataset::new();
    for requested in identifier.iter() {
        match study.get(requested.tag) {
            Some(element) => response.put(element.clone()),
            None => response.put(requested.clone()),
        };
    }
    for element in study.iter().filter(|e| e.tag.group() % 2 == 1) {
        response.put(element.clone());
    }
    response
}

fn matches_identifier(study: &Dataset, identifier: &Dataset) -> bool {
    identifier
        .iter()
        .filter(|key| key.tag != tags::QUERY_RETRIEVE_LEVEL && key.tag != tags::SPECIFIC_CHARACTER_SET)
        .all(|key| {
            let wanted = key.value.to_text().unwrap_or_default();
            if wanted.is_empty() {
                return true;
            }
            let actual = study.text(key.tag).unwrap_or_default();
            matches_value(key, &wanted, &actual)
        })
}

fn matches_value(key: &DataElement, wanted: &str, actual: &str) -> bool {
    let actual_values: Vec<&str> = actual.split('\\').collect();
    wanted.split('\\').any(|wanted| {
        actual_values.iter().any(|actual| {
            if key.vr == VR::DA && wanted.contains('-') {
                let (from, to) = wanted.split_once('-').unwrap_or((wanted, wanted));
                (from.is_empty() || *actual >= from) && (to.is_empty() || *actual <= to)
            } else if wanted.contains('*') || wanted.contains('?') {
                let fold = key.vr == VR::PN;
                wildcard_match(wanted, actual, fold)
            } else {
                wanted == *actual
            }
        })
    })
}

fn wildcard_match(pattern: &str, text: &str, fold_case: bool) -> bool {
    let (pattern, text) = if fold_case {
        (pattern.to_uppercase(), text.to_uppercase())
    } else {
        (pattern.to_string(), text.to_string())
    };
    let pattern: Vec<char> = pattern.chars().collect();
    let text: Vec<char> = text.chars().collect();

    fn go(p: &[char], t: &[char]) -> bool {
        match (p.first(), t.first()) {
            (None, None) => true,
            (Some('*'), _) => go(&p[1..], t) || (!t.is_empty() && go(p, &t[1..])),
            (Some('?'), Some(_)) => go(&p[1..], &t[1..]),
            (Some(a), Some(b)) if a == b => go(&p[1..], &t[1..]),
            _ => false,
        }
    }
    go(&pattern, &text)
}

async fn read_message(peer: &mut Peer, contexts: &HashMap<u8, TransferSyntax>) -> anyhow::Result<Incoming> {
    let mut command_bytes = Vec::new();
    let mut data_bytes = Vec::new();
    let mut command_set: Option<(u8, Dataset)> = None;

    loop {
        let pdvs = match peer.next().await {
            Some(Ok(Pdu::PData { data })) => data,
            Some(Ok(Pdu::ReleaseRq)) => {
                peer.send(Pdu::ReleaseRp).await?;
                return Ok(Incoming::Released);
            }
            Some(Ok(Pdu::Abort { .. })) | None => return Ok(Incoming::Closed),
            Some(Ok(other)) => bail!("unexpected {}", other.short_name()),
            Some(Err(e)) => return Err(e.into()),
        };

        for pdv in pdvs {
            match pdv.value_type {
                PDataValueType::Command => {
                    command_bytes.extend_from_slice(&pdv.data);
                    if pdv.is_last {
                        let parsed = command::decode_command(&command_bytes)?;
                        if parsed.u16(tags::COMMAND_DATA_SET_TYPE) == Some(command::NO_DATA_SET) {
                            return Ok(Incoming::Message(Request {
                                presentation_context_id: pdv.presentation_context_id,
                                command: parsed,
                                data: None,
                            }));
                        }
                        command_set = Some((pdv.presentation_context_id, parsed));
                    }
                }
                PDataValueType::Data => {
                    data_bytes.extend_from_slice(&pdv.data);
                    if pdv.is_last {
                        let (pc, command) = command_set
                            .take()
                            .ok_or_else(|| anyhow!("data set before its command"))?;
                        let ts = contexts
                            .get(&pc)
                            .copied()
                            .ok_or_else(|| anyhow!("unknown presentation context {}", pc))?;
                        let data = Dataset::decode(&data_bytes, ts)?;
                        return Ok(Incoming::Message(Request {
                            presentation_context_id: pc,
                            command,
                            data: Some(data),
                        }));
                    }
                }
            }
        }
    }
}

async fn reply(
    peer: &mut Peer,
    pc: u8,
    ts: TransferSyntax,
    command_set: &Dataset,
    data: Option<&Dataset>,
) -> anyhow::Result<()> {
    let mut pdvs = vec![PDataValue {
        presentation_context_id: pc,
        value_type: PDataValueType::Command,
        is_last: true,
        data: command::encode_command(command_set)?,
    }];
    if let Some(data) = data {
        pdvs.push(PDataValue {
            presentation_context_id: pc,
            value_type: PDataValueType::Data,
            is_last: true,
            data: data.encode(ts)?,
        });
    }
    peer.send(Pdu::PData { data: pdvs }).await?;
    Ok(())
}
