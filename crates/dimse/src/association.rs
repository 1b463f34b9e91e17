//! Client side of a DICOM association
//!
//! [`ClientAssociation`] drives the requestor half of the upper layer state
//! machine over any async byte stream:
//!
//! ```text
//! Idle -> Connecting -> AssociationRequested -> Established -> Releasing -> Closed
//!                 \_______________ any failure _______________/ -> Aborted
//! ```
//!
//! Every read and write is bounded by the per-PDU timeout and by the deadline
//! of the whole operation, whichever comes first. Any transport failure,
//! protocol violation or timeout sends a best-effort A-ABORT and leaves the
//! association in `Aborted`.

use std::collections::VecDeque;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use crate::command;
use crate::config::{DimseConfig, RemoteNode};
use crate::dataset::Dataset;
use crate::error::{DimseError, Result};
use crate::pdu::{
    abort_source_name, AssociationRq, PDataValue, PDataValueType, Pdu, PduCodec,
    PresentationContextProposed, PresentationContextResultReason, UserIdentity, UserVariableItem,
    APPLICATION_CONTEXT_NAME, PDV_HEADER_LENGTH, PROTOCOL_VERSION,
};
use crate::transfer_syntax::TransferSyntax;
use crate::uid::{IMPLEMENTATION_CLASS_UID, IMPLEMENTATION_VERSION_NAME};

/// Upper bound for writing an A-ABORT or shutting the transport down
const CLOSE_TIMEOUT: Duration = Duration::from_millis(500);

/// Largest command set accepted once its fragments are joined
pub const MAX_COMMAND_LENGTH: usize = 16 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssociationState {
    Idle,
    Connecting,
    AssociationRequested,
    Established,
    Releasing,
    Closed,
    Aborted,
}

/// Everything needed to request an association
#[derive(Debug, Clone)]
pub struct AssociationOptions {
    pub calling_ae_title: String,
    pub called_ae_title: String,
    /// One presentation context is proposed per abstract syntax
    pub abstract_syntaxes: Vec<String>,
    /// Offered for every context, preferred first
    pub transfer_syntaxes: Vec<TransferSyntax>,
    /// Largest P-DATA-TF we accept, advertised to the peer
    pub max_pdu_length: u32,
    /// Largest reassembled data set we accept
    pub max_message_length: usize,
    pub connect_timeout: Duration,
    /// Bound on each individual PDU read or write
    pub read_timeout: Duration,
    /// Bound on everything from connect to release
    pub operation_timeout: Duration,
    /// Absolute deadline; derived from `operation_timeout` when unset
    pub deadline: Option<Instant>,
    pub user_identity: Option<UserIdentity>,
}

impl AssociationOptions {
    /// Options for talking to `node` with the given abstract syntaxes.
    ///
    /// A timeout configured on the node overrides all global timeouts.
    pub fn new(config: &DimseConfig, node: &RemoteNode, abstract_syntaxes: Vec<String>) -> Self {
        let (connect_timeout, read_timeout, operation_timeout) = match node.timeout_ms {
            Some(ms) => {
                let t = Duration::from_millis(ms);
                (t, t, t)
            }
            None => (
                config.connect_timeout(),
                config.read_timeout(),
                config.operation_timeout(),
            ),
        };

        Self {
            calling_ae_title: config.local_aet.clone(),
            called_ae_title: node.ae_title.clone(),
            abstract_syntaxes,
            transfer_syntaxes: config.transfer_syntaxes.clone(),
            max_pdu_length: node.max_pdu.unwrap_or(config.max_pdu),
            max_message_length: config.max_message_length,
            connect_timeout,
            read_timeout,
            operation_timeout,
            deadline: None,
            user_identity: node
                .credentials
                .as_ref()
                .map(|c| UserIdentity::username_password(&c.username, &c.password)),
        }
    }

    fn deadline(&self) -> Instant {
        self.deadline
            .unwrap_or_else(|| Instant::now() + self.operation_timeout)
    }
}

/// A presentation context accepted by the peer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresentationContext {
    pub id: u8,
    pub abstract_syntax: String,
    pub transfer_syntax: TransferSyntax,
}

/// A complete DIMSE message: command set plus optional raw data set
#[derive(Debug, Clone)]
pub struct DimseMessage {
    pub presentation_context_id: u8,
    pub command: Dataset,
    /// Data set bytes in the context's transfer syntax
    pub data: Option<Vec<u8>>,
}

#[derive(Debug, Default)]
struct Reassembly {
    presentation_context_id: Option<u8>,
    command_bytes: Vec<u8>,
    command: Option<Dataset>,
    data: Vec<u8>,
}

/// Requestor side of an association over the stream `S`
pub struct ClientAssociation<S> {
    framed: Framed<S, PduCodec>,
    state: AssociationState,
    called_ae_title: String,
    presentation_contexts: Vec<PresentationContext>,
    peer_max_pdu_length: u32,
    max_message_length: usize,
    read_timeout: Duration,
    deadline: Instant,
    next_message_id: u16,
    reassembly: Reassembly,
    inbox: VecDeque<DimseMessage>,
}

impl ClientAssociation<TcpStream> {
    /// Open a TCP connection to `node` and negotiate an association
    pub async fn connect(node: &RemoteNode, mut options: AssociationOptions) -> Result<Self> {
        let deadline = options.deadline();
        options.deadline = Some(deadline);
        let connect_deadline = (Instant::now() + options.connect_timeout).min(deadline);

        debug!("Connecting to {} ({})", node.address(), node.ae_title);
        let connected =
            timeout_at(connect_deadline, TcpStream::connect((node.host.as_str(), node.port))).await;
        let stream = match connected {
            Ok(Ok(stream)) => stream,
            Ok(Err(e)) => {
                return Err(DimseError::connection(format!(
                    "Failed to connect to {}: {}",
                    node.address(),
                    e
                )))
            }
            Err(_) => {
                return Err(DimseError::timeout(format!(
                    "Connecting to {} did not complete within {:?}",
                    node.address(),
                    options.connect_timeout
                )))
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            debug!("Could not set TCP_NODELAY: {}", e);
        }

        Self::establish(stream, options).await
    }
}

impl<S> ClientAssociation<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Negotiate an association over an already connected stream
    pub async fn establish(stream: S, options: AssociationOptions) -> Result<Self> {
        if options.abstract_syntaxes.is_empty() || options.abstract_syntaxes.len() > 128 {
            return Err(DimseError::config(
                "An association needs between 1 and 128 abstract syntaxes",
            ));
        }
        if options.transfer_syntaxes.is_empty() {
            return Err(DimseError::config("No transfer syntax to propose"));
        }

        let mut association = ClientAssociation {
            framed: Framed::new(stream, PduCodec::new(options.max_pdu_length)),
            state: AssociationState::Connecting,
            called_ae_title: options.called_ae_title.clone(),
            presentation_contexts: Vec::new(),
            peer_max_pdu_length: 0,
            max_message_length: options.max_message_length,
            read_timeout: options.read_timeout,
            deadline: options.deadline(),
            next_message_id: 1,
            reassembly: Reassembly::default(),
            inbox: VecDeque::new(),
        };

        let proposed: Vec<PresentationContextProposed> = options
            .abstract_syntaxes
            .iter()
            .enumerate()
            .map(|(index, abstract_syntax)| PresentationContextProposed {
                id: (index * 2 + 1) as u8,
                abstract_syntax: abstract_syntax.clone(),
                transfer_syntaxes: options
                    .transfer_syntaxes
                    .iter()
                    .map(|ts| ts.uid().to_string())
                    .collect(),
            })
            .collect();

        let mut user_variables = vec![
            UserVariableItem::MaxLength(options.max_pdu_length),
            UserVariableItem::ImplementationClassUid(IMPLEMENTATION_CLASS_UID.to_string()),
            UserVariableItem::ImplementationVersionName(IMPLEMENTATION_VERSION_NAME.to_string()),
        ];
        if let Some(identity) = options.user_identity.clone() {
            user_variables.push(UserVariableItem::UserIdentity(identity));
        }

        let request = AssociationRq {
            protocol_version: PROTOCOL_VERSION,
            calling_ae_title: options.calling_ae_title.clone(),
            called_ae_title: options.called_ae_title.clone(),
            application_context_name: APPLICATION_CONTEXT_NAME.to_string(),
            presentation_contexts: proposed.clone(),
            user_variables,
        };

        debug!(
            "Requesting association {} -> {} with {} presentation context(s)",
            options.calling_ae_title,
            options.called_ae_title,
            proposed.len()
        );
        association.write_pdu(Pdu::AssociationRq(request)).await?;
        association.state = AssociationState::AssociationRequested;

        match association.read_pdu().await? {
            Pdu::AssociationAc(ac) => {
                for result in &ac.presentation_contexts {
                    let Some(proposal) = proposed.iter().find(|p| p.id == result.id) else {
                        warn!("Peer answered unknown presentation context {}", result.id);
                        continue;
                    };
                    if result.reason != PresentationContextResultReason::Acceptance {
                        warn!(
                            "Presentation context {} ({}) rejected: {:?}",
                            result.id, proposal.abstract_syntax, result.reason
                        );
                        continue;
                    }
                    match TransferSyntax::from_uid(&result.transfer_syntax) {
                        Some(transfer_syntax) => {
                            association.presentation_contexts.push(PresentationContext {
                                id: result.id,
                                abstract_syntax: proposal.abstract_syntax.clone(),
                                transfer_syntax,
                            })
                        }
                        None => warn!(
                            "Presentation context {} accepted with unsupported transfer syntax {}",
                            result.id, result.transfer_syntax
                        ),
                    }
                }

                if association.presentation_contexts.is_empty() {
                    let err = DimseError::AssociationRejected(format!(
                        "{} accepted none of the proposed presentation contexts ({})",
                        options.called_ae_title,
                        options.abstract_syntaxes.join(", ")
                    ));
                    return Err(association.fail(err).await);
                }

                association.peer_max_pdu_length = ac.max_pdu_length().unwrap_or(0);
                association.state = AssociationState::Established;
                info!(
                    "Association established with {} ({} context(s), peer max PDU {})",
                    options.called_ae_title,
                    association.presentation_contexts.len(),
                    association.peer_max_pdu_length
                );
                for variable in &ac.user_variables {
                    match variable {
                        UserVariableItem::ImplementationClassUid(uid) => {
                            debug!("Peer implementation class UID {}", uid)
                        }
                        UserVariableItem::ImplementationVersionName(name) => {
                            debug!("Peer implementation version {}", name)
                        }
                        UserVariableItem::UserIdentityResponse(_) => {
                            debug!("Peer acknowledged user identity")
                        }
                        _ => {}
                    }
                }
                Ok(association)
            }
            Pdu::AssociationRj(rj) => {
                association.state = AssociationState::Aborted;
                association.shutdown().await;
                let reason = rj.describe();
                warn!("Association rejected by {}: {}", options.called_ae_title, reason);
                Err(DimseError::AssociationRejected(reason))
            }
            Pdu::Abort { source, reason } => Err(association.peer_aborted(source, reason).await),
            other => {
                let err = DimseError::protocol(format!(
                    "Expected A-ASSOCIATE-AC, received {}",
                    other.short_name()
                ));
                Err(association.fail(err).await)
            }
        }
    }

    pub fn state(&self) -> AssociationState {
        self.state
    }

    pub fn called_ae_title(&self) -> &str {
        &self.called_ae_title
    }

    pub fn presentation_contexts(&self) -> &[PresentationContext] {
        &self.presentation_contexts
    }

    /// Accepted context for an abstract syntax, if any
    pub fn context_for(&self, abstract_syntax: &str) -> Option<&PresentationContext> {
        self.presentation_contexts
            .iter()
            .find(|pc| pc.abstract_syntax == abstract_syntax)
    }

    /// Largest PDU the peer accepts (0 = no limit)
    pub fn peer_max_pdu_length(&self) -> u32 {
        self.peer_max_pdu_length
    }

    /// Allocate the next message ID. IDs are never 0 and unique until the
    /// 16-bit counter wraps.
    pub fn next_message_id(&mut self) -> u16 {
        let id = self.next_message_id;
        self.next_message_id = match self.next_message_id.wrapping_add(1) {
            0 => 1,
            next => next,
        };
        id
    }

    /// Send a command and optional data set, fragmented to the peer's
    /// maximum PDU length
    pub async fn send_message(
        &mut self,
        presentation_context_id: u8,
        command_set: &Dataset,
        data: Option<&[u8]>,
    ) -> Result<()> {
        self.ensure_established()?;

        let command_bytes = match command::encode_command(command_set) {
            Ok(bytes) => bytes,
            Err(e) => return Err(self.fail(e).await),
        };

        let max_fragment = match self.peer_max_pdu_length as usize {
            0 => usize::MAX,
            max => max.saturating_sub(PDV_HEADER_LENGTH).max(1),
        };

        self.send_fragments(presentation_context_id, PDataValueType::Command, &command_bytes, max_fragment)
            .await?;
        if let Some(data) = data {
            self.send_fragments(presentation_context_id, PDataValueType::Data, data, max_fragment)
                .await?;
        }
        Ok(())
    }

    async fn send_fragments(
        &mut self,
        presentation_context_id: u8,
        value_type: PDataValueType,
        bytes: &[u8],
        max_fragment: usize,
    ) -> Result<()> {
        let count = bytes.len().div_ceil(max_fragment).max(1);
        let mut chunks = bytes.chunks(max_fragment).peekable();

        if chunks.peek().is_none() {
            let pdv = PDataValue {
                presentation_context_id,
                value_type,
                is_last: true,
                data: Vec::new(),
            };
            return self.write_pdu(Pdu::PData { data: vec![pdv] }).await;
        }

        while let Some(chunk) = chunks.next() {
            let pdv = PDataValue {
                presentation_context_id,
                value_type,
                is_last: chunks.peek().is_none(),
                data: chunk.to_vec(),
            };
            self.write_pdu(Pdu::PData { data: vec![pdv] }).await?;
        }
        debug!("Sent {:?} in {} fragment(s)", value_type, count);
        Ok(())
    }

    /// Wait for the next complete DIMSE message.
    ///
    /// Cancel safe: partially received messages are kept on the association
    /// and completed by the next call.
    pub async fn receive_message(&mut self) -> Result<DimseMessage> {
        self.ensure_established()?;

        loop {
            if let Some(message) = self.inbox.pop_front() {
                return Ok(message);
            }

            match self.read_pdu().await? {
                Pdu::PData { data } => {
                    for pdv in data {
                        match self.accept_pdv(pdv) {
                            Ok(Some(message)) => self.inbox.push_back(message),
                            Ok(None) => {}
                            Err(e) => return Err(self.fail(e).await),
                        }
                    }
                }
                Pdu::Abort { source, reason } => {
                    return Err(self.peer_aborted(source, reason).await)
                }
                other => {
                    let err = DimseError::protocol(format!(
                        "Unexpected {} while waiting for a DIMSE message",
                        other.short_name()
                    ));
                    return Err(self.fail(err).await);
                }
            }
        }
    }

    fn accept_pdv(&mut self, pdv: PDataValue) -> Result<Option<DimseMessage>> {
        let pc_id = pdv.presentation_context_id;
        if !self.presentation_contexts.iter().any(|pc| pc.id == pc_id) {
            return Err(DimseError::protocol(format!(
                "PDV on presentation context {} which was not accepted",
                pc_id
            )));
        }
        match self.reassembly.presentation_context_id {
            Some(current) if current != pc_id => {
                return Err(DimseError::protocol(format!(
                    "PDV on context {} interleaved with a message on context {}",
                    pc_id, current
                )))
            }
            _ => self.reassembly.presentation_context_id = Some(pc_id),
        }

        match pdv.value_type {
            PDataValueType::Command => {
                if self.reassembly.command.is_some() {
                    return Err(DimseError::protocol(
                        "Command fragment received while a data set was expected",
                    ));
                }
                if self.reassembly.command_bytes.len() + pdv.data.len() > MAX_COMMAND_LENGTH {
                    return Err(DimseError::protocol(format!(
                        "Command set exceeds {} bytes",
                        MAX_COMMAND_LENGTH
                    )));
                }
                self.reassembly.command_bytes.extend_from_slice(&pdv.data);
                if !pdv.is_last {
                    return Ok(None);
                }

                let bytes = std::mem::take(&mut self.reassembly.command_bytes);
                let command_set = command::decode_command(&bytes)?;
                let has_data = command_set
                    .u16(dicom_dictionary_std::tags::COMMAND_DATA_SET_TYPE)
                    .map_or(false, |t| t != command::NO_DATA_SET);
                if has_data {
                    self.reassembly.command = Some(command_set);
                    return Ok(None);
                }

                self.reassembly = Reassembly::default();
                Ok(Some(DimseMessage {
                    presentation_context_id: pc_id,
                    command: command_set,
                    data: None,
                }))
            }
            PDataValueType::Data => {
                if self.reassembly.command.is_none() {
                    return Err(DimseError::protocol(
                        "Data set fragment received before its command",
                    ));
                }
                if self.reassembly.data.len() + pdv.data.len() > self.max_message_length {
                    return Err(DimseError::protocol(format!(
                        "Data set exceeds the limit of {} bytes",
                        self.max_message_length
                    )));
                }
                self.reassembly.data.extend_from_slice(&pdv.data);
                if !pdv.is_last {
                    return Ok(None);
                }

                let finished = std::mem::take(&mut self.reassembly);
                Ok(finished.command.map(|command_set| DimseMessage {
                    presentation_context_id: pc_id,
                    command: command_set,
                    data: Some(finished.data),
                }))
            }
        }
    }

    /// Orderly release: A-RELEASE-RQ, then wait for A-RELEASE-RP
    pub async fn release(&mut self) -> Result<()> {
        self.ensure_established()?;
        self.state = AssociationState::Releasing;
        self.write_pdu(Pdu::ReleaseRq).await?;

        loop {
            match self.read_pdu().await? {
                Pdu::ReleaseRp => {
                    self.state = AssociationState::Closed;
                    self.shutdown().await;
                    debug!("Association with {} released", self.called_ae_title);
                    return Ok(());
                }
                Pdu::PData { .. } => {
                    debug!("Discarding P-DATA-TF received while releasing");
                }
                Pdu::ReleaseRq => {
                    // release collision: the requestor answers first
                    self.write_pdu(Pdu::ReleaseRp).await?;
                }
                Pdu::Abort { source, reason } => {
                    return Err(self.peer_aborted(source, reason).await)
                }
                other => {
                    let err = DimseError::protocol(format!(
                        "Unexpected {} while releasing",
                        other.short_name()
                    ));
                    return Err(self.fail(err).await);
                }
            }
        }
    }

    /// Abort the association. Best effort: failures to notify the peer are
    /// ignored.
    pub async fn abort(&mut self) {
        if matches!(self.state, AssociationState::Closed | AssociationState::Aborted) {
            return;
        }
        self.send_abort().await;
    }

    fn ensure_established(&self) -> Result<()> {
        if self.state != AssociationState::Established {
            return Err(DimseError::protocol(format!(
                "Association is {:?}, not established",
                self.state
            )));
        }
        Ok(())
    }

    fn io_deadline(&self) -> Instant {
        (Instant::now() + self.read_timeout).min(self.deadline)
    }

    fn timeout_error(&self, what: &str) -> DimseError {
        if Instant::now() >= self.deadline {
            DimseError::timeout(format!("Operation deadline passed while {}", what))
        } else {
            DimseError::timeout(format!("No progress within {:?} while {}", self.read_timeout, what))
        }
    }

    async fn write_pdu(&mut self, pdu: Pdu) -> Result<()> {
        let name = pdu.short_name();
        let deadline = self.io_deadline();
        let result = timeout_at(deadline, self.framed.send(pdu)).await;
        match result {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(self.fail(e).await),
            Err(_) => {
                let err = self.timeout_error(&format!("sending {}", name));
                Err(self.fail(err).await)
            }
        }
    }

    async fn read_pdu(&mut self) -> Result<Pdu> {
        let deadline = self.io_deadline();
        let result = timeout_at(deadline, self.framed.next()).await;
        match result {
            Ok(Some(Ok(pdu))) => {
                debug!("Received {}", pdu.short_name());
                Ok(pdu)
            }
            Ok(Some(Err(e))) => Err(self.fail(e).await),
            Ok(None) => {
                let err = DimseError::connection(format!(
                    "{} closed the connection",
                    self.called_ae_title
                ));
                Err(self.fail(err).await)
            }
            Err(_) => {
                let err = self.timeout_error("waiting for the peer");
                Err(self.fail(err).await)
            }
        }
    }

    /// Abort after a local failure and hand the error back
    async fn fail(&mut self, err: DimseError) -> DimseError {
        if !matches!(self.state, AssociationState::Closed | AssociationState::Aborted) {
            warn!("Aborting association with {}: {}", self.called_ae_title, err);
            self.send_abort().await;
        }
        err
    }

    async fn peer_aborted(&mut self, source: u8, reason: u8) -> DimseError {
        warn!(
            "Association aborted by {} ({}), reason {}",
            self.called_ae_title,
            abort_source_name(source),
            reason
        );
        self.state = AssociationState::Aborted;
        self.shutdown().await;
        DimseError::Aborted {
            source_name: abort_source_name(source),
            reason,
        }
    }

    async fn send_abort(&mut self) {
        self.state = AssociationState::Aborted;
        let sent = timeout(CLOSE_TIMEOUT, self.framed.send(Pdu::Abort { source: 0, reason: 0 })).await;
        if !matches!(sent, Ok(Ok(()))) {
            debug!("A-ABORT could not be delivered to {}", self.called_ae_title);
        }
        self.shutdown().await;
    }

    async fn shutdown(&mut self) {
        let _ = timeout(CLOSE_TIMEOUT, self.framed.get_mut().shutdown()).await;
    }
}

#[cfg(test)]
impl<S> ClientAssociation<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// An association that is already established, for exercising the
    /// post-negotiation paths against scripted I/O
    pub(crate) fn established_for_test(stream: S, contexts: Vec<PresentationContext>) -> Self {
        ClientAssociation {
            framed: Framed::new(stream, PduCodec::default()),
            state: AssociationState::Established,
            called_ae_title: "TEST".to_string(),
            presentation_contexts: contexts,
            peer_max_pdu_length: 0,
            max_message_length: crate::config::DEFAULT_MAX_MESSAGE_LENGTH,
            read_timeout: Duration::from_secs(5),
            deadline: Instant::now() + Duration::from_secs(5),
            next_message_id: 1,
            reassembly: Reassembly::default(),
            inbox: VecDeque::new(),
        }
    }
}
