//! Service Class User (SCU) implementation for outbound DIMSE operations
//!
//! Each [`DimseScu`] operation opens its own association, runs one
//! exchange and releases the association before returning. The
//! association-level functions ([`c_echo`], [`c_store`], [`FindExchange`])
//! work on any established [`ClientAssociation`].

use futures::stream::Stream;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::association::{AssociationOptions, ClientAssociation, DimseMessage, PresentationContext};
use crate::command::{self, CommandResponse};
use crate::config::{DimseConfig, RemoteNode};
use crate::dataset::Dataset;
use crate::transfer_syntax::TransferSyntax;
use crate::types::{
    DimseStatus, EchoOutcome, FindEvent, FindQuery, FindSummary, StoreOutcome, StoreRequest,
    VERIFICATION_SOP_CLASS,
};
use crate::{DimseError, Result};

/// DIMSE Service Class User
#[derive(Debug, Clone)]
pub struct DimseScu {
    config: DimseConfig,
}

impl DimseScu {
    /// Create a new SCU with the given configuration
    pub fn new(config: DimseConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DimseConfig {
        &self.config
    }

    async fn open(&self, node: &RemoteNode, abstract_syntax: &str) -> Result<ClientAssociation<TcpStream>> {
        self.config.validate()?;
        node.validate()?;
        let options = AssociationOptions::new(&self.config, node, vec![abstract_syntax.to_string()]);
        ClientAssociation::connect(node, options).await
    }

    /// Send a C-ECHO request to a remote node
    pub async fn echo(&self, node: &RemoteNode) -> Result<EchoOutcome> {
        info!("Sending C-ECHO to {}@{}:{}", node.ae_title, node.host, node.port);

        let mut association = self.open(node, VERIFICATION_SOP_CLASS).await?;
        let status = c_echo(&mut association).await?;
        finish(&mut association).await;

        if status.is_success() {
            info!("C-ECHO to {} completed successfully", node.ae_title);
        } else {
            warn!("C-ECHO to {} returned {}", node.ae_title, status);
        }
        Ok(EchoOutcome { status })
    }

    /// Send a C-FIND request to a remote node.
    ///
    /// Matches are yielded in the order the peer sent them. The stream ends
    /// with [`FindEvent::Completed`] once the association has been released.
    /// Cancelling `cancel` sends C-CANCEL; matches received so far stay valid
    /// and the stream still completes normally.
    pub fn find(
        &self,
        node: &RemoteNode,
        query: FindQuery,
        cancel: CancellationToken,
    ) -> impl Stream<Item = Result<FindEvent>> + Send + 'static {
        let config = self.config.clone();
        let node = node.clone();

        async_stream::try_stream! {
            config.validate()?;
            node.validate()?;
            info!(
                "Sending C-FIND to {}@{}:{} (max_results: {})",
                node.ae_title, node.host, node.port, query.max_results
            );

            let options = AssociationOptions::new(&config, &node, vec![query.sop_class_uid.clone()]);
            let mut association = ClientAssociation::connect(&node, options).await?;

            let mut exchange = FindExchange::start(&mut association, &query, cancel).await?;
            while let Some(identifier) = exchange.next_match().await? {
                yield FindEvent::Match(identifier);
            }
            let summary = exchange
                .into_summary()
                .ok_or_else(|| DimseError::protocol("C-FIND ended without a final response"))?;

            finish(&mut association).await;
            info!(
                "C-FIND to {} finished with {} after {} match(es)",
                node.ae_title, summary.status, summary.matches
            );
            yield FindEvent::Completed(summary);
        }
    }

    /// Send a C-STORE request to a remote node
    pub async fn store(&self, node: &RemoteNode, request: StoreRequest) -> Result<StoreOutcome> {
        info!(
            "Sending C-STORE of {} to {}@{}:{}",
            request.sop_instance_uid, node.ae_title, node.host, node.port
        );

        let mut association = self.open(node, &request.sop_class_uid).await?;
        let outcome = c_store(&mut association, &request).await?;
        finish(&mut association).await;
        Ok(outcome)
    }
}

/// Release after a completed exchange. The exchange's outcome stands even
/// if the peer fumbles the release.
async fn finish<S>(association: &mut ClientAssociation<S>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    if let Err(e) = association.release().await {
        warn!(
            "Release of association with {} failed: {}",
            association.called_ae_title(),
            e
        );
    }
}

async fn context<S>(association: &mut ClientAssociation<S>, abstract_syntax: &str) -> Result<PresentationContext>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match association.context_for(abstract_syntax) {
        Some(pc) => Ok(pc.clone()),
        None => {
            association.abort().await;
            Err(DimseError::AssociationRejected(format!(
                "No accepted presentation context for {}",
                abstract_syntax
            )))
        }
    }
}

/// Parse a response and check it answers `message_id` with `expected`
async fn check_response<S>(
    association: &mut ClientAssociation<S>,
    message: &DimseMessage,
    expected: u16,
    message_id: u16,
) -> Result<CommandResponse>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let response = match CommandResponse::from_dataset(&message.command) {
        Ok(response) => response,
        Err(e) => {
            association.abort().await;
            return Err(e);
        }
    };

    if response.command_field != expected {
        association.abort().await;
        return Err(DimseError::protocol(format!(
            "Expected {}, received {}",
            command::command_name(expected),
            command::command_name(response.command_field)
        )));
    }
    if response.message_id_being_responded_to != message_id {
        association.abort().await;
        return Err(DimseError::protocol(format!(
            "{} answers message {}, expected {}",
            command::command_name(expected),
            response.message_id_being_responded_to,
            message_id
        )));
    }
    Ok(response)
}

/// Decode a received data set, aborting if it is malformed
async fn decode_data<S>(
    association: &mut ClientAssociation<S>,
    bytes: &[u8],
    transfer_syntax: TransferSyntax,
) -> Result<Dataset>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match Dataset::decode(bytes, transfer_syntax) {
        Ok(dataset) => Ok(dataset),
        Err(e) => {
            association.abort().await;
            Err(e)
        }
    }
}

/// C-ECHO over an established association
pub async fn c_echo<S>(association: &mut ClientAssociation<S>) -> Result<DimseStatus>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let pc = context(association, VERIFICATION_SOP_CLASS).await?;
    let message_id = association.next_message_id();
    association
        .send_message(pc.id, &command::echo_rq(VERIFICATION_SOP_CLASS, message_id), None)
        .await?;

    let message = association.receive_message().await?;
    let response = check_response(association, &message, command::C_ECHO_RSP, message_id).await?;
    debug!("C-ECHO-RSP status {}", response.status);
    Ok(response.status)
}

/// C-STORE over an established association.
///
/// A non-success status is returned in the outcome, not as an error.
pub async fn c_store<S>(association: &mut ClientAssociation<S>, request: &StoreRequest) -> Result<StoreOutcome>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let pc = context(association, &request.sop_class_uid).await?;
    let data = match request.dataset.encode(pc.transfer_syntax) {
        Ok(data) => data,
        Err(e) => {
            association.abort().await;
            return Err(e);
        }
    };

    let message_id = association.next_message_id();
    let command_set = command::store_rq(
        &request.sop_class_uid,
        &request.sop_instance_uid,
        message_id,
        request.priority,
    );
    debug!(
        "C-STORE-RQ {} ({} bytes, {})",
        request.sop_instance_uid,
        data.len(),
        pc.transfer_syntax
    );
    association.send_message(pc.id, &command_set, Some(&data)).await?;

    let message = association.receive_message().await?;
    let response = check_response(association, &message, command::C_STORE_RSP, message_id).await?;
    if !response.status.is_success() {
        warn!(
            "C-STORE of {} returned {}{}",
            request.sop_instance_uid,
            response.status,
            response
                .error_comment
                .as_deref()
                .map(|c| format!(": {}", c))
                .unwrap_or_default()
        );
    }

    Ok(StoreOutcome {
        status: response.status,
        sop_instance_uid: request.sop_instance_uid.clone(),
        error_comment: response.error_comment,
    })
}

enum FindStep {
    Cancel,
    Message(Result<DimseMessage>),
}

/// One C-FIND request and its stream of responses
pub struct FindExchange<'a, S> {
    association: &'a mut ClientAssociation<S>,
    presentation_context_id: u8,
    transfer_syntax: TransferSyntax,
    message_id: u16,
    cancel: CancellationToken,
    max_results: usize,
    matches: usize,
    cancelled: bool,
    summary: Option<FindSummary>,
}

impl<'a, S> FindExchange<'a, S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Send the C-FIND-RQ with the query identifier
    pub async fn start(
        association: &'a mut ClientAssociation<S>,
        query: &FindQuery,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let pc = context(association, &query.sop_class_uid).await?;
        let identifier = match query.identifier.encode(pc.transfer_syntax) {
            Ok(bytes) => bytes,
            Err(e) => {
                association.abort().await;
                return Err(e);
            }
        };

        let message_id = association.next_message_id();
        let command_set = command::find_rq(&query.sop_class_uid, message_id, query.priority);
        association.send_message(pc.id, &command_set, Some(&identifier)).await?;

        Ok(Self {
            association,
            presentation_context_id: pc.id,
            transfer_syntax: pc.transfer_syntax,
            message_id,
            cancel,
            max_results: query.max_results,
            matches: 0,
            cancelled: false,
            summary: None,
        })
    }

    /// Next matching identifier; `None` once the final response arrived.
    ///
    /// After a cancel, pending responses still in flight are discarded and
    /// only the final response is awaited.
    pub async fn next_match(&mut self) -> Result<Option<Dataset>> {
        loop {
            if self.summary.is_some() {
                return Ok(None);
            }

            let limit_reached = self.max_results > 0 && self.matches >= self.max_results;
            if !self.cancelled && (limit_reached || self.cancel.is_cancelled()) {
                self.send_cancel().await?;
            }

            let step = if self.cancelled {
                FindStep::Message(self.association.receive_message().await)
            } else {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => FindStep::Cancel,
                    message = self.association.receive_message() => FindStep::Message(message),
                }
            };

            let message = match step {
                FindStep::Cancel => {
                    self.send_cancel().await?;
                    continue;
                }
                FindStep::Message(message) => message?,
            };

            let response =
                check_response(self.association, &message, command::C_FIND_RSP, self.message_id)
                    .await?;

            if response.status.is_pending() {
                let Some(data) = message.data.as_deref() else {
                    self.association.abort().await;
                    return Err(DimseError::protocol(
                        "Pending C-FIND response carries no identifier",
                    ));
                };
                if self.cancelled {
                    debug!("Discarding C-FIND match received after cancel");
                    continue;
                }
                let identifier = decode_data(self.association, data, self.transfer_syntax).await?;
                self.matches += 1;
                return Ok(Some(identifier));
            }

            let status = response.status;
            if !status.is_success() && !(self.cancelled && status == DimseStatus::Cancel) {
                warn!(
                    "C-FIND ended with {}{}",
                    status,
                    response
                        .error_comment
                        .as_deref()
                        .map(|c| format!(": {}", c))
                        .unwrap_or_default()
                );
            }
            self.summary = Some(FindSummary {
                status,
                cancelled: self.cancelled,
                matches: self.matches,
                error_comment: response.error_comment,
            });
            return Ok(None);
        }
    }

    async fn send_cancel(&mut self) -> Result<()> {
        self.cancelled = true;
        info!(
            "Cancelling C-FIND (message {}) after {} match(es)",
            self.message_id, self.matches
        );
        self.association
            .send_message(
                self.presentation_context_id,
                &command::cancel_rq(self.message_id),
                None,
            )
            .await
    }

    pub fn matches(&self) -> usize {
        self.matches
    }

    /// Final summary, available once `next_match` has returned `None`
    pub fn into_summary(self) -> Option<FindSummary> {
        self.summary
    }
}
