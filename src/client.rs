//! High level PACS operations

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

use base64::Engine;
use dimse::types::ENCAPSULATED_PDF_STORAGE;
use dimse::uid::is_valid_uid;
use dimse::{generate_uid, DimseScu, FindEvent, FindQuery, StoreRequest};
use futures_util::{pin_mut, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PacsConfig;
use crate::encapsulated_pdf::{build_encapsulated_pdf, ReportMetadata};
use crate::error::Result;
use crate::models::{ConnectionStatus, DicomStudy, QueryResult, StoreResult, StudyQueryParams};

/// Client for one configured PACS.
///
/// Every operation opens its own association and closes it before
/// returning, so a client can be shared between tasks. Configuration is
/// swapped atomically; operations already running keep the settings they
/// started with.
#[derive(Debug)]
pub struct PacsClient {
    config: RwLock<Arc<PacsConfig>>,
    connected: AtomicBool,
}

impl PacsClient {
    /// Create a client; the configuration is validated up front
    pub fn new(config: PacsConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: RwLock::new(Arc::new(config)),
            connected: AtomicBool::new(false),
        })
    }

    /// Snapshot of the current configuration
    pub fn config(&self) -> Arc<PacsConfig> {
        match self.config.read() {
            Ok(guard) => Arc::clone(&*guard),
            Err(poisoned) => Arc::clone(&*poisoned.into_inner()),
        }
    }

    /// Replace the configuration. The previous verification no longer
    /// applies, so the client reports itself disconnected.
    pub fn update_config(&self, config: PacsConfig) -> Result<()> {
        config.validate()?;
        let config = Arc::new(config);
        match self.config.write() {
            Ok(mut guard) => *guard = config,
            Err(poisoned) => *poisoned.into_inner() = config,
        }
        self.connected.store(false, Ordering::SeqCst);
        info!("PACS configuration updated");
        Ok(())
    }

    /// Whether the last verification succeeded
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Forget the last verification result. No network traffic is involved
    /// since associations are never held open.
    pub fn disconnect(&self) {
        self.connected.store(false, Ordering::SeqCst);
    }

    /// Verify the PACS with C-ECHO.
    ///
    /// Returns `Ok(false)` when the PACS answered with a non-success
    /// status; transport and negotiation problems are errors.
    pub async fn test_connection(&self) -> Result<bool> {
        let config = self.config();
        let scu = DimseScu::new(config.dimse_config());

        match scu.echo(&config.remote()).await {
            Ok(outcome) => {
                let success = outcome.is_success();
                self.connected.store(success, Ordering::SeqCst);
                if !success {
                    warn!("PACS verification returned {}", outcome.status);
                }
                Ok(success)
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                warn!("PACS verification failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// [`PacsClient::test_connection`] folded into a serializable report
    pub async fn connection_status(&self) -> ConnectionStatus {
        let config = self.config();
        let (success, error) = match self.test_connection().await {
            Ok(true) => (true, None),
            Ok(false) => (false, Some("PACS rejected the verification request".to_string())),
            Err(e) => (false, Some(e.to_string())),
        };
        ConnectionStatus {
            success,
            host: config.host.clone(),
            port: config.port,
            local_ae_title: config.local_ae_title.clone(),
            remote_ae_title: config.remote_ae_title.clone(),
            error,
        }
    }

    /// Search studies. Never fails: problems are reported in the result,
    /// together with whatever matches arrived before them.
    pub async fn query_studies(&self, params: &StudyQueryParams) -> QueryResult {
        self.query_studies_with_cancel(params, CancellationToken::new()).await
    }

    /// Search studies, stopping early when `cancel` fires. A cancelled
    /// search still succeeds with the matches received so far.
    pub async fn query_studies_with_cancel(
        &self,
        params: &StudyQueryParams,
        cancel: CancellationToken,
    ) -> QueryResult {
        let config = self.config();
        let scu = DimseScu::new(config.dimse_config());
        let query = FindQuery::study_root(params.to_identifier())
            .with_max_results(params.max_results.unwrap_or(0));
        debug!("Study query: {:?}", params);

        let stream = scu.find(&config.query_remote(), query, cancel);
        pin_mut!(stream);

        let mut studies = Vec::new();
        while let Some(event) = stream.next().await {
            match event {
                Ok(FindEvent::Match(identifier)) => {
                    studies.push(DicomStudy::from_dataset(&identifier));
                }
                Ok(FindEvent::Completed(summary)) => {
                    if summary.is_success() {
                        info!("Study query returned {} result(s)", studies.len());
                        return QueryResult::completed(studies, summary.cancelled);
                    }
                    let mut error = format!("C-FIND failed with status {}", summary.status);
                    if let Some(comment) = &summary.error_comment {
                        error.push_str(": ");
                        error.push_str(comment);
                    }
                    warn!("{}", error);
                    return QueryResult::failed(studies, error);
                }
                Err(e) => {
                    warn!("Study query failed after {} result(s): {}", studies.len(), e);
                    return QueryResult::failed(studies, e.to_string());
                }
            }
        }

        QueryResult::failed(studies, "C-FIND ended without a final status")
    }

    /// Store a PDF report as an Encapsulated PDF instance in the study
    /// described by `metadata`.
    pub async fn store_report_pdf(&self, pdf: &[u8], metadata: &ReportMetadata) -> StoreResult {
        let sop_instance_uid = match metadata.sop_instance_uid.as_deref().map(str::trim) {
            Some(uid) if !uid.is_empty() => {
                if !is_valid_uid(uid) {
                    return StoreResult::failed(format!("Invalid SOP Instance UID {:?}", uid));
                }
                uid.to_string()
            }
            _ => generate_uid(),
        };

        let dataset = match build_encapsulated_pdf(pdf, metadata, &sop_instance_uid) {
            Ok(dataset) => dataset,
            Err(e) => return StoreResult::failed(e.to_string()),
        };

        let config = self.config();
        let scu = DimseScu::new(config.dimse_config());
        let request = StoreRequest::new(ENCAPSULATED_PDF_STORAGE, sop_instance_uid.clone(), dataset);

        match scu.store(&config.store_remote(), request).await {
            Ok(outcome) if outcome.is_success() => {
                info!(
                    "Stored report {} for study {}",
                    sop_instance_uid, metadata.study_instance_uid
                );
                StoreResult::stored(sop_instance_uid)
            }
            Ok(outcome) => {
                let mut error = format!("C-STORE failed with status {}", outcome.status);
                if let Some(comment) = &outcome.error_comment {
                    error.push_str(": ");
                    error.push_str(comment);
                }
                warn!("{}", error);
                StoreResult {
                    status: Some(outcome.status.code()),
                    ..StoreResult::failed(error)
                }
            }
            Err(e) => {
                warn!("Report store failed: {}", e);
                StoreResult::failed(e.to_string())
            }
        }
    }

    /// [`PacsClient::store_report_pdf`] for a base64 encoded document, as
    /// uploaded by the web front end
    pub async fn store_report_base64(&self, pdf_base64: &str, metadata: &ReportMetadata) -> StoreResult {
        match base64::engine::general_purpose::STANDARD.decode(pdf_base64.trim()) {
            Ok(pdf) => self.store_report_pdf(&pdf, metadata).await,
            Err(e) => StoreResult::failed(format!("Invalid base64 PDF: {}", e)),
        }
    }
}
