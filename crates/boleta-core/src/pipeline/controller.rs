//! Pipeline controller state machine.
//!
//! Each submission starts a new run with its own generation number and
//! cancellation token. Suspended steps race the token, and every state write
//! is checked against the current generation, so results of a superseded run
//! are discarded instead of being applied to the newer one.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::approval::ApprovalCoordinator;
use crate::error::{OcrError, PipelineError};
use crate::models::config::PipelineConfig;
use crate::models::receipt::ParsedReceipt;
use crate::ocr::{RawOcrText, ReceiptImage, TextRecognizer};
use crate::receipt::{ReceiptParser, RuleReceiptParser};
use crate::reconcile::{
    AmountCrossChecker, ReconciliationClient, ReconciliationOutcome, RegistrationStore,
};

use super::state::{NotFoundReason, PipelineState, StateChange};

/// How a call into the controller ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run reached `state` and waits for the operator or a new submission.
    Settled(PipelineState),
    /// A newer submission (or `abandon`) took over; this run's results were discarded.
    Superseded { run: u64 },
}

impl RunOutcome {
    pub fn state(&self) -> Option<&PipelineState> {
        match self {
            Self::Settled(state) => Some(state),
            Self::Superseded { .. } => None,
        }
    }
}

struct RunTicket {
    generation: u64,
    cancel: CancellationToken,
}

struct RunSlot {
    generation: u64,
    cancel: CancellationToken,
    state: PipelineState,
    history: Vec<StateChange>,
}

/// Builder for [`PipelineController`].
pub struct PipelineBuilder {
    recognizer: Arc<dyn TextRecognizer>,
    store: Arc<dyn RegistrationStore>,
    parser: Arc<dyn ReceiptParser>,
    cross_checker: AmountCrossChecker,
    approvals: Option<Arc<ApprovalCoordinator>>,
    config: PipelineConfig,
    max_image_bytes: usize,
}

impl PipelineBuilder {
    pub fn new(recognizer: Arc<dyn TextRecognizer>, store: Arc<dyn RegistrationStore>) -> Self {
        Self {
            recognizer,
            store,
            parser: Arc::new(RuleReceiptParser::new()),
            cross_checker: AmountCrossChecker::new(),
            approvals: None,
            config: PipelineConfig::default(),
            max_image_bytes: 0,
        }
    }

    /// Set the receipt parser.
    pub fn with_parser(mut self, parser: Arc<dyn ReceiptParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Set the amount cross-checker.
    pub fn with_cross_checker(mut self, cross_checker: AmountCrossChecker) -> Self {
        self.cross_checker = cross_checker;
        self
    }

    /// Share an approval coordinator (and its idempotency ledger) with other controllers.
    pub fn with_approvals(mut self, approvals: Arc<ApprovalCoordinator>) -> Self {
        self.approvals = Some(approvals);
        self
    }

    /// Set configuration.
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Reject uploads larger than `limit` bytes in [`PipelineController::submit_bytes`].
    pub fn with_max_image_bytes(mut self, limit: usize) -> Self {
        self.max_image_bytes = limit;
        self
    }

    /// Build the controller.
    pub fn build(self) -> PipelineController {
        let (events, _) = broadcast::channel(self.config.event_capacity.max(1));
        let approvals = self
            .approvals
            .unwrap_or_else(|| Arc::new(ApprovalCoordinator::new(self.store.clone())));

        PipelineController {
            recognizer: self.recognizer,
            parser: self.parser,
            reconciler: ReconciliationClient::new(self.store),
            cross_checker: self.cross_checker,
            approvals,
            language: self.config.language,
            max_image_bytes: self.max_image_bytes,
            slot: Mutex::new(RunSlot {
                generation: 0,
                cancel: CancellationToken::new(),
                state: PipelineState::Idle,
                history: Vec::new(),
            }),
            events,
        }
    }
}

/// Sequences recognition, extraction, lookup and approval for one upload surface.
pub struct PipelineController {
    recognizer: Arc<dyn TextRecognizer>,
    parser: Arc<dyn ReceiptParser>,
    reconciler: ReconciliationClient,
    cross_checker: AmountCrossChecker,
    approvals: Arc<ApprovalCoordinator>,
    language: String,
    max_image_bytes: usize,
    slot: Mutex<RunSlot>,
    events: broadcast::Sender<StateChange>,
}

impl PipelineController {
    /// Create a new builder.
    pub fn builder(
        recognizer: Arc<dyn TextRecognizer>,
        store: Arc<dyn RegistrationStore>,
    ) -> PipelineBuilder {
        PipelineBuilder::new(recognizer, store)
    }

    /// Current state.
    pub fn state(&self) -> PipelineState {
        self.lock().state.clone()
    }

    /// Transitions applied since the last submission.
    pub fn history(&self) -> Vec<StateChange> {
        self.lock().history.clone()
    }

    /// Receive every applied transition.
    pub fn subscribe(&self) -> broadcast::Receiver<StateChange> {
        self.events.subscribe()
    }

    /// Validate an upload and run it through the pipeline.
    pub async fn submit_bytes(
        &self,
        bytes: Vec<u8>,
        media_type: &str,
    ) -> Result<RunOutcome, OcrError> {
        let image = ReceiptImage::new(bytes, media_type)?.ensure_within(self.max_image_bytes)?;
        Ok(self.submit(image).await)
    }

    /// Start a new run for `image`, cancelling any run in flight.
    ///
    /// Returns once the run reaches `Found` or a terminal state.
    pub async fn submit(&self, image: ReceiptImage) -> RunOutcome {
        let ticket = self.begin_submission();
        info!(
            "Run {}: recognizing {} bytes of {}",
            ticket.generation,
            image.size(),
            image.media_type().mime()
        );

        let recognized = tokio::select! {
            _ = ticket.cancel.cancelled() => return self.superseded(&ticket),
            recognized = self.recognizer.recognize(image, &self.language) => recognized,
        };

        match recognized {
            Ok(text) => self.process_text(ticket, text).await,
            Err(e) => {
                warn!("Run {}: recognition failed: {}", ticket.generation, e);
                self.settle(
                    &ticket,
                    PipelineState::ExtractionError {
                        message: e.to_string(),
                    },
                )
            }
        }
    }

    /// Start a new run from text typed or pasted by the operator.
    pub async fn submit_transcript(&self, text: impl Into<String>) -> RunOutcome {
        let ticket = self.begin_submission();
        info!("Run {}: using operator transcript", ticket.generation);
        self.process_text(ticket, RawOcrText::new(text)).await
    }

    /// Approve the registrations found in the current run.
    pub async fn confirm(&self) -> Result<RunOutcome, PipelineError> {
        let (ticket, outcome) = {
            let mut slot = self.lock();
            let PipelineState::Found { outcome, .. } = &slot.state else {
                return Err(PipelineError::NothingToConfirm(slot.state.name()));
            };
            let outcome = outcome.clone();
            let ticket = RunTicket {
                generation: slot.generation,
                cancel: slot.cancel.clone(),
            };
            self.record(
                &mut slot,
                PipelineState::Approving {
                    outcome: outcome.clone(),
                },
            );
            (ticket, outcome)
        };

        info!(
            "Run {}: operator confirmed receipt {} ({} registrations)",
            ticket.generation,
            outcome.code,
            outcome.candidates.len()
        );

        let committed = tokio::select! {
            _ = ticket.cancel.cancelled() => return Ok(self.superseded(&ticket)),
            committed = self.approvals.approve(&outcome) => committed,
        };

        let state = match committed {
            Ok(result) if result.is_total_failure() => PipelineState::ApprovalError {
                code: outcome.code.clone(),
                message: "no registration could be approved".to_string(),
                result: Some(result),
            },
            Ok(result) => PipelineState::Approved { result },
            Err(e) => PipelineState::ApprovalError {
                code: outcome.code.clone(),
                message: e.to_string(),
                result: None,
            },
        };

        Ok(self.settle(&ticket, state))
    }

    /// Repeat a failed lookup with the same receipt code.
    pub async fn retry_search(&self) -> Result<RunOutcome, PipelineError> {
        let (ticket, receipt, code) = {
            let mut slot = self.lock();
            let PipelineState::SearchError { receipt, code, .. } = &slot.state else {
                return Err(PipelineError::NothingToRetry(slot.state.name()));
            };
            let (receipt, code) = (receipt.clone(), code.clone());
            (Self::start_run(&mut slot), receipt, code)
        };

        info!("Run {}: operator retried lookup for {}", ticket.generation, code);
        Ok(self.search(ticket, receipt, code).await)
    }

    /// Cancel whatever is in flight and return to `Idle`.
    pub fn abandon(&self) {
        let mut slot = self.lock();
        let ticket = Self::start_run(&mut slot);
        slot.history.clear();
        self.record(&mut slot, PipelineState::Idle);
        debug!("Run {}: abandoned by caller", ticket.generation);
    }

    fn begin_submission(&self) -> RunTicket {
        let mut slot = self.lock();
        let ticket = Self::start_run(&mut slot);
        slot.history.clear();
        self.record(&mut slot, PipelineState::Extracting);
        ticket
    }

    async fn process_text(&self, ticket: RunTicket, text: RawOcrText) -> RunOutcome {
        let receipt = self.parser.parse(text.as_str());

        if !self.advance(
            &ticket,
            PipelineState::Parsed {
                receipt: receipt.clone(),
            },
        ) {
            return self.superseded(&ticket);
        }

        match receipt.receipt_code.clone() {
            Some(code) => self.search(ticket, receipt, code).await,
            None => self.settle(
                &ticket,
                PipelineState::NotFound {
                    receipt,
                    reason: NotFoundReason::NoCodeExtracted,
                },
            ),
        }
    }

    async fn search(&self, ticket: RunTicket, receipt: ParsedReceipt, code: String) -> RunOutcome {
        if !self.advance(
            &ticket,
            PipelineState::Searching {
                receipt: receipt.clone(),
                code: code.clone(),
            },
        ) {
            return self.superseded(&ticket);
        }

        let lookup = tokio::select! {
            _ = ticket.cancel.cancelled() => return self.superseded(&ticket),
            lookup = self.reconciler.find_by_code(&code) => lookup,
        };

        let candidates = match lookup {
            Ok(candidates) => candidates,
            Err(e) => {
                return self.settle(
                    &ticket,
                    PipelineState::SearchError {
                        receipt,
                        code,
                        message: e.to_string(),
                    },
                );
            }
        };

        if candidates.is_empty() {
            return self.settle(
                &ticket,
                PipelineState::NotFound {
                    receipt,
                    reason: NotFoundReason::NoCandidates { code },
                },
            );
        }

        let amount_check = tokio::select! {
            _ = ticket.cancel.cancelled() => return self.superseded(&ticket),
            check = self.cross_checker.check_candidates(&code, receipt.amount, &candidates) => check,
        };

        self.settle(
            &ticket,
            PipelineState::Found {
                receipt,
                outcome: ReconciliationOutcome::found(code, candidates),
                amount_check,
            },
        )
    }

    fn settle(&self, ticket: &RunTicket, state: PipelineState) -> RunOutcome {
        if self.advance(ticket, state.clone()) {
            info!("Run {}: settled in {}", ticket.generation, state.name());
            RunOutcome::Settled(state)
        } else {
            self.superseded(ticket)
        }
    }

    fn superseded(&self, ticket: &RunTicket) -> RunOutcome {
        debug!("Run {}: superseded, discarding its results", ticket.generation);
        RunOutcome::Superseded {
            run: ticket.generation,
        }
    }

    /// Apply `state` if `ticket` still owns the slot.
    fn advance(&self, ticket: &RunTicket, state: PipelineState) -> bool {
        let mut slot = self.lock();
        if slot.generation != ticket.generation || ticket.cancel.is_cancelled() {
            debug!(
                "Discarding stale {} from run {} (current run {})",
                state.name(),
                ticket.generation,
                slot.generation
            );
            return false;
        }
        self.record(&mut slot, state);
        true
    }

    fn start_run(slot: &mut RunSlot) -> RunTicket {
        slot.cancel.cancel();
        slot.generation += 1;
        slot.cancel = CancellationToken::new();
        RunTicket {
            generation: slot.generation,
            cancel: slot.cancel.clone(),
        }
    }

    fn record(&self, slot: &mut RunSlot, state: PipelineState) {
        let change = StateChange {
            run: slot.generation,
            state: state.clone(),
            at: Utc::now(),
        };
        debug!("Run {}: -> {}", slot.generation, state.name());
        slot.state = state;
        slot.history.push(change.clone());
        // No subscribers is fine
        let _ = self.events.send(change);
    }

    fn lock(&self) -> MutexGuard<'_, RunSlot> {
        self.slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
