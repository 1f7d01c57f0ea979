//! Reconcile command - run the whole pipeline for one deposit slip.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use clap::Args;
use console::style;
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use boleta_core::approval::CandidateOutcome;
use boleta_core::error::{ErrorKind, StoreError};
use boleta_core::models::config::BoletaConfig;
use boleta_core::ocr::MediaType;
use boleta_core::pipeline::{PipelineController, PipelineState, RunOutcome, StateChange};
use boleta_core::reconcile::{
    AmountCheck, AmountCrossChecker, ExpectedAmountSource, InMemoryRegistrationStore,
    RegistrationStore, Verdict,
};

use crate::recognizer::LazyRecognizer;
use crate::store::HttpRegistrationStore;

/// Arguments for the reconcile command.
#[derive(Args)]
pub struct ReconcileArgs {
    /// Deposit slip image (or a text transcript with --text)
    #[arg(required = true)]
    input: PathBuf,

    /// Treat the input as already-recognized text
    #[arg(long)]
    text: bool,

    /// Use registrations from a JSON fixture file instead of the API
    #[arg(long, conflicts_with = "store_url")]
    fixtures: Option<PathBuf>,

    /// Registration API base URL (overrides config)
    #[arg(long)]
    store_url: Option<String>,

    /// Expected amount to cross-check against (overrides the store)
    #[arg(long)]
    expected_amount: Option<Decimal>,

    /// Approve the matched registrations
    #[arg(long)]
    approve: bool,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: ReportFormat,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum ReportFormat {
    /// JSON decision trail
    Json,
    /// Plain text summary
    Text,
}

/// Expected amount given on the command line.
struct FixedAmount(Decimal);

#[async_trait]
impl ExpectedAmountSource for FixedAmount {
    async fn expected_amount(&self, _code: &str) -> Result<Option<Decimal>, StoreError> {
        Ok(Some(self.0))
    }
}

#[derive(Serialize)]
struct Report<'a> {
    state: &'a PipelineState,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorKind>,
    retryable: bool,
    history: &'a [StateChange],
}

pub async fn run(args: ReconcileArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let mut config = super::load_config(config_path)?;
    if let Some(url) = &args.store_url {
        config.store.base_url = url.clone();
    }

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    let controller = match &args.fixtures {
        Some(path) => {
            info!("Using fixture registrations from {}", path.display());
            let store = Arc::new(InMemoryRegistrationStore::from_json_file(path)?);
            build_controller(store, &args, &config)
        }
        None => {
            info!("Using registration API at {}", config.store.base_url);
            let store = Arc::new(HttpRegistrationStore::new(&config.store)?);
            build_controller(store, &args, &config)
        }
    };

    let pb = super::scan::spinner()?;
    let mut events = controller.subscribe();
    let progress = {
        let pb = pb.clone();
        tokio::spawn(async move {
            while let Ok(change) = events.recv().await {
                pb.set_message(format!("{}...", change.state.name()));
            }
        })
    };

    let outcome = submit(&controller, &args).await?;
    let mut state = settled(outcome)?;

    if args.approve && matches!(state, PipelineState::Found { .. }) {
        state = settled(controller.confirm().await?)?;
    }

    pb.finish_and_clear();
    progress.abort();

    let history = controller.history();
    debug!("Run settled after {} transitions", history.len());

    match args.format {
        ReportFormat::Json => {
            let error = state.error_kind();
            let report = Report {
                state: &state,
                error,
                retryable: error.is_some_and(ErrorKind::is_retryable),
                history: &history,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        ReportFormat::Text => print!("{}", format_text(&state, &history, args.approve)),
    }

    Ok(())
}

fn build_controller<S>(store: Arc<S>, args: &ReconcileArgs, config: &BoletaConfig) -> PipelineController
where
    S: RegistrationStore + ExpectedAmountSource + 'static,
{
    let source: Arc<dyn ExpectedAmountSource> = match args.expected_amount {
        Some(amount) => Arc::new(FixedAmount(amount)),
        None => store.clone(),
    };
    let cross_checker = AmountCrossChecker::new()
        .with_source(source)
        .with_tolerance(config.extraction.amount_tolerance);
    let recognizer = Arc::new(LazyRecognizer::new(&config.ocr, args.model_dir.clone()));

    PipelineController::builder(recognizer, store)
        .with_cross_checker(cross_checker)
        .with_config(config.pipeline.clone())
        .with_max_image_bytes(config.ocr.max_image_bytes)
        .build()
}

async fn submit(controller: &PipelineController, args: &ReconcileArgs) -> anyhow::Result<RunOutcome> {
    if args.text {
        let text = super::read_transcript(&args.input)?;
        return Ok(controller.submit_transcript(text).await);
    }

    let media_type = MediaType::from_path(&args.input).ok_or_else(|| {
        anyhow::anyhow!("Unsupported file format: {}", args.input.display())
    })?;
    let bytes = std::fs::read(&args.input)?;

    Ok(controller.submit_bytes(bytes, media_type.mime()).await?)
}

fn settled(outcome: RunOutcome) -> anyhow::Result<PipelineState> {
    match outcome {
        RunOutcome::Settled(state) => Ok(state),
        RunOutcome::Superseded { run } => anyhow::bail!("Run {} was superseded", run),
    }
}

fn format_text(state: &PipelineState, history: &[StateChange], approve: bool) -> String {
    let mut output = String::new();

    output.push_str("Decision trail:\n");
    for change in history {
        output.push_str(&format!(
            "  {} {}\n",
            change.at.format("%H:%M:%S%.3f"),
            change.state.name()
        ));
    }
    output.push('\n');

    if let Some(receipt) = state.receipt() {
        output.push_str(&super::scan::format_text(receipt));
        output.push('\n');
    }

    match state {
        PipelineState::Found {
            outcome,
            amount_check,
            ..
        } => {
            output.push_str(&format!(
                "{} {} registration(s) reference receipt {}\n",
                style("✓").green(),
                outcome.candidates.len(),
                outcome.code
            ));
            for candidate in &outcome.candidates {
                let areas: Vec<String> = candidate
                    .offerings
                    .iter()
                    .map(|o| match &o.level {
                        Some(level) => format!("{} ({})", o.area, level),
                        None => o.area.clone(),
                    })
                    .collect();
                output.push_str(&format!(
                    "  [{}] {} - {} - {}{}\n",
                    candidate.id,
                    candidate.subject_name,
                    candidate.subject_identifier,
                    candidate.status,
                    if areas.is_empty() {
                        String::new()
                    } else {
                        format!(" - {}", areas.join(", "))
                    }
                ));
            }
            output.push_str(&format_amount_check(amount_check));
            if !approve {
                output.push_str("\nRe-run with --approve to approve these registrations.\n");
            }
        }
        PipelineState::Approved { result } => {
            output.push_str(&format!(
                "{} Approved {} registration(s) for receipt {}\n",
                style("✓").green(),
                result.succeeded().len(),
                result.code
            ));
            for (id, outcome) in &result.per_candidate {
                if let CandidateOutcome::Failed { reason } = outcome {
                    output.push_str(&format!("  {} [{}] {}\n", style("✗").red(), id, reason));
                }
            }
        }
        PipelineState::ApprovalError { code, message, .. } => {
            output.push_str(&format!(
                "{} Approval failed for receipt {}: {}\n",
                style("✗").red(),
                code,
                message
            ));
        }
        PipelineState::NotFound { .. } | PipelineState::SearchError { .. } | PipelineState::ExtractionError { .. } => {
            let detail = match state {
                PipelineState::SearchError { message, .. }
                | PipelineState::ExtractionError { message } => format!(": {}", message),
                _ => String::new(),
            };
            if let Some(kind) = state.error_kind() {
                let hint = if kind.is_retryable() {
                    "retry the same input"
                } else {
                    "submit a clearer image"
                };
                output.push_str(&format!(
                    "{} {}{} ({})\n",
                    style("✗").red(),
                    kind,
                    detail,
                    hint
                ));
            }
        }
        _ => {}
    }

    output
}

fn format_amount_check(check: &AmountCheck) -> String {
    let show = |amount: Option<Decimal>| amount.map(|a| a.to_string()).unwrap_or_else(|| "?".to_string());

    match check.verdict {
        Verdict::Match => format!("Amount matches the order ({})\n", show(check.expected)),
        Verdict::Mismatch => format!(
            "{} Amount mismatch: slip says {}, order expects {}\n",
            style("!").yellow(),
            show(check.parsed),
            show(check.expected)
        ),
        Verdict::Indeterminate => "Amount could not be cross-checked\n".to_string(),
    }
}
