//! Scan command - extract receipt fields from a single deposit slip.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Args;
use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info, warn};

use boleta_core::models::receipt::ParsedReceipt;
use boleta_core::ocr::{ReceiptImage, TextRecognizer};
use boleta_core::receipt::{ReceiptParser, RuleReceiptParser};

use crate::recognizer::LazyRecognizer;

/// Arguments for the scan command.
#[derive(Args)]
pub struct ScanArgs {
    /// Deposit slip image (or a text transcript with --text)
    #[arg(required = true)]
    input: PathBuf,

    /// Treat the input as already-recognized text
    #[arg(long)]
    text: bool,

    /// Output file (default: stdout)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "json")]
    format: OutputFormat,

    /// Model directory
    #[arg(short, long)]
    model_dir: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

pub async fn run(args: ScanArgs, config_path: Option<&str>) -> anyhow::Result<()> {
    let start = Instant::now();
    let config = super::load_config(config_path)?;

    if !args.input.exists() {
        anyhow::bail!("Input file not found: {}", args.input.display());
    }

    info!("Scanning {}", args.input.display());

    let text = if args.text {
        super::read_transcript(&args.input)?
    } else {
        let image =
            ReceiptImage::from_path(&args.input)?.ensure_within(config.ocr.max_image_bytes)?;
        let recognizer = LazyRecognizer::new(&config.ocr, args.model_dir.clone());

        let pb = spinner()?;
        pb.set_message("Running OCR...");
        let recognized = recognizer.recognize(image, &config.pipeline.language).await;
        pb.finish_and_clear();

        let text = recognized?;
        if text.is_blank() {
            warn!("No text detected in {}", args.input.display());
        }
        text.into_inner()
    };

    debug!("Recognized text:\n{}", text);

    let receipt = RuleReceiptParser::new().parse(&text);
    let output = format_receipt(&receipt, args.format)?;

    if let Some(output_path) = &args.output {
        fs::write(output_path, &output)?;
        println!(
            "{} Output written to {}",
            style("✓").green(),
            output_path.display()
        );
    } else {
        println!("{}", output);
    }

    debug!("Total processing time: {:?}", start.elapsed());

    Ok(())
}

pub(crate) fn spinner() -> anyhow::Result<ProgressBar> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(100));
    Ok(pb)
}

fn format_receipt(receipt: &ParsedReceipt, format: OutputFormat) -> anyhow::Result<String> {
    match format {
        OutputFormat::Json => Ok(serde_json::to_string_pretty(receipt)?),
        OutputFormat::Csv => format_csv(receipt),
        OutputFormat::Text => Ok(format_text(receipt)),
    }
}

fn format_csv(receipt: &ParsedReceipt) -> anyhow::Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);

    wtr.write_record(["amount", "receipt_code", "receipt_date"])?;
    wtr.write_record([
        receipt.amount.map(|a| a.to_string()).unwrap_or_default(),
        receipt.receipt_code.clone().unwrap_or_default(),
        receipt.formatted_date().unwrap_or_default(),
    ])?;

    let data = String::from_utf8(wtr.into_inner()?)?;
    Ok(data)
}

pub(crate) fn format_text(receipt: &ParsedReceipt) -> String {
    let missing = || style("(not found)").yellow().to_string();

    let mut output = String::new();
    output.push_str(&format!(
        "Amount:       {}\n",
        receipt.amount.map(|a| a.to_string()).unwrap_or_else(missing)
    ));
    output.push_str(&format!(
        "Receipt code: {}\n",
        receipt.receipt_code.clone().unwrap_or_else(missing)
    ));
    output.push_str(&format!(
        "Date:         {}\n",
        receipt.formatted_date().unwrap_or_else(missing)
    ));

    let missing_fields = receipt.missing_fields();
    if !missing_fields.is_empty() {
        let names: Vec<String> = missing_fields.iter().map(ToString::to_string).collect();
        output.push_str(&format!("\nMissing: {}\n", names.join(", ")));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_csv_leaves_missing_fields_blank() {
        let receipt = boleta_core::receipt::extract("Cod. AB12XZ");

        let csv = format_csv(&receipt).unwrap();

        assert_eq!(csv, "amount,receipt_code,receipt_date\n,AB12XZ,\n");
    }

    #[test]
    fn test_text_lists_missing_fields() {
        let receipt = boleta_core::receipt::extract("TOTAL Bs. 45.50 Cod. AB12XZ");

        let text = format_text(&receipt);

        assert!(text.contains("45.50"));
        assert!(text.contains("Missing: receipt_date"));
    }
}
