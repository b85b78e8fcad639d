//! Statement summarization.
//!
//! Stored PDFs are turned into two artifacts under the account's
//! `processed` directory: `{stem}_parsed.md` (the extracted text, cached
//! so re-runs skip the extraction) and `{stem}_summary.json` (answers to
//! a fixed battery of questions about the statement). The summary file
//! doubles as the processed marker — if it exists the document is never
//! re-summarized.
//!
//! Each source has its own battery: pension statements get the holdings
//! questions plus per-scheme breakdowns, contract notes get trade
//! details and settlement obligations.
//!
//! The summarizer backend enforces a request quota, so consecutive
//! queries are paced by [`QUERY_PACING`] regardless of backend.

pub mod gemini;

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

use crate::google::GoogleApiError;

/// Mandatory delay between consecutive summarizer queries.
pub const QUERY_PACING: Duration = Duration::from_secs(6);

/// Which question battery to run against a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryBattery {
    /// Pension statement: investment summary plus per-scheme breakdown.
    Pension,
    /// Equity contract note: trade details and settlement obligations.
    ContractNote,
}

/// Pension investment-summary questions, keyed by output field.
pub const PENSION_SUMMARY_QUERIES: &[(&str, &str)] = &[
    (
        "value_of_holdings",
        "What is the Value of your Holdings (Investments) amount?",
    ),
    ("total_contribution", "What is the Total Contribution amount?"),
    (
        "as_on_date",
        "What is the as on date in dd-mm-yyyy for Total Contribution amount value?",
    ),
    ("total_withdrawal", "What is the Total Withdrawal amount?"),
    (
        "total_notional_gain",
        "What is the Total Notional Gain/Loss amount?",
    ),
    (
        "withdrawal_deduction",
        "What is the Withdrawal/deduction in units towards intermediary charges amount?",
    ),
    (
        "return_on_investment_xirr",
        "What is the Return on Investment XIRR percentage?",
    ),
    (
        "return_on_investment",
        "What is the Return on Investment percentage for the selected period?",
    ),
];

/// Per-scheme pension questions. Each scheme asks for value, units, NAV.
pub const SCHEME_KEYS: &[(&str, &str)] = &[
    ("scheme_E", "SCHEME E"),
    ("scheme_C", "SCHEME C"),
    ("scheme_G", "SCHEME G"),
];

const SCHEME_MANAGER: &str = "HDFC PENSION MANAGEMENT COMPANY LIMITED";

/// Contract-note questions, keyed by output field.
pub const CONTRACT_NOTE_QUERIES: &[(&str, &str)] = &[
    (
        "trade_date",
        "What is the Trade Date mentioned in the document, search for Trade Date: <date>?",
    ),
    (
        "UCC",
        "What is the UCC (Unique Client Code) mentioned in the document?",
    ),
    (
        "buy_details",
        "Provide a nested JSON containing all buy details found under any table with \
         'Equity' as header across all pages. Include 'Security / Contract Description', \
         'Quantity', 'Gross Rate/ Trade Price Per unit(\u{20b9})', 'Brokerage per \
         unit(\u{20b9})', 'Net rate per unit(\u{20b9})', and 'Net Total (Before Levies) \
         (\u{20b9})' for each buy transaction (where Buy(B) / Sell(S) is 'B').",
    ),
    (
        "sell_details",
        "Provide a nested JSON containing all sell details found under any table with \
         'Equity' as header across all pages. Include 'Security / Contract Description', \
         'Quantity', 'Gross Rate/ Trade Price Per unit(\u{20b9})', 'Brokerage per \
         unit(\u{20b9})', 'Net rate per unit(\u{20b9})', and 'Net Total (Before Levies) \
         (\u{20b9})' for each sell transaction (where Buy(B) / Sell(S) is 'S').",
    ),
    (
        "pay_obligation",
        "Provide a nested JSON containing the row labels and the 'NET TOTAL' column from \
         the table that includes the rows 'Pay in/Pay out obligation' and 'Net amount \
         receivable/(payable by client)'. Include all rows in the table.",
    ),
];

#[derive(Debug, Error)]
pub enum SummarizeError {
    #[error("summarizer request failed: {0}")]
    Api(#[from] GoogleApiError),
    #[error("summarizer returned no answer")]
    EmptyResponse,
    #[error("text extraction failed: {0}")]
    Extract(String),
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Answers free-form questions about one document's text.
#[async_trait]
pub trait DocumentSummarizer: Send + Sync {
    async fn answer(&self, document: &str, question: &str) -> Result<String, SummarizeError>;
}

/// Run one battery against one document, pacing every query.
///
/// Both batteries wrap their answers in an `investment_summary` object;
/// the pension battery adds `scheme_wise_summary` keyed by scheme.
pub async fn run_summary_queries(
    summarizer: &dyn DocumentSummarizer,
    document: &str,
    battery: SummaryBattery,
) -> Result<Value, SummarizeError> {
    match battery {
        SummaryBattery::Pension => run_pension_queries(summarizer, document).await,
        SummaryBattery::ContractNote => run_contract_note_queries(summarizer, document).await,
    }
}

async fn run_pension_queries(
    summarizer: &dyn DocumentSummarizer,
    document: &str,
) -> Result<Value, SummarizeError> {
    let mut investment = serde_json::Map::new();
    for (key, question) in PENSION_SUMMARY_QUERIES {
        log::debug!("summary query {key}");
        let answer = summarizer.answer(document, question).await?;
        investment.insert((*key).to_string(), Value::String(answer));
        tokio::time::sleep(QUERY_PACING).await;
    }

    let mut schemes = serde_json::Map::new();
    for (scheme_key, scheme_name) in SCHEME_KEYS {
        let mut scheme = serde_json::Map::new();
        for (field, what) in [
            ("value", "Value of Holdings"),
            ("total_units", "Total Units"),
            ("nav", "NAV"),
        ] {
            let question = format!("What is the {what} for {SCHEME_MANAGER} {scheme_name}?");
            log::debug!("summary query {scheme_key}.{field}");
            let answer = summarizer.answer(document, &question).await?;
            scheme.insert(field.to_string(), Value::String(answer));
            tokio::time::sleep(QUERY_PACING).await;
        }
        schemes.insert((*scheme_key).to_string(), Value::Object(scheme));
    }

    Ok(json!({
        "investment_summary": Value::Object(investment),
        "scheme_wise_summary": Value::Object(schemes),
    }))
}

async fn run_contract_note_queries(
    summarizer: &dyn DocumentSummarizer,
    document: &str,
) -> Result<Value, SummarizeError> {
    let mut investment = serde_json::Map::new();
    for (key, question) in CONTRACT_NOTE_QUERIES {
        log::debug!("summary query {key}");
        let answer = summarizer.answer(document, question).await?;
        investment.insert((*key).to_string(), Value::String(answer));
        tokio::time::sleep(QUERY_PACING).await;
    }

    Ok(json!({ "investment_summary": Value::Object(investment) }))
}

/// Summarize every stored PDF under `statements_dir`, writing artifacts to
/// `processed_dir`. Per-document failures are logged and skipped; the
/// return value counts freshly written summaries.
pub async fn summarize_statements(
    summarizer: &dyn DocumentSummarizer,
    battery: SummaryBattery,
    statements_dir: &Path,
    processed_dir: &Path,
) -> Result<usize, SummarizeError> {
    let mut pdfs = pdf_files(statements_dir)?;
    pdfs.sort();
    if pdfs.is_empty() {
        return Ok(0);
    }
    std::fs::create_dir_all(processed_dir)?;

    let mut summarized = 0;
    for pdf in pdfs {
        match summarize_one(summarizer, battery, &pdf, processed_dir).await {
            Ok(true) => summarized += 1,
            Ok(false) => {}
            Err(err) => {
                log::warn!("skipping summary for {}: {}", pdf.display(), err);
            }
        }
    }
    Ok(summarized)
}

/// `Ok(true)` when a summary was written, `Ok(false)` when one already
/// existed.
async fn summarize_one(
    summarizer: &dyn DocumentSummarizer,
    battery: SummaryBattery,
    pdf: &Path,
    processed_dir: &Path,
) -> Result<bool, SummarizeError> {
    let stem = pdf
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("statement");
    let parsed_file = processed_dir.join(format!("{stem}_parsed.md"));
    let summary_file = processed_dir.join(format!("{stem}_summary.json"));

    if summary_file.exists() {
        log::debug!("summary exists for {stem}, skipping");
        return Ok(false);
    }

    let text = if parsed_file.exists() {
        std::fs::read_to_string(&parsed_file)?
    } else {
        let text = pdf_extract::extract_text(pdf)
            .map_err(|err| SummarizeError::Extract(err.to_string()))?;
        std::fs::write(&parsed_file, &text)?;
        text
    };

    let summary = run_summary_queries(summarizer, &text, battery).await?;
    std::fs::write(&summary_file, serde_json::to_vec_pretty(&summary)?)?;
    log::info!("wrote summary {}", summary_file.display());
    Ok(true)
}

fn pdf_files(dir: &Path) -> Result<Vec<PathBuf>, std::io::Error> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err),
    };
    let mut pdfs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("pdf"));
        if is_pdf {
            pdfs.push(path);
        }
    }
    Ok(pdfs)
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    struct CannedSummarizer {
        calls: AtomicUsize,
    }

    impl CannedSummarizer {
        fn new() -> Self {
            Self {
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl DocumentSummarizer for CannedSummarizer {
        async fn answer(&self, _document: &str, question: &str) -> Result<String, SummarizeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("answer to: {question}"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_pension_summary_json_shape() {
        let summarizer = CannedSummarizer::new();
        let summary = run_summary_queries(&summarizer, "doc text", SummaryBattery::Pension)
            .await
            .unwrap();

        let investment = summary["investment_summary"].as_object().unwrap();
        assert_eq!(investment.len(), PENSION_SUMMARY_QUERIES.len());
        assert!(investment.contains_key("value_of_holdings"));
        assert!(investment.contains_key("return_on_investment_xirr"));

        let schemes = summary["scheme_wise_summary"].as_object().unwrap();
        assert_eq!(schemes.len(), 3);
        for scheme in ["scheme_E", "scheme_C", "scheme_G"] {
            let obj = schemes[scheme].as_object().unwrap();
            assert!(obj.contains_key("value"));
            assert!(obj.contains_key("total_units"));
            assert!(obj.contains_key("nav"));
        }

        // 8 investment + 3 schemes x 3 fields.
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 17);
    }

    #[tokio::test(start_paused = true)]
    async fn test_contract_note_summary_json_shape() {
        let summarizer = CannedSummarizer::new();
        let summary = run_summary_queries(&summarizer, "note text", SummaryBattery::ContractNote)
            .await
            .unwrap();

        let investment = summary["investment_summary"].as_object().unwrap();
        assert_eq!(investment.len(), CONTRACT_NOTE_QUERIES.len());
        for key in ["trade_date", "UCC", "buy_details", "sell_details", "pay_obligation"] {
            assert!(investment.contains_key(key), "missing {key}");
        }
        assert!(summary.get("scheme_wise_summary").is_none());
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queries_are_paced() {
        let summarizer = CannedSummarizer::new();
        let started = tokio::time::Instant::now();
        run_summary_queries(&summarizer, "doc", SummaryBattery::Pension)
            .await
            .unwrap();
        // Paused clock only advances through the sleeps, so elapsed time is
        // exactly the sum of the pacing delays.
        assert_eq!(started.elapsed(), QUERY_PACING * 17);

        let started = tokio::time::Instant::now();
        run_summary_queries(&summarizer, "doc", SummaryBattery::ContractNote)
            .await
            .unwrap();
        assert_eq!(started.elapsed(), QUERY_PACING * 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_existing_summary_is_not_redone() {
        let dir = tempfile::tempdir().unwrap();
        let statements = dir.path().join("transactions");
        let processed = dir.path().join("processed");
        std::fs::create_dir_all(&statements).unwrap();
        std::fs::create_dir_all(&processed).unwrap();

        std::fs::write(statements.join("jan.pdf"), b"raw bytes").unwrap();
        // Pre-cached text sidesteps real PDF extraction.
        std::fs::write(processed.join("jan_parsed.md"), "cached text").unwrap();

        let summarizer = CannedSummarizer::new();
        let first =
            summarize_statements(&summarizer, SummaryBattery::Pension, &statements, &processed)
                .await
                .unwrap();
        assert_eq!(first, 1);
        assert!(processed.join("jan_summary.json").exists());
        let calls_after_first = summarizer.calls.load(Ordering::SeqCst);

        let second =
            summarize_statements(&summarizer, SummaryBattery::Pension, &statements, &processed)
                .await
                .unwrap();
        assert_eq!(second, 0);
        assert_eq!(summarizer.calls.load(Ordering::SeqCst), calls_after_first);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_statements_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let summarizer = CannedSummarizer::new();
        let count = summarize_statements(
            &summarizer,
            SummaryBattery::ContractNote,
            &dir.path().join("nope"),
            &dir.path().join("processed"),
        )
        .await
        .unwrap();
        assert_eq!(count, 0);
    }
}
