use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info, warn};

use crate::csv_extract::extract_csv;
use crate::error::{BurnrateError, Result};
use crate::llm::CompletionClient;
use crate::models::{Direction, ParsedTransaction};
use crate::normalize::{parse_amount, parse_date};
use crate::settings::AiSettings;

const MIN_READABLE_CHARS: usize = 100;
const MAX_DESCRIPTION_CHARS: usize = 200;

/// How a PDF upload is turned into transactions. Chosen per upload; the two
/// strategies are alternatives, never a fallback chain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum PdfStrategy {
    #[default]
    Ai,
    Local,
}

impl PdfStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Local => "local",
        }
    }
}

// ---------------------------------------------------------------------------
// Text extraction
// ---------------------------------------------------------------------------

const UNREADABLE_PDF: &str = "Could not extract text from PDF. The file may be scanned/image-based. \
                              Please download CSV from your bank instead.";

/// Extract the text layer of every page, joined into one string.
pub fn extract_pdf_text(bytes: &[u8]) -> Result<String> {
    pdf_extract::extract_text_from_mem(bytes).map_err(|e| {
        warn!(error = %e, "PDF text extraction failed");
        BurnrateError::Extraction(UNREADABLE_PDF.to_string())
    })
}

/// Runs [`extract_pdf_text`] on the blocking pool. A panic inside the PDF
/// decoder is reported as an unreadable file.
pub async fn extract_pdf_text_blocking(bytes: Vec<u8>) -> Result<String> {
    tokio::task::spawn_blocking(move || extract_pdf_text(&bytes))
        .await
        .map_err(|e| {
            warn!(error = %e, "PDF text extraction aborted");
            BurnrateError::Extraction(UNREADABLE_PDF.to_string())
        })?
}

/// Image-only scans come back with little or no text.
pub fn ensure_readable(text: &str) -> Result<()> {
    if text.trim().chars().count() < MIN_READABLE_CHARS {
        return Err(BurnrateError::Extraction(
            "PDF appears to be empty or image-based. Please download CSV from your bank instead."
                .to_string(),
        ));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Direction keywords
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeywordPosition {
    #[default]
    Anywhere,
    /// The first keyword must open the description; the rest may appear anywhere.
    Prefix,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRule {
    pub all_of: Vec<String>,
    #[serde(default)]
    pub position: KeywordPosition,
    pub direction: Direction,
}

impl KeywordRule {
    fn new(all_of: &[&str], position: KeywordPosition, direction: Direction) -> Self {
        Self {
            all_of: all_of.iter().map(|k| k.to_string()).collect(),
            position,
            direction,
        }
    }

    fn matches(&self, lower: &str) -> bool {
        let mut keywords = self.all_of.iter().map(|k| k.to_lowercase());
        let Some(first) = keywords.next() else {
            return false;
        };
        let first_ok = match self.position {
            KeywordPosition::Anywhere => lower.contains(&first),
            KeywordPosition::Prefix => lower.starts_with(&first),
        };
        first_ok && keywords.all(|k| lower.contains(&k))
    }
}

/// Ordered keyword → direction table. First matching rule wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordTable {
    pub default: Direction,
    pub rules: Vec<KeywordRule>,
}

impl KeywordTable {
    pub fn classify(&self, description: &str) -> Direction {
        let lower = description.to_lowercase();
        self.rules
            .iter()
            .find(|r| r.matches(&lower))
            .map(|r| r.direction)
            .unwrap_or(self.default)
    }

    fn columnar() -> Self {
        use Direction::{Inflow, Outflow};
        use KeywordPosition::{Anywhere, Prefix};
        Self {
            default: Outflow,
            rules: vec![
                KeywordRule::new(&["neft-", "send from"], Anywhere, Inflow),
                KeywordRule::new(&["salary"], Anywhere, Inflow),
                KeywordRule::new(&["credit"], Anywhere, Inflow),
                KeywordRule::new(&["refund"], Anywhere, Inflow),
                KeywordRule::new(&["cashback"], Anywhere, Inflow),
                KeywordRule::new(&["reversal"], Anywhere, Inflow),
                KeywordRule::new(&["interest"], Anywhere, Inflow),
                KeywordRule::new(&["upi/"], Prefix, Outflow),
                KeywordRule::new(&["ach/"], Prefix, Outflow),
                KeywordRule::new(&["bil/"], Prefix, Outflow),
                KeywordRule::new(&["withdrawal"], Anywhere, Outflow),
                KeywordRule::new(&["payment"], Anywhere, Outflow),
                KeywordRule::new(&["transfer"], Anywhere, Outflow),
            ],
        }
    }

    fn simple() -> Self {
        use Direction::{Inflow, Outflow};
        use KeywordPosition::Anywhere;
        Self {
            default: Outflow,
            rules: vec![
                KeywordRule::new(&["salary"], Anywhere, Inflow),
                KeywordRule::new(&["credit"], Anywhere, Inflow),
                KeywordRule::new(&["deposit"], Anywhere, Inflow),
                KeywordRule::new(&["refund"], Anywhere, Inflow),
                KeywordRule::new(&["neft", "from"], Anywhere, Inflow),
            ],
        }
    }
}

/// Direction tables for layouts that carry no debit/credit columns, one per
/// local pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionKeywords {
    pub columnar: KeywordTable,
    pub simple: KeywordTable,
}

impl Default for DirectionKeywords {
    fn default() -> Self {
        Self {
            columnar: KeywordTable::columnar(),
            simple: KeywordTable::simple(),
        }
    }
}

// ---------------------------------------------------------------------------
// Local heuristic
// ---------------------------------------------------------------------------

/// Columnar layout: DATE [NET BANKING] MODE/PARTICULARS AMOUNT [BALANCE].
fn columnar_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})\s+(?:NET BANKING\s+)?([A-Z]{2,}[/\-][^\d]+?)\s+([\d,]+\.\d{2})\s+([\d,]+\.\d{2})?",
        )
        .expect("valid regex")
    })
}

fn simple_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(\d{1,2}[-/]\d{1,2}[-/]\d{2,4})\s+(.+?)\s+([\d,]+\.\d{2})")
            .expect("valid regex")
    })
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

fn columnar_matches(joined: &str, keywords: &DirectionKeywords) -> Vec<ParsedTransaction> {
    let mut txs = Vec::new();
    for caps in columnar_re().captures_iter(joined) {
        let Some(date) = parse_date(&caps[1]) else {
            continue;
        };
        let desc = caps[2].trim().trim_end_matches('/').trim();
        if desc.chars().count() < 3 {
            continue;
        }
        let amount_paise = parse_amount(&caps[3]);
        if amount_paise == 0 {
            continue;
        }
        txs.push(ParsedTransaction {
            date,
            description: truncate_chars(desc, MAX_DESCRIPTION_CHARS),
            amount_paise,
            direction: keywords.columnar.classify(desc),
            raw_row: json!({ "original": &caps[0] }),
        });
    }
    txs
}

fn simple_matches(joined: &str, keywords: &DirectionKeywords) -> Vec<ParsedTransaction> {
    let mut txs = Vec::new();
    for caps in simple_re().captures_iter(joined) {
        let Some(date) = parse_date(&caps[1]) else {
            continue;
        };
        let desc_raw = &caps[2];
        if desc_raw.contains("B/F") || desc_raw.contains("BALANCE") || desc_raw.contains("TOTAL") {
            continue;
        }
        let desc = truncate_chars(desc_raw.trim(), MAX_DESCRIPTION_CHARS);
        if desc.chars().count() < 3 {
            continue;
        }
        let amount_paise = parse_amount(&caps[3]);
        if amount_paise == 0 {
            continue;
        }
        txs.push(ParsedTransaction {
            date,
            direction: keywords.simple.classify(&desc),
            description: desc,
            amount_paise,
            raw_row: json!({ "original": &caps[0] }),
        });
    }
    txs
}

/// Pattern-match transactions out of statement text. Tuned to one bank's
/// columnar layout, with a looser date-text-amount pattern when that finds
/// nothing. Expect misses on unfamiliar layouts.
pub fn extract_local(text: &str, keywords: &DirectionKeywords) -> Vec<ParsedTransaction> {
    let joined = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    let txs = columnar_matches(&joined, keywords);
    if !txs.is_empty() {
        return txs;
    }
    simple_matches(&joined, keywords)
}

// ---------------------------------------------------------------------------
// AI-assisted
// ---------------------------------------------------------------------------

fn split_long_line(line: &str, max: usize) -> Vec<&str> {
    if line.chars().count() <= max {
        return vec![line];
    }
    let mut pieces = Vec::new();
    let mut start = 0;
    let mut count = 0;
    for (idx, _) in line.char_indices() {
        if count == max {
            pieces.push(&line[start..idx]);
            start = idx;
            count = 0;
        }
        count += 1;
    }
    pieces.push(&line[start..]);
    pieces
}

/// Split text into chunks of at most `max_chars` characters, breaking on line
/// boundaries. Lines longer than the limit are cut.
pub fn chunk_text(text: &str, max_chars: usize) -> Vec<String> {
    let max = max_chars.max(1);
    if text.chars().count() <= max {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0usize;
    for line in text.split('\n') {
        for piece in split_long_line(line, max) {
            let piece_len = piece.chars().count();
            let sep = usize::from(current_len > 0);
            if current_len > 0 && current_len + sep + piece_len > max {
                chunks.push(std::mem::take(&mut current));
                current_len = 0;
            }
            if current_len > 0 {
                current.push('\n');
                current_len += 1;
            }
            current.push_str(piece);
            current_len += piece_len;
        }
    }
    if current_len > 0 {
        chunks.push(current);
    }
    chunks.retain(|c| !c.trim().is_empty());
    chunks
}

/// Models like to wrap CSV in markdown fences despite being told not to.
pub fn strip_code_fences(text: &str) -> String {
    let mut s = text.trim();
    if s.get(..6).is_some_and(|p| p.eq_ignore_ascii_case("```csv")) {
        s = &s[6..];
    } else if let Some(rest) = s.strip_prefix("```") {
        s = rest;
    }
    if let Some(rest) = s.strip_suffix("```") {
        s = rest;
    }
    s.trim().to_string()
}

pub fn build_prompt(chunk: &str) -> String {
    format!(
        "You are a bank statement parser. Convert this bank statement text to CSV format.

BANK STATEMENT TEXT:
{chunk}

OUTPUT FORMAT:
Output a CSV with these exact columns: date,description,debit,credit

Rules:
- date: Transaction date (keep original format like DD-MM-YYYY or DD/MM/YYYY)
- description: Transaction narration/particulars (remove commas, replace with spaces)
- debit: Amount withdrawn/debited (leave empty if credit)
- credit: Amount deposited/credited (leave empty if debit)
- Skip any lines that are not transactions (headers, footers, summaries)

Output ONLY the CSV data. No markdown, no code blocks, no explanations.
Start with header row, then transactions found in this text.

Example:
date,description,debit,credit
15-12-2024,UPI-SWIGGY-123456,450.00,
14-12-2024,SALARY DECEMBER,,50000.00"
    )
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Parsed(usize),
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkReport {
    pub index: usize,
    pub attempts: u32,
    pub outcome: ChunkOutcome,
}

#[derive(Debug, Clone)]
pub struct AiExtraction {
    pub transactions: Vec<ParsedTransaction>,
    pub chunks: Vec<ChunkReport>,
}

/// Rewrites statement text into canonical CSV through a completion backend,
/// one chunk at a time, and feeds each answer through the CSV extractor.
pub struct AiExtractor<C> {
    client: C,
    max_chunk_chars: usize,
    max_retries: u32,
    backoff_base: Duration,
    chunk_pacing: Duration,
}

impl<C: CompletionClient> AiExtractor<C> {
    pub fn new(client: C, ai: &AiSettings) -> Self {
        Self {
            client,
            max_chunk_chars: ai.max_chunk_chars,
            max_retries: ai.max_retries,
            backoff_base: Duration::from_millis(ai.backoff_base_ms),
            chunk_pacing: Duration::from_millis(ai.chunk_pacing_ms),
        }
    }

    fn backoff(&self, retry: u32) -> Duration {
        self.backoff_base * 2u32.saturating_pow(retry.saturating_sub(1))
    }

    async fn process_chunk(
        &self,
        index: usize,
        chunk: &str,
    ) -> (Vec<ParsedTransaction>, ChunkReport) {
        let prompt = build_prompt(chunk);
        let mut attempts = 0u32;
        let mut retries = 0u32;
        loop {
            attempts += 1;
            debug!(chunk = index + 1, attempt = attempts, "requesting completion");
            let outcome = match self.client.complete(&prompt).await {
                Ok(text) => match extract_csv(&strip_code_fences(&text)) {
                    Ok(txs) => {
                        info!(chunk = index + 1, transactions = txs.len(), "chunk parsed");
                        let n = txs.len();
                        return (txs, ChunkReport { index, attempts, outcome: ChunkOutcome::Parsed(n) });
                    }
                    Err(e) => ChunkOutcome::Skipped(e.to_string()),
                },
                Err(e) if e.is_retryable() && retries < self.max_retries => {
                    retries += 1;
                    let wait = self.backoff(retries);
                    warn!(chunk = index + 1, attempt = attempts, error = %e, wait_ms = wait.as_millis() as u64, "retrying chunk");
                    tokio::time::sleep(wait).await;
                    continue;
                }
                Err(e) => ChunkOutcome::Skipped(e.to_string()),
            };
            warn!(chunk = index + 1, attempts, ?outcome, "skipping chunk");
            return (Vec::new(), ChunkReport { index, attempts, outcome });
        }
    }

    /// Per-chunk failures are skipped; only an empty overall result is an error.
    pub async fn extract(&self, text: &str) -> Result<AiExtraction> {
        let chunks = chunk_text(text, self.max_chunk_chars);
        info!(chars = text.len(), chunks = chunks.len(), "extracting statement text with language model");

        let mut transactions = Vec::new();
        let mut reports = Vec::with_capacity(chunks.len());
        for (index, chunk) in chunks.iter().enumerate() {
            let (txs, report) = self.process_chunk(index, chunk).await;
            transactions.extend(txs);
            reports.push(report);
            if index + 1 < chunks.len() && !self.chunk_pacing.is_zero() {
                tokio::time::sleep(self.chunk_pacing).await;
            }
        }

        if transactions.is_empty() {
            return Err(BurnrateError::Extraction(
                "No transactions found in PDF. The document may not be a bank statement.".to_string(),
            ));
        }
        Ok(AiExtraction {
            transactions,
            chunks: reports,
        })
    }
}
