use std::sync::Mutex;

use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, warn};

use crate::blob::BlobStore;
use crate::categorizer::{record_hit, Categorizer};
use crate::csv_extract::extract_csv;
use crate::db::{self, InsertOutcome};
use crate::dedupe::dedupe_hash;
use crate::error::{BurnrateError, Result};
use crate::llm::{CompletionClient, CompletionError};
use crate::models::{NewTransaction, ParsedTransaction, SourceFormat, DEFAULT_CATEGORY};
use crate::pdf::{self, AiExtractor, DirectionKeywords, PdfStrategy};

/// Raw upload content, by declared kind.
#[derive(Debug, Clone)]
pub enum ImportPayload {
    Csv(Vec<u8>),
    Pdf(Vec<u8>),
    /// CSV text produced from a PDF on the client side.
    ConvertedCsv { text: String },
}

impl ImportPayload {
    /// Pick the kind from the file extension.
    pub fn from_file(filename: &str, bytes: Vec<u8>) -> Result<Self> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".pdf") {
            Ok(Self::Pdf(bytes))
        } else if lower.ends_with(".csv") {
            Ok(Self::Csv(bytes))
        } else {
            Err(BurnrateError::InvalidInput("Please upload a CSV or PDF file".to_string()))
        }
    }

    fn bytes(&self) -> &[u8] {
        match self {
            Self::Csv(b) | Self::Pdf(b) => b,
            Self::ConvertedCsv { text } => text.as_bytes(),
        }
    }

    fn format(&self) -> SourceFormat {
        match self {
            Self::Pdf(_) => SourceFormat::Pdf,
            Self::Csv(_) | Self::ConvertedCsv { .. } => SourceFormat::Csv,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportSummary {
    pub upload_id: i64,
    pub imported: usize,
    pub skipped: usize,
    pub total: usize,
    pub format: SourceFormat,
}

/// Runs one upload end to end: archive, record, parse, insert.
///
/// `ai` is either a ready extractor or the error that prevented building one
/// (usually a missing API key); that error fails the upload when a PDF needs
/// the AI strategy.
pub struct Importer<'a, C> {
    db: &'a Mutex<Connection>,
    blobs: &'a BlobStore,
    ai: std::result::Result<&'a AiExtractor<C>, &'a CompletionError>,
    keywords: &'a DirectionKeywords,
    strategy: PdfStrategy,
}

impl<'a, C: CompletionClient> Importer<'a, C> {
    pub fn new(
        db: &'a Mutex<Connection>,
        blobs: &'a BlobStore,
        ai: std::result::Result<&'a AiExtractor<C>, &'a CompletionError>,
        keywords: &'a DirectionKeywords,
        strategy: PdfStrategy,
    ) -> Self {
        Self {
            db,
            blobs,
            ai,
            keywords,
            strategy,
        }
    }

    pub async fn import(
        &self,
        user_id: &str,
        filename: &str,
        payload: ImportPayload,
    ) -> Result<ImportSummary> {
        let blob = self.blobs.put(user_id, filename, payload.bytes())?;
        let upload_id = {
            let conn = db::lock(self.db)?;
            db::create_upload(&conn, user_id, filename, &blob.storage_key)?
        };
        let format = payload.format();
        info!(
            upload_id,
            filename,
            format = format.as_str(),
            archive = %blob.path.display(),
            "import started"
        );

        let parsed = self.parse(&payload).await;
        let (imported, skipped, total) = self.settle(user_id, upload_id, parsed)?;
        Ok(ImportSummary {
            upload_id,
            imported,
            skipped,
            total,
            format,
        })
    }

    /// Store parsed rows and move the upload out of PROCESSING. Any failure
    /// marks it FAILED.
    fn settle(
        &self,
        user_id: &str,
        upload_id: i64,
        parsed: Result<Vec<ParsedTransaction>>,
    ) -> Result<(usize, usize, usize)> {
        let txs = match parsed {
            Ok(txs) if txs.is_empty() => {
                let err = BurnrateError::EmptyInput("No valid transactions found".to_string());
                return Err(self.fail(upload_id, err));
            }
            Ok(txs) => txs,
            Err(e) => return Err(self.fail(upload_id, e)),
        };

        let (imported, skipped) = match self.insert_all(user_id, upload_id, &txs) {
            Ok(counts) => counts,
            Err(e) => return Err(self.fail(upload_id, e)),
        };
        let finished = db::lock(self.db).and_then(|conn| db::finish_upload(&conn, upload_id));
        if let Err(e) = finished {
            return Err(self.fail(upload_id, e));
        }
        info!(upload_id, imported, skipped, total = txs.len(), "import finished");
        Ok((imported, skipped, txs.len()))
    }

    async fn parse(&self, payload: &ImportPayload) -> Result<Vec<ParsedTransaction>> {
        match payload {
            ImportPayload::Csv(bytes) => extract_csv(&String::from_utf8_lossy(bytes)),
            ImportPayload::ConvertedCsv { text } => extract_csv(text),
            ImportPayload::Pdf(bytes) => {
                let text = pdf::extract_pdf_text_blocking(bytes.clone()).await?;
                self.transactions_from_pdf_text(&text).await
            }
        }
    }

    /// Everything after text extraction, split out so it can be driven with
    /// plain text.
    pub async fn transactions_from_pdf_text(&self, text: &str) -> Result<Vec<ParsedTransaction>> {
        pdf::ensure_readable(text)?;
        match self.strategy {
            PdfStrategy::Local => Ok(pdf::extract_local(text, self.keywords)),
            PdfStrategy::Ai => {
                let ai = self.ai.map_err(|e| BurnrateError::Completion(e.clone()))?;
                let extraction = ai.extract(text).await?;
                let skipped = extraction
                    .chunks
                    .iter()
                    .filter(|c| matches!(c.outcome, pdf::ChunkOutcome::Skipped(_)))
                    .count();
                if skipped > 0 {
                    warn!(skipped, chunks = extraction.chunks.len(), "some statement chunks were skipped");
                }
                Ok(extraction.transactions)
            }
        }
    }

    fn insert_all(
        &self,
        user_id: &str,
        upload_id: i64,
        txs: &[ParsedTransaction],
    ) -> Result<(usize, usize)> {
        let conn = db::lock(self.db)?;
        let categorizer = Categorizer::load(&conn, user_id)?;

        let mut imported = 0usize;
        let mut skipped = 0usize;
        for t in txs {
            let rule = categorizer.matching_rule(&t.description);
            let row = NewTransaction {
                date: t.date,
                description: t.description.clone(),
                amount_paise: t.amount_paise,
                direction: t.direction,
                category: rule.map_or(DEFAULT_CATEGORY, |(_, c)| c).to_string(),
                dedupe_hash: dedupe_hash(t.date, &t.description, t.amount_paise, t.direction),
                raw_row_json: Some(t.raw_row.clone()),
                upload_id: Some(upload_id),
            };
            match db::insert_transaction(&conn, user_id, &row)? {
                InsertOutcome::Inserted(_) => {
                    imported += 1;
                    if let Some((rule_id, _)) = rule {
                        record_hit(&conn, rule_id)?;
                    }
                }
                InsertOutcome::Duplicate => skipped += 1,
            }
        }
        Ok((imported, skipped))
    }

    /// Mark the upload FAILED with the error's message and hand the error back.
    fn fail(&self, upload_id: i64, err: BurnrateError) -> BurnrateError {
        warn!(upload_id, error = %err, "import failed");
        let marked = db::lock(self.db).and_then(|conn| db::fail_upload(&conn, upload_id, &err.to_string()));
        if let Err(e) = marked {
            warn!(upload_id, error = %e, "could not mark upload as failed");
        }
        err
    }
}
