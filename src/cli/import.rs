use std::path::PathBuf;
use std::sync::Mutex;

use colored::Colorize;

use crate::blob::BlobStore;
use crate::cli::open_db;
use crate::error::{BurnrateError, Result};
use crate::importer::{ImportPayload, Importer};
use crate::llm::HttpCompletionClient;
use crate::pdf::{AiExtractor, PdfStrategy};
use crate::settings::load_settings;

pub fn run(file: &str, strategy: Option<PdfStrategy>) -> Result<()> {
    let settings = load_settings();
    let file_path = PathBuf::from(file);
    let filename = file_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .ok_or_else(|| BurnrateError::InvalidInput(format!("Not a file: {file}")))?;
    let payload = ImportPayload::from_file(&filename, std::fs::read(&file_path)?)?;

    let db = Mutex::new(open_db(&settings)?);
    let blobs = BlobStore::new(settings.uploads_dir());
    let ai = HttpCompletionClient::from_settings(&settings.ai)
        .map(|client| AiExtractor::new(client, &settings.ai));
    let importer = Importer::new(
        &db,
        &blobs,
        ai.as_ref(),
        &settings.keywords,
        strategy.unwrap_or(settings.pdf_strategy),
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let summary = runtime.block_on(importer.import(&settings.user_id, &filename, payload))?;

    println!(
        "{} imported, {} skipped (duplicates), {} total from {} ({})",
        summary.imported.to_string().green(),
        summary.skipped,
        summary.total,
        filename,
        summary.format.as_str()
    );
    println!("Upload #{}", summary.upload_id);
    Ok(())
}
