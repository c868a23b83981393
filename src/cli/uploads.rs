use colored::Colorize;
use comfy_table::{Cell, Table};

use crate::cli::open_db;
use crate::db::list_uploads;
use crate::error::Result;
use crate::models::UploadStatus;
use crate::settings::load_settings;

pub fn run(limit: usize) -> Result<()> {
    let settings = load_settings();
    let conn = open_db(&settings)?;
    let uploads = list_uploads(&conn, &settings.user_id, limit)?;

    if uploads.is_empty() {
        println!("No uploads yet.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "File", "Status", "Error", "Created"]);
    for upload in uploads {
        let status = match upload.status {
            UploadStatus::Imported => upload.status.as_str().green(),
            UploadStatus::Failed => upload.status.as_str().red(),
            UploadStatus::Processing => upload.status.as_str().yellow(),
        };
        table.add_row(vec![
            Cell::new(upload.id),
            Cell::new(upload.original_filename),
            Cell::new(status),
            Cell::new(upload.error.unwrap_or_default()),
            Cell::new(upload.created_at),
        ]);
    }
    println!("Uploads\n{table}");
    Ok(())
}
