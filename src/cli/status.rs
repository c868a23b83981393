use crate::cli::open_db;
use crate::db::{latest_cash_snapshot, transaction_count};
use crate::error::Result;
use crate::fmt::inr;
use crate::settings::load_settings;

pub fn run() -> Result<()> {
    let settings = load_settings();
    let db_path = settings.db_path();

    println!("User:       {}", settings.user_id);
    println!("Data dir:   {}", settings.data_path().display());
    println!("Database:   {}", db_path.display());
    println!("PDF mode:   {}", settings.pdf_strategy.as_str());
    println!(
        "AI key:     {}",
        if settings.ai.api_key().is_some() {
            "set"
        } else {
            "(not set)"
        }
    );

    if !db_path.exists() {
        println!();
        println!("Database not found. Run `burnrate init` to set up.");
        return Ok(());
    }

    let conn = open_db(&settings)?;
    let user = settings.user_id.as_str();
    let transactions = transaction_count(&conn, user)?;
    let uploads: i64 = conn.query_row(
        "SELECT count(*) FROM uploads WHERE user_id = ?1",
        [user],
        |r| r.get(0),
    )?;
    let uncategorized: i64 = conn.query_row(
        "SELECT count(*) FROM transactions WHERE user_id = ?1 AND category = 'Uncategorized'",
        [user],
        |r| r.get(0),
    )?;
    let rules: i64 = conn.query_row(
        "SELECT count(*) FROM rules WHERE user_id = ?1 AND is_active = 1",
        [user],
        |r| r.get(0),
    )?;
    let cash = latest_cash_snapshot(&conn, user)?;

    println!();
    println!("Transactions:  {transactions}");
    println!("Uncategorized: {uncategorized}");
    println!("Uploads:       {uploads}");
    println!("Rules:         {rules}");
    match cash {
        Some(c) => println!("Cash on hand:  {} (as of {})", inr(c.cash_on_hand_paise), c.as_of_date),
        None => println!("Cash on hand:  (not set)"),
    }
    Ok(())
}
