use std::io::IsTerminal;

use chrono::NaiveDate;
use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::{colored_direction, open_db};
use crate::db::{self, InsertOutcome, TransactionUpdate};
use crate::dedupe::dedupe_hash;
use crate::error::{BurnrateError, Result};
use crate::fmt::{inr, paise_to_decimal, rupees_to_paise};
use crate::models::{Direction, NewTransaction, DEFAULT_CATEGORY};
use crate::normalize::parse_date;
use crate::settings::load_settings;

fn date_arg(raw: &str) -> Result<NaiveDate> {
    parse_date(raw).ok_or_else(|| BurnrateError::InvalidInput(format!("Invalid date: {raw}")))
}

fn amount_arg(raw: &str) -> Result<i64> {
    rupees_to_paise(raw)
        .filter(|p| *p > 0)
        .ok_or_else(|| BurnrateError::InvalidInput(format!("Invalid amount: {raw}")))
}

fn direction_arg(raw: &str) -> Result<Direction> {
    raw.parse().map_err(BurnrateError::InvalidInput)
}

pub fn list(limit: usize) -> Result<()> {
    let settings = load_settings();
    let conn = open_db(&settings)?;
    let txs = db::list_transactions(&conn, &settings.user_id, limit)?;

    if txs.is_empty() {
        println!("No transactions yet. Import a statement with `burnrate import <file>`.");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["ID", "Date", "Description", "Amount", "Direction", "Category"]);
    for tx in txs {
        table.add_row(vec![
            Cell::new(tx.id),
            Cell::new(tx.date),
            Cell::new(tx.description),
            Cell::new(paise_to_decimal(tx.amount_paise)).set_alignment(CellAlignment::Right),
            Cell::new(colored_direction(tx.direction)),
            Cell::new(tx.category),
        ]);
    }
    println!("Transactions\n{table}");
    Ok(())
}

pub fn add(
    date: &str,
    description: &str,
    amount: &str,
    direction: &str,
    category: Option<&str>,
) -> Result<()> {
    let settings = load_settings();
    let conn = open_db(&settings)?;

    let date = date_arg(date)?;
    let amount_paise = amount_arg(amount)?;
    let direction = direction_arg(direction)?;
    let description = description.trim().to_string();
    let tx = NewTransaction {
        dedupe_hash: dedupe_hash(date, &description, amount_paise, direction),
        date,
        description,
        amount_paise,
        direction,
        category: category
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string(),
        raw_row_json: None,
        upload_id: None,
    };

    match db::insert_transaction(&conn, &settings.user_id, &tx)? {
        InsertOutcome::Inserted(id) => {
            println!("Added transaction {id}: {} {} {}", tx.date, tx.description, inr(amount_paise));
            Ok(())
        }
        InsertOutcome::Duplicate => Err(BurnrateError::Duplicate(
            "A transaction with these details already exists".to_string(),
        )),
    }
}

pub fn edit(
    id: i64,
    date: Option<&str>,
    description: Option<&str>,
    amount: Option<&str>,
    direction: Option<&str>,
    category: Option<&str>,
) -> Result<()> {
    let settings = load_settings();
    let conn = open_db(&settings)?;

    let update = TransactionUpdate {
        date: date.map(date_arg).transpose()?,
        description: description.map(str::to_string),
        amount_paise: amount.map(amount_arg).transpose()?,
        direction: direction.map(direction_arg).transpose()?,
        category: category.map(str::to_string),
    };
    let tx = db::update_transaction(&conn, &settings.user_id, id, &update)?;
    println!(
        "Updated transaction {}: {} {} {} [{}]",
        tx.id,
        tx.date,
        tx.description,
        inr(tx.amount_paise),
        tx.category
    );
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let settings = load_settings();
    let conn = open_db(&settings)?;
    db::delete_transaction(&conn, &settings.user_id, id)?;
    println!("Deleted transaction {id}");
    Ok(())
}

pub fn clear(yes: bool) -> Result<()> {
    let settings = load_settings();
    let conn = open_db(&settings)?;

    if !yes {
        if !std::io::stdin().is_terminal() {
            return Err(BurnrateError::InvalidInput(
                "Refusing to clear transactions without --yes".to_string(),
            ));
        }
        let count = db::transaction_count(&conn, &settings.user_id)?;
        println!("Delete all {count} transactions? [y/N]");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let deleted = db::clear_transactions(&conn, &settings.user_id)?;
    println!("Deleted {deleted} transactions");
    Ok(())
}
