use csv::{ReaderBuilder, StringRecord, Trim};
use serde_json::{Map, Value};
use tracing::debug;

use crate::columns::{detect_columns, AmountMode, ColumnLayout};
use crate::error::{BurnrateError, Result};
use crate::models::{Direction, ParsedTransaction};
use crate::normalize::{is_negative_amount, parse_amount, parse_date};

fn record_to_json(headers: &StringRecord, record: &StringRecord) -> Value {
    let mut map = Map::new();
    for (i, header) in headers.iter().enumerate() {
        if let Some(value) = record.get(i) {
            map.insert(header.to_string(), Value::String(value.to_string()));
        }
    }
    Value::Object(map)
}

fn cell<'r>(record: &'r StringRecord, idx: Option<usize>) -> &'r str {
    idx.and_then(|i| record.get(i)).unwrap_or("")
}

/// Direction for a single-amount-column row: type column, then sign, then
/// INFLOW. The order is empirical and kept as-is.
pub fn infer_direction(type_value: &str, raw_amount: &str) -> Direction {
    let t = type_value.to_lowercase();
    if t.contains("cr") || t.contains("credit") {
        Direction::Inflow
    } else if t.contains("dr") || t.contains("debit") {
        Direction::Outflow
    } else if is_negative_amount(raw_amount) {
        Direction::Outflow
    } else {
        Direction::Inflow
    }
}

fn resolve_amount(record: &StringRecord, mode: &AmountMode) -> Option<(i64, Direction)> {
    match mode {
        AmountMode::DebitCredit { debit, credit } => {
            let debit = parse_amount(cell(record, *debit));
            let credit = parse_amount(cell(record, *credit));
            if credit > 0 {
                Some((credit, Direction::Inflow))
            } else if debit > 0 {
                Some((debit, Direction::Outflow))
            } else {
                None
            }
        }
        AmountMode::SignedAmount { amount, kind } => {
            let raw = cell(record, Some(*amount));
            let paise = parse_amount(raw);
            if paise == 0 {
                return None;
            }
            Some((paise, infer_direction(cell(record, *kind), raw)))
        }
    }
}

fn extract_row(
    headers: &StringRecord,
    record: &StringRecord,
    layout: &ColumnLayout,
) -> Option<ParsedTransaction> {
    let date = parse_date(cell(record, Some(layout.date)))?;
    let description = cell(record, Some(layout.description)).trim();
    if description.is_empty() {
        return None;
    }
    let (amount_paise, direction) = resolve_amount(record, &layout.amount)?;
    Some(ParsedTransaction {
        date,
        description: description.to_string(),
        amount_paise,
        direction,
        raw_row: record_to_json(headers, record),
    })
}

/// Parse a bank CSV export into canonical transactions.
///
/// Rows without a valid date, with an empty description, or with no non-zero
/// amount are dropped silently. An empty result is not an error here.
pub fn extract_csv(text: &str) -> Result<Vec<ParsedTransaction>> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = rdr
        .headers()
        .map_err(|_| BurnrateError::Schema("Failed to parse CSV format".to_string()))?
        .clone();

    let mut records = Vec::new();
    for result in rdr.records() {
        let record =
            result.map_err(|_| BurnrateError::Schema("Failed to parse CSV format".to_string()))?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        records.push(record);
    }
    if records.is_empty() {
        return Err(BurnrateError::EmptyInput("CSV is empty".to_string()));
    }

    let header_names: Vec<&str> = headers.iter().collect();
    let layout = detect_columns(&header_names).into_layout()?;

    let transactions: Vec<ParsedTransaction> = records
        .iter()
        .filter_map(|record| extract_row(&headers, record, &layout))
        .collect();

    debug!(
        rows = records.len(),
        transactions = transactions.len(),
        "extracted CSV transactions"
    );
    Ok(transactions)
}
