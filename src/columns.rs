use crate::error::{BurnrateError, Result};

const DATE_COLS: &[&str] = &[
    "date",
    "txn date",
    "transaction date",
    "value date",
    "posting date",
    "trans date",
];
const DESC_COLS: &[&str] = &[
    "description",
    "particulars",
    "narration",
    "remarks",
    "transaction details",
    "details",
];
const AMOUNT_COLS: &[&str] = &["amount", "transaction amount", "txn amount"];
const DEBIT_COLS: &[&str] = &["debit", "withdrawal", "debit amount", "dr", "withdrawals"];
const CREDIT_COLS: &[&str] = &["credit", "deposit", "credit amount", "cr", "deposits"];
const TYPE_COLS: &[&str] = &["type", "dr/cr", "transaction type", "cr/dr"];

/// Lowercase, keep only `[a-z0-9 ]`, collapse runs of whitespace.
pub fn normalize_header(h: &str) -> String {
    let kept: String = h
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c.is_whitespace())
        .collect();
    kept.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub index: usize,
    pub name: String,
}

/// Returns the first header matching the earliest candidate in `candidates`.
fn find_column(normalized: &[String], headers: &[&str], candidates: &[&str]) -> Option<Column> {
    candidates.iter().find_map(|candidate| {
        let wanted = normalize_header(candidate);
        normalized.iter().position(|h| *h == wanted).map(|index| Column {
            index,
            name: headers[index].to_string(),
        })
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DetectedColumns {
    pub date: Option<Column>,
    pub description: Option<Column>,
    pub amount: Option<Column>,
    pub debit: Option<Column>,
    pub credit: Option<Column>,
    pub kind: Option<Column>,
}

pub fn detect_columns(headers: &[&str]) -> DetectedColumns {
    let normalized: Vec<String> = headers.iter().map(|h| normalize_header(h)).collect();
    DetectedColumns {
        date: find_column(&normalized, headers, DATE_COLS),
        description: find_column(&normalized, headers, DESC_COLS),
        amount: find_column(&normalized, headers, AMOUNT_COLS),
        debit: find_column(&normalized, headers, DEBIT_COLS),
        credit: find_column(&normalized, headers, CREDIT_COLS),
        kind: find_column(&normalized, headers, TYPE_COLS),
    }
}

/// How a row's amount and direction are read. The two modes never mix: any
/// debit or credit column wins over a single amount column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AmountMode {
    DebitCredit {
        debit: Option<usize>,
        credit: Option<usize>,
    },
    SignedAmount {
        amount: usize,
        kind: Option<usize>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnLayout {
    pub date: usize,
    pub description: usize,
    pub amount: AmountMode,
}

impl DetectedColumns {
    pub fn into_layout(self) -> Result<ColumnLayout> {
        let date = self.date.ok_or_else(|| {
            BurnrateError::Schema(
                "No date column found. Expected: date, txn date, transaction date".to_string(),
            )
        })?;
        let description = self.description.ok_or_else(|| {
            BurnrateError::Schema(
                "No description column found. Expected: description, particulars, narration"
                    .to_string(),
            )
        })?;
        let amount = match (self.debit, self.credit, self.amount) {
            (None, None, None) => {
                return Err(BurnrateError::Schema(
                    "No amount column found. Expected: amount, debit, credit".to_string(),
                ))
            }
            (None, None, Some(amount)) => AmountMode::SignedAmount {
                amount: amount.index,
                kind: self.kind.map(|c| c.index),
            },
            (debit, credit, _) => AmountMode::DebitCredit {
                debit: debit.map(|c| c.index),
                credit: credit.map(|c| c.index),
            },
        };
        Ok(ColumnLayout {
            date: date.index,
            description: description.index,
            amount,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        assert_eq!(normalize_header("  Txn Date "), "txn date");
        assert_eq!(normalize_header("Withdrawal Amt. (INR)"), "withdrawal amt inr");
        assert_eq!(normalize_header("Dr/Cr"), "drcr");
        assert_eq!(normalize_header("Value\tDate"), "value date");
    }

    #[test]
    fn test_detects_debit_credit_layout() {
        let cols = detect_columns(&["Txn Date", "Narration", "Debit", "Credit", "Balance"]);
        assert_eq!(cols.date.as_ref().unwrap().name, "Txn Date");
        assert_eq!(cols.description.as_ref().unwrap().index, 1);
        assert_eq!(cols.debit.as_ref().unwrap().index, 2);
        assert_eq!(cols.credit.as_ref().unwrap().index, 3);
        assert!(cols.amount.is_none());
    }

    #[test]
    fn test_candidate_order_beats_header_order() {
        // "description" is an earlier candidate than "remarks" even though
        // "Remarks" comes first in the file.
        let cols = detect_columns(&["Date", "Remarks", "Description", "Amount"]);
        assert_eq!(cols.description.unwrap().name, "Description");
    }

    #[test]
    fn test_type_column_with_slash() {
        let cols = detect_columns(&["Date", "Details", "Amount", "Dr/Cr"]);
        assert_eq!(cols.kind.unwrap().name, "Dr/Cr");
    }

    #[test]
    fn test_layout_prefers_debit_credit_over_amount() {
        let layout = detect_columns(&["date", "description", "amount", "debit"])
            .into_layout()
            .unwrap();
        assert_eq!(
            layout.amount,
            AmountMode::DebitCredit { debit: Some(3), credit: None }
        );
    }

    #[test]
    fn test_layout_single_amount_with_type() {
        let layout = detect_columns(&["Date", "Description", "Amount", "Type"])
            .into_layout()
            .unwrap();
        assert_eq!(layout.amount, AmountMode::SignedAmount { amount: 2, kind: Some(3) });
    }

    #[test]
    fn test_missing_date_column_is_schema_error() {
        let err = detect_columns(&["when", "description", "amount"]).into_layout().unwrap_err();
        assert!(matches!(err, BurnrateError::Schema(_)));
        assert!(err.to_string().contains("No date column found"));
    }

    #[test]
    fn test_missing_description_column_is_schema_error() {
        let err = detect_columns(&["date", "memo", "amount"]).into_layout().unwrap_err();
        assert!(err.to_string().contains("No description column found"));
    }

    #[test]
    fn test_missing_amount_column_is_schema_error() {
        let err = detect_columns(&["date", "description", "balance"]).into_layout().unwrap_err();
        assert!(err.to_string().starts_with("No amount column found"));
    }
}
