use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::dedupe::dedupe_hash;
use crate::error::{BurnrateError, Result};
use crate::models::{CashSnapshot, Direction, NewTransaction, Transaction, Upload, UploadStatus};

pub const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS uploads (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    original_filename TEXT NOT NULL,
    storage_path TEXT NOT NULL,
    status TEXT NOT NULL DEFAULT 'PROCESSING',
    error TEXT,
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS transactions (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    date TEXT NOT NULL,
    description TEXT NOT NULL,
    amount_paise INTEGER NOT NULL CHECK (amount_paise >= 0),
    direction TEXT NOT NULL CHECK (direction IN ('INFLOW', 'OUTFLOW')),
    category TEXT NOT NULL DEFAULT 'Uncategorized',
    dedupe_hash TEXT NOT NULL,
    raw_row_json TEXT,
    upload_id INTEGER,
    created_at TEXT DEFAULT (datetime('now')),
    UNIQUE (user_id, dedupe_hash),
    FOREIGN KEY (upload_id) REFERENCES uploads(id) ON DELETE SET NULL
);

CREATE INDEX IF NOT EXISTS idx_transactions_user_date ON transactions(user_id, date);

CREATE TABLE IF NOT EXISTS cash_snapshots (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    as_of_date TEXT NOT NULL,
    cash_on_hand_paise INTEGER NOT NULL,
    source TEXT NOT NULL DEFAULT 'MANUAL',
    created_at TEXT DEFAULT (datetime('now'))
);

CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY,
    user_id TEXT NOT NULL,
    pattern TEXT NOT NULL,
    match_type TEXT NOT NULL DEFAULT 'contains',
    category TEXT NOT NULL,
    priority INTEGER DEFAULT 0,
    hit_count INTEGER DEFAULT 0,
    is_active INTEGER DEFAULT 1,
    created_at TEXT DEFAULT (datetime('now'))
);
";

pub fn get_connection(db_path: &Path) -> Result<Connection> {
    let conn = Connection::open(db_path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_db(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA)?;
    Ok(())
}

/// Shared-connection access for the async callers. Never hold the guard across an await.
pub fn lock(db: &Mutex<Connection>) -> Result<MutexGuard<'_, Connection>> {
    db.lock()
        .map_err(|_| BurnrateError::Other("database connection lock poisoned".to_string()))
}

fn is_unique_violation(e: &rusqlite::Error) -> bool {
    matches!(
        e,
        rusqlite::Error::SqliteFailure(err, _)
            if err.code == rusqlite::ErrorCode::ConstraintViolation
                && err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn validate_fields(description: &str, amount_paise: i64) -> Result<()> {
    if description.trim().is_empty() {
        return Err(BurnrateError::InvalidInput("Description is required".to_string()));
    }
    if amount_paise < 0 {
        return Err(BurnrateError::InvalidInput("Amount must not be negative".to_string()));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Transactions
// ---------------------------------------------------------------------------

const TX_COLUMNS: &str = "id, user_id, date, description, amount_paise, direction, category, \
                          dedupe_hash, raw_row_json, upload_id";

fn row_to_transaction(row: &Row) -> rusqlite::Result<Transaction> {
    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: row.get(2)?,
        description: row.get(3)?,
        amount_paise: row.get(4)?,
        direction: row.get(5)?,
        category: row.get(6)?,
        dedupe_hash: row.get(7)?,
        raw_row_json: row.get(8)?,
        upload_id: row.get(9)?,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    /// A row with the same dedupe hash already exists for this user.
    Duplicate,
}

pub fn insert_transaction(
    conn: &Connection,
    user_id: &str,
    tx: &NewTransaction,
) -> Result<InsertOutcome> {
    validate_fields(&tx.description, tx.amount_paise)?;
    let result = conn.execute(
        "INSERT INTO transactions \
         (user_id, date, description, amount_paise, direction, category, dedupe_hash, raw_row_json, upload_id) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            user_id,
            tx.date,
            tx.description,
            tx.amount_paise,
            tx.direction,
            tx.category,
            tx.dedupe_hash,
            tx.raw_row_json,
            tx.upload_id,
        ],
    );
    match result {
        Ok(_) => Ok(InsertOutcome::Inserted(conn.last_insert_rowid())),
        Err(e) if is_unique_violation(&e) => Ok(InsertOutcome::Duplicate),
        Err(e) => Err(e.into()),
    }
}

/// Most recent first.
pub fn list_transactions(conn: &Connection, user_id: &str, limit: usize) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TX_COLUMNS} FROM transactions WHERE user_id = ?1 \
         ORDER BY date DESC, id DESC LIMIT ?2"
    ))?;
    let rows = stmt
        .query_map(params![user_id, limit as i64], row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

pub fn get_transaction(conn: &Connection, user_id: &str, id: i64) -> Result<Transaction> {
    conn.query_row(
        &format!("SELECT {TX_COLUMNS} FROM transactions WHERE id = ?1 AND user_id = ?2"),
        params![id, user_id],
        row_to_transaction,
    )
    .optional()?
    .ok_or_else(|| BurnrateError::NotFound("Transaction not found".to_string()))
}

/// Partial edit. Unset fields keep their stored value.
#[derive(Debug, Clone, Default)]
pub struct TransactionUpdate {
    pub date: Option<NaiveDate>,
    pub description: Option<String>,
    pub amount_paise: Option<i64>,
    pub direction: Option<Direction>,
    pub category: Option<String>,
}

/// Applies the edit and recomputes the dedupe hash. An edit that would make
/// the row identical to another of the user's rows is rejected.
pub fn update_transaction(
    conn: &Connection,
    user_id: &str,
    id: i64,
    update: &TransactionUpdate,
) -> Result<Transaction> {
    let mut tx = get_transaction(conn, user_id, id)?;
    if let Some(date) = update.date {
        tx.date = date;
    }
    if let Some(description) = &update.description {
        tx.description = description.trim().to_string();
    }
    if let Some(amount) = update.amount_paise {
        tx.amount_paise = amount;
    }
    if let Some(direction) = update.direction {
        tx.direction = direction;
    }
    if let Some(category) = &update.category {
        tx.category = category.trim().to_string();
    }
    validate_fields(&tx.description, tx.amount_paise)?;
    tx.dedupe_hash = dedupe_hash(tx.date, &tx.description, tx.amount_paise, tx.direction);

    let result = conn.execute(
        "UPDATE transactions SET date = ?1, description = ?2, amount_paise = ?3, direction = ?4, \
         category = ?5, dedupe_hash = ?6 WHERE id = ?7 AND user_id = ?8",
        params![
            tx.date,
            tx.description,
            tx.amount_paise,
            tx.direction,
            tx.category,
            tx.dedupe_hash,
            id,
            user_id,
        ],
    );
    match result {
        Ok(_) => Ok(tx),
        Err(e) if is_unique_violation(&e) => Err(BurnrateError::Duplicate(
            "A transaction with these details already exists".to_string(),
        )),
        Err(e) => Err(e.into()),
    }
}

pub fn delete_transaction(conn: &Connection, user_id: &str, id: i64) -> Result<()> {
    let n = conn.execute(
        "DELETE FROM transactions WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    if n == 0 {
        return Err(BurnrateError::NotFound("Transaction not found".to_string()));
    }
    Ok(())
}

pub fn clear_transactions(conn: &Connection, user_id: &str) -> Result<usize> {
    Ok(conn.execute("DELETE FROM transactions WHERE user_id = ?1", [user_id])?)
}

pub fn transaction_count(conn: &Connection, user_id: &str) -> Result<i64> {
    Ok(conn.query_row(
        "SELECT count(*) FROM transactions WHERE user_id = ?1",
        [user_id],
        |r| r.get(0),
    )?)
}

pub fn latest_transaction_date(conn: &Connection, user_id: &str) -> Result<Option<NaiveDate>> {
    Ok(conn.query_row(
        "SELECT max(date) FROM transactions WHERE user_id = ?1",
        [user_id],
        |r| r.get(0),
    )?)
}

/// Inclusive on both ends, oldest first.
pub fn transactions_between(
    conn: &Connection,
    user_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {TX_COLUMNS} FROM transactions \
         WHERE user_id = ?1 AND date >= ?2 AND date <= ?3 ORDER BY date, id"
    ))?;
    let rows = stmt
        .query_map(params![user_id, from, to], row_to_transaction)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Uploads
// ---------------------------------------------------------------------------

fn row_to_upload(row: &Row) -> rusqlite::Result<Upload> {
    Ok(Upload {
        id: row.get(0)?,
        user_id: row.get(1)?,
        original_filename: row.get(2)?,
        storage_path: row.get(3)?,
        status: row.get(4)?,
        error: row.get(5)?,
        created_at: row.get(6)?,
    })
}

pub fn create_upload(
    conn: &Connection,
    user_id: &str,
    original_filename: &str,
    storage_path: &str,
) -> Result<i64> {
    conn.execute(
        "INSERT INTO uploads (user_id, original_filename, storage_path, status) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, original_filename, storage_path, UploadStatus::Processing],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Returns false when the upload had already left PROCESSING.
pub fn finish_upload(conn: &Connection, id: i64) -> Result<bool> {
    let n = conn.execute(
        "UPDATE uploads SET status = ?1, error = NULL WHERE id = ?2 AND status = ?3",
        params![UploadStatus::Imported, id, UploadStatus::Processing],
    )?;
    Ok(n == 1)
}

pub fn fail_upload(conn: &Connection, id: i64, message: &str) -> Result<bool> {
    let n = conn.execute(
        "UPDATE uploads SET status = ?1, error = ?2 WHERE id = ?3 AND status = ?4",
        params![UploadStatus::Failed, message, id, UploadStatus::Processing],
    )?;
    Ok(n == 1)
}

pub fn get_upload(conn: &Connection, user_id: &str, id: i64) -> Result<Upload> {
    conn.query_row(
        "SELECT id, user_id, original_filename, storage_path, status, error, created_at \
         FROM uploads WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
        row_to_upload,
    )
    .optional()?
    .ok_or_else(|| BurnrateError::NotFound("Upload not found".to_string()))
}

pub fn list_uploads(conn: &Connection, user_id: &str, limit: usize) -> Result<Vec<Upload>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, original_filename, storage_path, status, error, created_at \
         FROM uploads WHERE user_id = ?1 ORDER BY id DESC LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![user_id, limit as i64], row_to_upload)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ---------------------------------------------------------------------------
// Cash snapshots
// ---------------------------------------------------------------------------

fn row_to_snapshot(row: &Row) -> rusqlite::Result<CashSnapshot> {
    Ok(CashSnapshot {
        id: row.get(0)?,
        as_of_date: row.get(1)?,
        cash_on_hand_paise: row.get(2)?,
        source: row.get(3)?,
    })
}

pub fn add_cash_snapshot(
    conn: &Connection,
    user_id: &str,
    as_of_date: NaiveDate,
    cash_on_hand_paise: i64,
    source: &str,
) -> Result<CashSnapshot> {
    if cash_on_hand_paise < 0 {
        return Err(BurnrateError::InvalidInput("Invalid amount".to_string()));
    }
    conn.execute(
        "INSERT INTO cash_snapshots (user_id, as_of_date, cash_on_hand_paise, source) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, as_of_date, cash_on_hand_paise, source],
    )?;
    Ok(CashSnapshot {
        id: conn.last_insert_rowid(),
        as_of_date,
        cash_on_hand_paise,
        source: source.to_string(),
    })
}

/// Latest by as-of date; ties go to the most recently recorded.
pub fn latest_cash_snapshot(conn: &Connection, user_id: &str) -> Result<Option<CashSnapshot>> {
    Ok(conn
        .query_row(
            "SELECT id, as_of_date, cash_on_hand_paise, source FROM cash_snapshots \
             WHERE user_id = ?1 ORDER BY as_of_date DESC, id DESC LIMIT 1",
            [user_id],
            row_to_snapshot,
        )
        .optional()?)
}

/// Oldest first.
pub fn cash_snapshots_between(
    conn: &Connection,
    user_id: &str,
    from: NaiveDate,
    to: NaiveDate,
) -> Result<Vec<CashSnapshot>> {
    let mut stmt = conn.prepare(
        "SELECT id, as_of_date, cash_on_hand_paise, source FROM cash_snapshots \
         WHERE user_id = ?1 AND as_of_date >= ?2 AND as_of_date <= ?3 ORDER BY as_of_date, id",
    )?;
    let rows = stmt
        .query_map(params![user_id, from, to], row_to_snapshot)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::models::DEFAULT_CATEGORY;

    pub(crate) fn test_db() -> (tempfile::TempDir, Connection) {
        let dir = tempfile::tempdir().unwrap();
        let conn = get_connection(&dir.path().join("test.db")).unwrap();
        init_db(&conn).unwrap();
        (dir, conn)
    }

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    pub(crate) fn new_tx(date: NaiveDate, description: &str, paise: i64, direction: Direction) -> NewTransaction {
        NewTransaction {
            date,
            description: description.to_string(),
            amount_paise: paise,
            direction,
            category: DEFAULT_CATEGORY.to_string(),
            dedupe_hash: dedupe_hash(date, description, paise, direction),
            raw_row_json: None,
            upload_id: None,
        }
    }

    #[test]
    fn test_init_db_creates_tables() {
        let (_dir, conn) = test_db();
        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%'")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        for expected in &["transactions", "uploads", "cash_snapshots", "rules"] {
            assert!(tables.contains(&expected.to_string()), "missing table: {expected}");
        }
    }

    #[test]
    fn test_init_db_is_idempotent() {
        let (_dir, conn) = test_db();
        init_db(&conn).unwrap();
    }

    #[test]
    fn test_insert_and_get_roundtrip() {
        let (_dir, conn) = test_db();
        let mut tx = new_tx(ymd(2024, 12, 15), "UPI-SWIGGY-123456", 45000, Direction::Outflow);
        tx.raw_row_json = Some(serde_json::json!({"date": "15-12-2024"}));
        let InsertOutcome::Inserted(id) = insert_transaction(&conn, "u1", &tx).unwrap() else {
            panic!("expected insert");
        };
        let stored = get_transaction(&conn, "u1", id).unwrap();
        assert_eq!(stored.date, ymd(2024, 12, 15));
        assert_eq!(stored.direction, Direction::Outflow);
        assert_eq!(stored.category, "Uncategorized");
        assert_eq!(stored.raw_row_json.unwrap()["date"], "15-12-2024");
    }

    #[test]
    fn test_duplicate_hash_is_reported_not_raised() {
        let (_dir, conn) = test_db();
        let tx = new_tx(ymd(2024, 12, 15), "RENT", 100, Direction::Outflow);
        assert!(matches!(insert_transaction(&conn, "u1", &tx).unwrap(), InsertOutcome::Inserted(_)));
        assert_eq!(insert_transaction(&conn, "u1", &tx).unwrap(), InsertOutcome::Duplicate);
        // Uniqueness is per user.
        assert!(matches!(insert_transaction(&conn, "u2", &tx).unwrap(), InsertOutcome::Inserted(_)));
    }

    #[test]
    fn test_negative_amount_rejected() {
        let (_dir, conn) = test_db();
        let tx = new_tx(ymd(2024, 12, 15), "RENT", -5, Direction::Outflow);
        assert!(matches!(insert_transaction(&conn, "u1", &tx), Err(BurnrateError::InvalidInput(_))));
    }

    #[test]
    fn test_list_is_scoped_and_newest_first() {
        let (_dir, conn) = test_db();
        insert_transaction(&conn, "u1", &new_tx(ymd(2024, 12, 1), "A", 1, Direction::Inflow)).unwrap();
        insert_transaction(&conn, "u1", &new_tx(ymd(2024, 12, 3), "B", 1, Direction::Inflow)).unwrap();
        insert_transaction(&conn, "u2", &new_tx(ymd(2024, 12, 2), "C", 1, Direction::Inflow)).unwrap();
        let txs = list_transactions(&conn, "u1", 100).unwrap();
        assert_eq!(txs.len(), 2);
        assert_eq!(txs[0].description, "B");
        assert_eq!(list_transactions(&conn, "u1", 1).unwrap().len(), 1);
    }

    #[test]
    fn test_other_users_rows_are_not_found() {
        let (_dir, conn) = test_db();
        let InsertOutcome::Inserted(id) =
            insert_transaction(&conn, "u1", &new_tx(ymd(2024, 12, 1), "A", 1, Direction::Inflow)).unwrap()
        else {
            panic!("expected insert");
        };
        assert!(matches!(get_transaction(&conn, "u2", id), Err(BurnrateError::NotFound(_))));
        assert!(matches!(delete_transaction(&conn, "u2", id), Err(BurnrateError::NotFound(_))));
        delete_transaction(&conn, "u1", id).unwrap();
    }

    #[test]
    fn test_update_recomputes_hash() {
        let (_dir, conn) = test_db();
        let InsertOutcome::Inserted(id) =
            insert_transaction(&conn, "u1", &new_tx(ymd(2024, 12, 1), "COFFEE", 100, Direction::Outflow)).unwrap()
        else {
            panic!("expected insert");
        };
        let update = TransactionUpdate {
            amount_paise: Some(250),
            category: Some("Food".to_string()),
            ..Default::default()
        };
        let tx = update_transaction(&conn, "u1", id, &update).unwrap();
        assert_eq!(tx.amount_paise, 250);
        assert_eq!(tx.category, "Food");
        assert_eq!(tx.dedupe_hash, dedupe_hash(ymd(2024, 12, 1), "COFFEE", 250, Direction::Outflow));
        assert_eq!(get_transaction(&conn, "u1", id).unwrap().dedupe_hash, tx.dedupe_hash);
    }

    #[test]
    fn test_update_into_existing_row_is_duplicate() {
        let (_dir, conn) = test_db();
        insert_transaction(&conn, "u1", &new_tx(ymd(2024, 12, 1), "COFFEE", 250, Direction::Outflow)).unwrap();
        let InsertOutcome::Inserted(id) =
            insert_transaction(&conn, "u1", &new_tx(ymd(2024, 12, 1), "COFFEE", 100, Direction::Outflow)).unwrap()
        else {
            panic!("expected insert");
        };
        let update = TransactionUpdate { amount_paise: Some(250), ..Default::default() };
        assert!(matches!(
            update_transaction(&conn, "u1", id, &update),
            Err(BurnrateError::Duplicate(_))
        ));
    }

    #[test]
    fn test_clear_and_latest_date() {
        let (_dir, conn) = test_db();
        assert_eq!(latest_transaction_date(&conn, "u1").unwrap(), None);
        insert_transaction(&conn, "u1", &new_tx(ymd(2024, 11, 1), "A", 1, Direction::Inflow)).unwrap();
        insert_transaction(&conn, "u1", &new_tx(ymd(2024, 12, 9), "B", 1, Direction::Inflow)).unwrap();
        assert_eq!(latest_transaction_date(&conn, "u1").unwrap(), Some(ymd(2024, 12, 9)));
        let between = transactions_between(&conn, "u1", ymd(2024, 12, 1), ymd(2024, 12, 31)).unwrap();
        assert_eq!(between.len(), 1);
        assert_eq!(clear_transactions(&conn, "u1").unwrap(), 2);
        assert_eq!(transaction_count(&conn, "u1").unwrap(), 0);
    }

    #[test]
    fn test_upload_terminal_states_are_final() {
        let (_dir, conn) = test_db();
        let id = create_upload(&conn, "u1", "statement.csv", "u1/1-statement.csv").unwrap();
        assert_eq!(get_upload(&conn, "u1", id).unwrap().status, UploadStatus::Processing);
        assert!(fail_upload(&conn, id, "CSV is empty").unwrap());
        assert!(!finish_upload(&conn, id).unwrap());
        let upload = get_upload(&conn, "u1", id).unwrap();
        assert_eq!(upload.status, UploadStatus::Failed);
        assert_eq!(upload.error.as_deref(), Some("CSV is empty"));

        let id2 = create_upload(&conn, "u1", "b.csv", "u1/2-b.csv").unwrap();
        assert!(finish_upload(&conn, id2).unwrap());
        assert!(!fail_upload(&conn, id2, "late").unwrap());
        assert_eq!(list_uploads(&conn, "u1", 10).unwrap()[0].id, id2);
    }

    #[test]
    fn test_latest_cash_snapshot_is_by_as_of_date() {
        let (_dir, conn) = test_db();
        assert!(latest_cash_snapshot(&conn, "u1").unwrap().is_none());
        add_cash_snapshot(&conn, "u1", ymd(2024, 12, 10), 500_000, "MANUAL").unwrap();
        add_cash_snapshot(&conn, "u1", ymd(2024, 11, 30), 900_000, "MANUAL").unwrap();
        let latest = latest_cash_snapshot(&conn, "u1").unwrap().unwrap();
        assert_eq!(latest.cash_on_hand_paise, 500_000);
        assert!(add_cash_snapshot(&conn, "u1", ymd(2024, 12, 10), -1, "MANUAL").is_err());
        assert_eq!(cash_snapshots_between(&conn, "u1", ymd(2024, 12, 1), ymd(2024, 12, 31)).unwrap().len(), 1);
    }
}
