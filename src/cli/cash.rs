use chrono::Local;

use crate::cli::open_db;
use crate::db::add_cash_snapshot;
use crate::error::{BurnrateError, Result};
use crate::fmt::{inr, rupees_to_paise};
use crate::settings::load_settings;

pub fn set(amount: &str) -> Result<()> {
    let settings = load_settings();
    let conn = open_db(&settings)?;
    let paise = rupees_to_paise(amount)
        .ok_or_else(|| BurnrateError::InvalidInput("Invalid amount".to_string()))?;
    let today = Local::now().date_naive();
    let snapshot = add_cash_snapshot(&conn, &settings.user_id, today, paise, "MANUAL")?;
    println!(
        "Cash on hand set to {} as of {}",
        inr(snapshot.cash_on_hand_paise),
        snapshot.as_of_date
    );
    Ok(())
}
