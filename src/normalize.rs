use std::sync::OnceLock;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use regex::Regex;

// ---------------------------------------------------------------------------
// Dates
// ---------------------------------------------------------------------------

fn dmy_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{1,2})[/\-](\d{1,2})[/\-](\d{2,4})$").expect("valid regex"))
}

fn ymd_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d{4})[/\-](\d{1,2})[/\-](\d{1,2})$").expect("valid regex"))
}

fn day_month_year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(\d{1,2})\s+(jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+(\d{2,4})$")
            .expect("valid regex")
    })
}

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%d-%b-%Y",
    "%d-%b-%y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%b %d %Y",
    "%B %d %Y",
    "%m/%d/%Y",
    "%d.%m.%Y",
];

const FALLBACK_DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"];

/// Two-digit years are 2000-based.
fn expand_year(raw: &str) -> Option<i32> {
    let y: i32 = raw.parse().ok()?;
    Some(if raw.len() == 2 { 2000 + y } else { y })
}

/// Parse a statement date. Tries DD/MM/YYYY, YYYY-MM-DD, "D Mon YYYY", then a
/// handful of generic layouts. Calendar-invalid DMY values (e.g. a US-style
/// `12/31/2024`) fall through to the generic layouts rather than rolling over.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    let val = raw.trim();
    if val.is_empty() {
        return None;
    }

    if let Some(c) = dmy_re().captures(val) {
        let d: u32 = c[1].parse().ok()?;
        let m: u32 = c[2].parse().ok()?;
        let y = expand_year(&c[3])?;
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }

    if let Some(c) = ymd_re().captures(val) {
        let y: i32 = c[1].parse().ok()?;
        let m: u32 = c[2].parse().ok()?;
        let d: u32 = c[3].parse().ok()?;
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }

    if let Some(c) = day_month_year_re().captures(val) {
        let d: u32 = c[1].parse().ok()?;
        let month = c[2].to_ascii_lowercase();
        let m = MONTHS.iter().position(|name| *name == month)? as u32 + 1;
        let y = expand_year(&c[3])?;
        if let Some(date) = NaiveDate::from_ymd_opt(y, m, d) {
            return Some(date);
        }
    }

    fallback_date(val)
}

fn fallback_date(val: &str) -> Option<NaiveDate> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(val) {
        return Some(dt.date_naive());
    }
    for fmt in FALLBACK_DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(val, fmt) {
            return Some(dt.date());
        }
    }
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(val, fmt).ok())
}

// ---------------------------------------------------------------------------
// Amounts
// ---------------------------------------------------------------------------

fn leading_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\d+(?:\.\d*)?|\.\d+)").expect("valid regex"))
}

/// Parse a currency-formatted amount into absolute minor units (paise).
///
/// Sign is deliberately dropped; direction comes from column semantics.
/// Empty, `-` and non-numeric input yield 0.
pub fn parse_amount(raw: &str) -> i64 {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return 0;
    }

    let compact: String = trimmed
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '₹' | '$' | ',' | '"' | '(' | ')'))
        .collect();
    let unsigned = compact.trim_start_matches(['+', '-']);
    let lower = unsigned.to_ascii_lowercase();
    let unprefixed = ["rs.", "rs", "inr"]
        .iter()
        .find_map(|p| lower.strip_prefix(p))
        .unwrap_or(&lower);

    let Some(m) = leading_number_re().find(unprefixed) else {
        return 0;
    };
    match m.as_str().parse::<f64>() {
        Ok(n) if n.is_finite() => (n.abs() * 100.0).round() as i64,
        _ => 0,
    }
}

/// Sign marker used by single-amount-column exports: a minus anywhere, or
/// accounting parentheses.
pub fn is_negative_amount(raw: &str) -> bool {
    let trimmed = raw.trim();
    trimmed.contains('-') || (trimmed.starts_with('(') && trimmed.ends_with(')'))
}
