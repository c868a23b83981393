use std::collections::HashMap;

use chrono::{Datelike, Duration, Months, NaiveDate};
use rusqlite::Connection;
use serde::Serialize;

use crate::db;
use crate::error::Result;
use crate::models::{CashSnapshot, Direction, Transaction};

const BURN_WINDOW_DAYS: i64 = 30;
const SUMMARY_WINDOW_DAYS: i64 = 90;
const TREND_MONTHS: u32 = 6;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowSnapshot {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub inflows_paise: i64,
    pub outflows_paise: i64,
    pub burn_monthly_paise: i64,
    pub runway_months: Option<f64>,
}

/// Burn over the 30 days ending at the latest transaction, and runway against
/// the given cash position. `txs` is expected to already cover that window.
pub fn compute_burn_and_runway(
    latest_tx_date: NaiveDate,
    cash_on_hand_paise: Option<i64>,
    txs: &[(Direction, i64)],
) -> CashflowSnapshot {
    let sum = |dir: Direction| -> i64 {
        txs.iter()
            .filter(|(d, _)| *d == dir)
            .map(|(_, amount)| amount)
            .sum()
    };
    let inflows_paise = sum(Direction::Inflow);
    let outflows_paise = sum(Direction::Outflow);
    let burn_monthly_paise = (outflows_paise - inflows_paise).max(0);
    let runway_months = match cash_on_hand_paise {
        Some(cash) if burn_monthly_paise > 0 => Some(cash as f64 / burn_monthly_paise as f64),
        _ => None,
    };
    CashflowSnapshot {
        from: latest_tx_date - Duration::days(BURN_WINDOW_DAYS),
        to: latest_tx_date,
        inflows_paise,
        outflows_paise,
        burn_monthly_paise,
        runway_months,
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryTotal {
    pub category: String,
    pub total_paise: i64,
}

/// Outflow totals per category, largest first.
pub fn category_breakdown(txs: &[Transaction]) -> Vec<CategoryTotal> {
    let mut totals: HashMap<&str, i64> = HashMap::new();
    for t in txs.iter().filter(|t| t.direction == Direction::Outflow) {
        *totals.entry(t.category.as_str()).or_default() += t.amount_paise;
    }
    let mut out: Vec<CategoryTotal> = totals
        .into_iter()
        .map(|(category, total_paise)| CategoryTotal {
            category: category.to_string(),
            total_paise,
        })
        .collect();
    out.sort_by(|a, b| b.total_paise.cmp(&a.total_paise).then_with(|| a.category.cmp(&b.category)));
    out
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthTrend {
    /// `YYYY-MM`
    pub month: String,
    pub label: String,
    pub inflow_paise: i64,
    pub outflow_paise: i64,
    pub net_paise: i64,
    pub cash_balance_paise: Option<i64>,
}

fn month_start(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

fn month_key(date: NaiveDate) -> String {
    date.format("%Y-%m").to_string()
}

/// Per-month inflow/outflow for the `months` calendar months ending with the
/// anchor's month, oldest first. Each month carries the last cash snapshot
/// recorded within it, if any.
pub fn monthly_trend(
    txs: &[Transaction],
    snapshots: &[CashSnapshot],
    anchor: NaiveDate,
    months: u32,
) -> Vec<MonthTrend> {
    let anchor = month_start(anchor);
    let mut trend: Vec<MonthTrend> = (0..months)
        .rev()
        .filter_map(|back| anchor.checked_sub_months(Months::new(back)))
        .map(|start| MonthTrend {
            month: month_key(start),
            label: start.format("%b %y").to_string(),
            inflow_paise: 0,
            outflow_paise: 0,
            net_paise: 0,
            cash_balance_paise: None,
        })
        .collect();

    for t in txs {
        let key = month_key(t.date);
        if let Some(m) = trend.iter_mut().find(|m| m.month == key) {
            match t.direction {
                Direction::Inflow => m.inflow_paise += t.amount_paise,
                Direction::Outflow => m.outflow_paise += t.amount_paise,
            }
        }
    }

    for m in &mut trend {
        m.net_paise = m.inflow_paise - m.outflow_paise;
        m.cash_balance_paise = snapshots
            .iter()
            .filter(|s| month_key(s.as_of_date) == m.month)
            .max_by_key(|s| (s.as_of_date, s.id))
            .map(|s| s.cash_on_hand_paise);
    }
    trend
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Dashboard {
    pub as_of: NaiveDate,
    pub cash_on_hand: Option<CashSnapshot>,
    pub inflow_paise: i64,
    pub outflow_paise: i64,
    pub net_paise: i64,
    pub burn: Option<CashflowSnapshot>,
    pub category_breakdown: Vec<CategoryTotal>,
    pub monthly_trend: Vec<MonthTrend>,
    pub transaction_count: i64,
}

pub fn build_dashboard(conn: &Connection, user_id: &str, today: NaiveDate) -> Result<Dashboard> {
    let cash = db::latest_cash_snapshot(conn, user_id)?;

    let trend_start = month_start(today)
        .checked_sub_months(Months::new(TREND_MONTHS - 1))
        .unwrap_or(today);
    let window_start = trend_start.min(today - Duration::days(SUMMARY_WINDOW_DAYS));
    let txs = db::transactions_between(conn, user_id, window_start, today)?;

    let summary_start = today - Duration::days(SUMMARY_WINDOW_DAYS);
    let recent: Vec<Transaction> = txs.iter().filter(|t| t.date >= summary_start).cloned().collect();
    let total = |dir: Direction| -> i64 {
        recent
            .iter()
            .filter(|t| t.direction == dir)
            .map(|t| t.amount_paise)
            .sum()
    };
    let inflow_paise = total(Direction::Inflow);
    let outflow_paise = total(Direction::Outflow);

    let snapshots = db::cash_snapshots_between(conn, user_id, trend_start, today)?;
    let monthly_trend = monthly_trend(&txs, &snapshots, today, TREND_MONTHS);

    let burn = match db::latest_transaction_date(conn, user_id)? {
        Some(latest) => {
            let from = latest - Duration::days(BURN_WINDOW_DAYS);
            let window: Vec<(Direction, i64)> = db::transactions_between(conn, user_id, from, latest)?
                .into_iter()
                .map(|t| (t.direction, t.amount_paise))
                .collect();
            Some(compute_burn_and_runway(
                latest,
                cash.as_ref().map(|c| c.cash_on_hand_paise),
                &window,
            ))
        }
        None => None,
    };

    Ok(Dashboard {
        as_of: today,
        cash_on_hand: cash,
        inflow_paise,
        outflow_paise,
        net_paise: inflow_paise - outflow_paise,
        burn,
        category_breakdown: category_breakdown(&recent),
        monthly_trend,
        transaction_count: db::transaction_count(conn, user_id)?,
    })
}
