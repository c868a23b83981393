use chrono::Local;
use colored::Colorize;
use comfy_table::{Cell, CellAlignment, Table};

use crate::cli::open_db;
use crate::error::Result;
use crate::fmt::inr;
use crate::settings::load_settings;
use crate::snapshot::build_dashboard;

fn money(paise: i64) -> Cell {
    Cell::new(inr(paise)).set_alignment(CellAlignment::Right)
}

fn signed(paise: i64) -> String {
    if paise < 0 {
        inr(paise).red().to_string()
    } else {
        inr(paise).green().to_string()
    }
}

pub fn run() -> Result<()> {
    let settings = load_settings();
    let conn = open_db(&settings)?;
    let dash = build_dashboard(&conn, &settings.user_id, Local::now().date_naive())?;

    println!("{}", format!("Snapshot as of {}", dash.as_of).bold());
    match &dash.cash_on_hand {
        Some(c) => println!("Cash on hand:  {} (as of {})", inr(c.cash_on_hand_paise), c.as_of_date),
        None => println!("Cash on hand:  (not set, use `burnrate cash set <amount>`)"),
    }

    match &dash.burn {
        Some(burn) => {
            println!("Burn window:   {} to {}", burn.from, burn.to);
            println!("Monthly burn:  {}", inr(burn.burn_monthly_paise).red());
            match burn.runway_months {
                Some(months) => println!("Runway:        {months:.1} months"),
                None if burn.burn_monthly_paise == 0 => println!("Runway:        not burning cash"),
                None => println!("Runway:        unknown without a cash balance"),
            }
        }
        None => println!("No transactions yet."),
    }

    println!();
    println!(
        "Last 90 days:  in {}  out {}  net {}",
        inr(dash.inflow_paise).green(),
        inr(dash.outflow_paise).red(),
        signed(dash.net_paise)
    );

    if !dash.category_breakdown.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Category", "Spent"]);
        for c in &dash.category_breakdown {
            table.add_row(vec![Cell::new(&c.category), money(c.total_paise)]);
        }
        println!("\nOutflows by category\n{table}");
    }

    let mut table = Table::new();
    table.set_header(vec!["Month", "Inflow", "Outflow", "Net", "Cash"]);
    for m in &dash.monthly_trend {
        table.add_row(vec![
            Cell::new(&m.label),
            money(m.inflow_paise),
            money(m.outflow_paise),
            Cell::new(signed(m.net_paise)).set_alignment(CellAlignment::Right),
            m.cash_balance_paise.map(money).unwrap_or_else(|| Cell::new("")),
        ]);
    }
    println!("\nMonthly trend\n{table}");
    println!("\n{} transactions on record", dash.transaction_count);
    Ok(())
}
