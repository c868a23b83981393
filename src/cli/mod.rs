pub mod cash;
pub mod categorize;
pub mod import;
pub mod init;
pub mod rules;
pub mod serve;
pub mod snapshot;
pub mod status;
pub mod transactions;
pub mod uploads;

use clap::{Parser, Subcommand};
use colored::{ColoredString, Colorize};
use rusqlite::Connection;

use crate::categorizer::MatchType;
use crate::db::{get_connection, init_db};
use crate::error::{BurnrateError, Result};
use crate::models::Direction;
use crate::pdf::PdfStrategy;
use crate::settings::Settings;

/// Open the configured database, refusing to create one outside `init`.
pub(crate) fn open_db(settings: &Settings) -> Result<Connection> {
    let db_path = settings.db_path();
    if !db_path.exists() {
        return Err(BurnrateError::NotFound(
            "Database not found. Run `burnrate init` to set up.".to_string(),
        ));
    }
    let conn = get_connection(&db_path)?;
    init_db(&conn)?;
    Ok(conn)
}

pub(crate) fn colored_direction(direction: Direction) -> ColoredString {
    match direction {
        Direction::Inflow => direction.as_str().green(),
        Direction::Outflow => direction.as_str().red(),
    }
}

fn parse_match_type(s: &str) -> std::result::Result<MatchType, String> {
    s.parse().map_err(|e: BurnrateError| e.to_string())
}

#[derive(Parser)]
#[command(
    name = "burnrate",
    about = "Cash burn and runway tracking from bank statements."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Choose a data directory and initialize the database.
    Init {
        /// Path for burnrate data (default: ~/Documents/burnrate)
        #[arg(long = "data-dir")]
        data_dir: Option<String>,
    },
    /// Import a bank statement (CSV or PDF).
    Import {
        /// Path to the statement file
        file: String,
        /// PDF extraction strategy (defaults to the configured one)
        #[arg(long, value_enum)]
        strategy: Option<PdfStrategy>,
    },
    /// Browse and edit transactions.
    Transactions {
        #[command(subcommand)]
        command: TransactionsCommands,
    },
    /// Show upload history.
    Uploads {
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },
    /// Record cash on hand.
    Cash {
        #[command(subcommand)]
        command: CashCommands,
    },
    /// Show burn, runway and the monthly trend.
    Snapshot,
    /// Manage categorization rules.
    Rules {
        #[command(subcommand)]
        command: RulesCommands,
    },
    /// Re-run categorization rules on uncategorized transactions.
    Categorize,
    /// Run the HTTP API.
    Serve {
        /// Address to listen on (default from settings)
        #[arg(long)]
        bind: Option<String>,
    },
    /// Show current configuration and database stats.
    Status,
}

#[derive(Subcommand)]
pub enum TransactionsCommands {
    /// List the most recent transactions.
    List {
        #[arg(long, default_value_t = 50)]
        limit: usize,
    },
    /// Add a transaction by hand.
    Add {
        /// Date (YYYY-MM-DD or DD/MM/YYYY)
        #[arg(long)]
        date: String,
        #[arg(long)]
        description: String,
        /// Amount in rupees, e.g. 1250.50
        #[arg(long)]
        amount: String,
        #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(["INFLOW", "OUTFLOW"]))]
        direction: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Change fields of one transaction.
    Edit {
        id: i64,
        #[arg(long)]
        date: Option<String>,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long, value_parser = clap::builder::PossibleValuesParser::new(["INFLOW", "OUTFLOW"]))]
        direction: Option<String>,
        #[arg(long)]
        category: Option<String>,
    },
    /// Delete one transaction.
    Delete { id: i64 },
    /// Delete every transaction.
    Clear {
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
}

#[derive(Subcommand)]
pub enum CashCommands {
    /// Record today's cash on hand, in rupees.
    Set {
        #[arg(allow_negative_numbers = true)]
        amount: String,
    },
}

#[derive(Subcommand)]
pub enum RulesCommands {
    /// Add a categorization rule.
    Add {
        /// Pattern to match against transaction descriptions
        pattern: String,
        /// Category to assign
        #[arg(long)]
        category: String,
        /// Match type: contains, starts_with, or regex
        #[arg(long = "match-type", default_value = "contains", value_parser = parse_match_type)]
        match_type: MatchType,
        /// Rule priority (higher wins)
        #[arg(long, default_value_t = 0)]
        priority: i64,
    },
    /// List active rules.
    List,
    /// Deactivate a rule.
    Delete { id: i64 },
}
