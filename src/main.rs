mod blob;
mod categorizer;
mod cli;
mod columns;
mod csv_extract;
mod db;
mod dedupe;
mod error;
mod fmt;
mod importer;
mod llm;
mod models;
mod normalize;
mod pdf;
mod server;
mod settings;
mod snapshot;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::{CashCommands, Cli, Commands, RulesCommands, TransactionsCommands};
use error::BurnrateError;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("burnrate=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() {
    init_tracing();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { data_dir } => cli::init::run(data_dir),
        Commands::Import { file, strategy } => cli::import::run(&file, strategy),
        Commands::Transactions { command } => match command {
            TransactionsCommands::List { limit } => cli::transactions::list(limit),
            TransactionsCommands::Add {
                date,
                description,
                amount,
                direction,
                category,
            } => cli::transactions::add(&date, &description, &amount, &direction, category.as_deref()),
            TransactionsCommands::Edit {
                id,
                date,
                description,
                amount,
                direction,
                category,
            } => cli::transactions::edit(
                id,
                date.as_deref(),
                description.as_deref(),
                amount.as_deref(),
                direction.as_deref(),
                category.as_deref(),
            ),
            TransactionsCommands::Delete { id } => cli::transactions::delete(id),
            TransactionsCommands::Clear { yes } => cli::transactions::clear(yes),
        },
        Commands::Uploads { limit } => cli::uploads::run(limit),
        Commands::Cash { command } => match command {
            CashCommands::Set { amount } => cli::cash::set(&amount),
        },
        Commands::Snapshot => cli::snapshot::run(),
        Commands::Rules { command } => match command {
            RulesCommands::Add {
                pattern,
                category,
                match_type,
                priority,
            } => cli::rules::add(&pattern, &category, match_type, priority),
            RulesCommands::List => cli::rules::list(),
            RulesCommands::Delete { id } => cli::rules::delete(id),
        },
        Commands::Categorize => cli::categorize::run(),
        Commands::Serve { bind } => {
            cli::serve::run(bind).map_err(|e| BurnrateError::Other(format!("{e:#}")))
        }
        Commands::Status => cli::status::run(),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
