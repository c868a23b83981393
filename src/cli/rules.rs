use comfy_table::{Cell, Table};

use crate::categorizer::{self, MatchType};
use crate::cli::open_db;
use crate::error::Result;
use crate::settings::load_settings;

pub fn add(pattern: &str, category: &str, match_type: MatchType, priority: i64) -> Result<()> {
    let settings = load_settings();
    let conn = open_db(&settings)?;
    categorizer::add_rule(&conn, &settings.user_id, pattern, match_type, category, priority)?;
    println!("Added rule: '{pattern}' \u{2192} {category}");
    Ok(())
}

pub fn list() -> Result<()> {
    let settings = load_settings();
    let conn = open_db(&settings)?;
    let rules = categorizer::list_rules(&conn, &settings.user_id)?;

    let mut table = Table::new();
    table.set_header(vec!["ID", "Pattern", "Type", "Category", "Priority", "Hits"]);
    for rule in rules {
        table.add_row(vec![
            Cell::new(rule.id),
            Cell::new(rule.pattern),
            Cell::new(rule.match_type),
            Cell::new(rule.category),
            Cell::new(rule.priority),
            Cell::new(rule.hit_count),
        ]);
    }
    println!("Rules\n{table}");
    Ok(())
}

pub fn delete(id: i64) -> Result<()> {
    let settings = load_settings();
    let conn = open_db(&settings)?;
    let rule = categorizer::delete_rule(&conn, &settings.user_id, id)?;
    println!("Deleted rule {id}: '{}' \u{2192} {}", rule.pattern, rule.category);
    Ok(())
}
