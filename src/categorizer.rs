use std::fmt;
use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use rusqlite::{params, Connection};
use serde::Serialize;
use tracing::warn;

use crate::error::{BurnrateError, Result};
use crate::models::DEFAULT_CATEGORY;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    Contains,
    StartsWith,
    Regex,
}

impl MatchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Contains => "contains",
            Self::StartsWith => "starts_with",
            Self::Regex => "regex",
        }
    }
}

impl fmt::Display for MatchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchType {
    type Err = BurnrateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "contains" => Ok(Self::Contains),
            "starts_with" => Ok(Self::StartsWith),
            "regex" => Ok(Self::Regex),
            other => Err(BurnrateError::InvalidInput(format!(
                "invalid match type: {other} (expected contains, starts_with or regex)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    pub id: i64,
    pub pattern: String,
    pub match_type: MatchType,
    pub category: String,
    pub priority: i64,
    pub hit_count: i64,
}

enum Matcher {
    Contains(String),
    StartsWith(String),
    Regex(Regex),
}

impl Matcher {
    fn matches(&self, desc_upper: &str, description: &str) -> bool {
        match self {
            Self::Contains(p) => desc_upper.contains(p.as_str()),
            Self::StartsWith(p) => desc_upper.starts_with(p.as_str()),
            Self::Regex(re) => re.is_match(description),
        }
    }
}

fn build_regex(pattern: &str) -> std::result::Result<Regex, regex::Error> {
    RegexBuilder::new(pattern).case_insensitive(true).build()
}

/// Active rules for one user, compiled once and tried highest priority first.
pub struct Categorizer {
    rules: Vec<(i64, String, Matcher)>,
}

pub struct CategorizeResult {
    pub categorized: usize,
    pub still_uncategorized: usize,
}

pub fn add_rule(
    conn: &Connection,
    user_id: &str,
    pattern: &str,
    match_type: MatchType,
    category: &str,
    priority: i64,
) -> Result<i64> {
    if pattern.trim().is_empty() || category.trim().is_empty() {
        return Err(BurnrateError::InvalidInput(
            "Rule pattern and category are required".to_string(),
        ));
    }
    if match_type == MatchType::Regex {
        build_regex(pattern)
            .map_err(|e| BurnrateError::InvalidInput(format!("invalid regex: {e}")))?;
    }
    conn.execute(
        "INSERT INTO rules (user_id, pattern, match_type, category, priority, is_active) \
         VALUES (?1, ?2, ?3, ?4, ?5, 1)",
        params![user_id, pattern, match_type.as_str(), category.trim(), priority],
    )?;
    Ok(conn.last_insert_rowid())
}

pub fn list_rules(conn: &Connection, user_id: &str) -> Result<Vec<Rule>> {
    let mut stmt = conn.prepare(
        "SELECT id, pattern, match_type, category, priority, hit_count FROM rules \
         WHERE user_id = ?1 AND is_active = 1 ORDER BY priority DESC, id",
    )?;
    let raw: Vec<(i64, String, String, String, i64, i64)> = stmt
        .query_map([user_id], |row| {
            Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    raw.into_iter()
        .map(|(id, pattern, match_type, category, priority, hit_count)| {
            Ok(Rule {
                id,
                pattern,
                match_type: match_type.parse()?,
                category,
                priority,
                hit_count,
            })
        })
        .collect()
}

/// Deactivate a rule. Returns the rule as it was.
pub fn delete_rule(conn: &Connection, user_id: &str, id: i64) -> Result<Rule> {
    let rule = list_rules(conn, user_id)?
        .into_iter()
        .find(|r| r.id == id)
        .ok_or_else(|| BurnrateError::NotFound(format!("No active rule with ID {id}")))?;
    conn.execute(
        "UPDATE rules SET is_active = 0 WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;
    Ok(rule)
}

impl Categorizer {
    pub fn load(conn: &Connection, user_id: &str) -> Result<Self> {
        let mut rules = Vec::new();
        for rule in list_rules(conn, user_id)? {
            let matcher = match rule.match_type {
                MatchType::Contains => Matcher::Contains(rule.pattern.to_uppercase()),
                MatchType::StartsWith => Matcher::StartsWith(rule.pattern.to_uppercase()),
                MatchType::Regex => match build_regex(&rule.pattern) {
                    Ok(re) => Matcher::Regex(re),
                    Err(e) => {
                        warn!(rule = rule.id, error = %e, "skipping rule with invalid regex");
                        continue;
                    }
                },
            };
            rules.push((rule.id, rule.category, matcher));
        }
        Ok(Self { rules })
    }

    /// First matching rule as `(rule_id, category)`.
    pub fn matching_rule(&self, description: &str) -> Option<(i64, &str)> {
        let desc_upper = description.to_uppercase();
        self.rules
            .iter()
            .find(|(_, _, m)| m.matches(&desc_upper, description))
            .map(|(id, category, _)| (*id, category.as_str()))
    }

    /// Category for `description`, bumping the matched rule's hit count.
    pub fn categorize_and_count(&self, conn: &Connection, description: &str) -> Result<String> {
        match self.matching_rule(description) {
            Some((rule_id, category)) => {
                record_hit(conn, rule_id)?;
                Ok(category.to_string())
            }
            None => Ok(DEFAULT_CATEGORY.to_string()),
        }
    }
}

pub fn record_hit(conn: &Connection, rule_id: i64) -> Result<()> {
    conn.execute("UPDATE rules SET hit_count = hit_count + 1 WHERE id = ?1", [rule_id])?;
    Ok(())
}

/// Re-apply the user's rules to every row still in the default category.
pub fn recategorize(conn: &Connection, user_id: &str) -> Result<CategorizeResult> {
    let categorizer = Categorizer::load(conn, user_id)?;

    let mut stmt = conn.prepare(
        "SELECT id, description FROM transactions WHERE user_id = ?1 AND category = ?2",
    )?;
    let pending: Vec<(i64, String)> = stmt
        .query_map(params![user_id, DEFAULT_CATEGORY], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut categorized = 0usize;
    let mut still_uncategorized = 0usize;
    for (txn_id, description) in &pending {
        let category = categorizer.categorize_and_count(conn, description)?;
        if category == DEFAULT_CATEGORY {
            still_uncategorized += 1;
            continue;
        }
        conn.execute(
            "UPDATE transactions SET category = ?1 WHERE id = ?2 AND user_id = ?3",
            params![category, txn_id, user_id],
        )?;
        categorized += 1;
    }

    Ok(CategorizeResult {
        categorized,
        still_uncategorized,
    })
}
