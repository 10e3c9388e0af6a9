//! Heuristic natural-language → SQL planner.
//!
//! Produces a single-table, read-only, parameterized `SELECT` from a query
//! and a [`SchemaSnapshot`]. There are no joins and no aggregation; the
//! planner picks a table, a short projection, and up to four predicates.
//!
//! # Table selection
//!
//! Each table is scored against the lowercased query:
//!
//! - `+2` for every business term (`employee`, `name`, `salary`, ...) that
//!   appears in the query *and* inside one of the table's column names;
//! - `+1` for every query word that is a substring of some column name.
//!
//! The strictly highest score wins; ties go to the table discovered first.
//!
//! # Projection
//!
//! Columns are bucketed by name (name-like, department-like, salary-like,
//! date-like). Each bucket whose intent word appears in the query
//! contributes its first column, and an `id` / `<table>_id` column is always
//! placed first. With no bucket matched, the projection falls back to the
//! identifier plus the first name-like column, or the first three columns.
//! Columns used by predicates are appended, then the list is de-duplicated
//! and capped.
//!
//! # Predicates
//!
//! | Pattern | Clause | Parameter |
//! |---------|--------|-----------|
//! | `over/greater than/above N` | `salary_col > :salary_min` | integer |
//! | `under/less than/below N` | `salary_col < :salary_max` | integer |
//! | `department/dept [of/=] word` | `dept_col = :dept` | capitalized word |
//! | sampled department value in the query | `dept_col = :dept` | sampled value |
//! | `in Word`, no sampled values, not a skill or month | `dept_col = :dept` | `Word` |
//! | known technology token | `text_col LIKE :skill` | `%token%` |
//!
//! Values are never interpolated into the statement text.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::classify::tokenize;
use crate::models::{SchemaSnapshot, TableMeta};

/// Default row cap appended to every plan.
pub const DEFAULT_ROW_LIMIT: usize = 200;
/// Default projection width.
pub const DEFAULT_MAX_COLUMNS: usize = 6;

const BUSINESS_TERMS: &[&str] = &["employee", "employees", "name", "department", "salary", "hire"];
const FREE_TEXT_COLUMNS: &[&str] = &["skills", "skill", "notes", "bio", "description", "role"];
const MONTHS: &[&str] = &[
    "january", "february", "march", "april", "may", "june", "july", "august", "september",
    "october", "november", "december",
];

fn pattern(re: &str) -> Regex {
    Regex::new(re).expect("planner pattern is valid")
}

static WORD: LazyLock<Regex> = LazyLock::new(|| pattern(r"[a-zA-Z_]+"));
static NAME_LIKE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)name|full_?name|first|last"));
static DEPT_LIKE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)dept|department"));
static SALARY_LIKE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)salary|pay|comp"));
static DATE_LIKE: LazyLock<Regex> = LazyLock::new(|| pattern(r"(?i)hire|date"));
static OVER: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"\b(over|greater than|above)\s+([0-9][0-9,]*)"));
static UNDER: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"\b(under|less than|below)\s+([0-9][0-9,]*)"));
static DEPT_PHRASE: LazyLock<Regex> =
    LazyLock::new(|| pattern(r"\b(department|dept)\s+(of|=)?\s*([a-zA-Z]+)"));
static IN_PROPER_NOUN: LazyLock<Regex> = LazyLock::new(|| pattern(r"\bin\s+([A-Z][a-zA-Z]+)"));
static SKILL: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r"(?:^|[^a-z0-9])(python|java|sql|c\+\+|c#|golang|react|node)(?:$|[^a-z0-9+#])")
});
static LIMIT: LazyLock<Regex> = LazyLock::new(|| pattern(r"\blimit\s+([0-9]+)"));
static PLAIN_IDENT: LazyLock<Regex> = LazyLock::new(|| pattern(r"^[A-Za-z_][A-Za-z0-9_]*$"));
static NAMED_PARAM: LazyLock<Regex> = LazyLock::new(|| {
    pattern(r#""(?:[^"]|"")*"|'(?:[^']|'')*'|:([A-Za-z_][A-Za-z0-9_]*)"#)
});

/// Planner tuning, decoupled from application config.
#[derive(Debug, Clone)]
pub struct PlannerOptions {
    /// Row cap when the query does not state its own `limit N`.
    pub row_limit: usize,
    /// Maximum projection width.
    pub max_columns: usize,
}

impl Default for PlannerOptions {
    fn default() -> Self {
        Self {
            row_limit: DEFAULT_ROW_LIMIT,
            max_columns: DEFAULT_MAX_COLUMNS,
        }
    }
}

/// A bound statement parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SqlValue {
    Integer(i64),
    Real(f64),
    Text(String),
    Null,
}

impl std::fmt::Display for SqlValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SqlValue::Integer(v) => write!(f, "{}", v),
            SqlValue::Real(v) => write!(f, "{}", v),
            SqlValue::Text(v) => write!(f, "'{}'", v),
            SqlValue::Null => f.write_str("NULL"),
        }
    }
}

/// A synthesized read-only statement with named parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqlPlan {
    pub table: String,
    /// Projection, de-duplicated and capped.
    pub columns: Vec<String>,
    /// Clauses like `salary > :salary_min`, ANDed in order.
    pub predicates: Vec<String>,
    pub params: BTreeMap<String, SqlValue>,
    pub limit: usize,
}

impl SqlPlan {
    /// Render with `:name` placeholders.
    pub fn to_sql(&self) -> String {
        let select_list = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns
                .iter()
                .map(|c| quote_ident(c))
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut sql = format!("SELECT {} FROM {}", select_list, quote_ident(&self.table));
        if !self.predicates.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicates.join(" AND "));
        }
        sql.push_str(&format!(" LIMIT {}", self.limit));
        sql
    }

    pub fn has_params(&self) -> bool {
        !self.params.is_empty()
    }

    /// Render with SQLite `?NNN` placeholders and the matching values.
    ///
    /// Each distinct name gets the index of its first appearance, so a
    /// parameter used twice binds once. Quoted identifiers and string
    /// literals are copied through untouched.
    pub fn positional(&self) -> (String, Vec<SqlValue>) {
        let named = self.to_sql();
        let mut order: Vec<String> = Vec::new();
        let sql = NAMED_PARAM
            .replace_all(&named, |caps: &regex::Captures<'_>| {
                let Some(name) = caps.get(1).map(|m| m.as_str()) else {
                    return caps[0].to_string();
                };
                let idx = match order.iter().position(|n| n == name) {
                    Some(i) => i + 1,
                    None => {
                        order.push(name.to_string());
                        order.len()
                    }
                };
                format!("?{}", idx)
            })
            .into_owned();
        let values = order
            .iter()
            .map(|n| self.params.get(n).cloned().unwrap_or(SqlValue::Null))
            .collect();
        (sql, values)
    }
}

impl std::fmt::Display for SqlPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_sql())
    }
}

/// Double-quote an identifier unless it is a plain word.
pub fn quote_ident(name: &str) -> String {
    if PLAIN_IDENT.is_match(name) {
        name.to_string()
    } else {
        format!("\"{}\"", name.replace('"', "\"\""))
    }
}

/// Build a plan, or `None` when the snapshot has no tables.
pub fn plan(query: &str, snapshot: &SchemaSnapshot, opts: &PlannerOptions) -> Option<SqlPlan> {
    let table = select_table(query, snapshot)?;
    let filters = build_filters(table, query);
    let columns = select_columns(table, query, &filters.columns, opts.max_columns);

    Some(SqlPlan {
        table: table.name.clone(),
        columns,
        predicates: filters.clauses,
        params: filters.params,
        limit: row_limit(query, opts.row_limit),
    })
}

/// Pick the best-scoring table; first discovered wins ties.
pub fn select_table<'a>(query: &str, snapshot: &'a SchemaSnapshot) -> Option<&'a TableMeta> {
    let q = query.to_lowercase();
    let words: Vec<&str> = WORD.find_iter(&q).map(|m| m.as_str()).collect();

    let mut best: Option<(&TableMeta, i64)> = None;
    for table in &snapshot.tables {
        let score = score_table(table, &q, &words);
        if best.map_or(true, |(_, s)| score > s) {
            best = Some((table, score));
        }
    }
    best.map(|(t, _)| t)
}

fn score_table(table: &TableMeta, q: &str, words: &[&str]) -> i64 {
    let cols: Vec<String> = table.columns.iter().map(|c| c.name.to_lowercase()).collect();
    let mut score = 0;
    for term in BUSINESS_TERMS {
        if q.contains(term) && cols.iter().any(|c| c.contains(term)) {
            score += 2;
        }
    }
    for w in words {
        if cols.iter().any(|c| c.contains(w)) {
            score += 1;
        }
    }
    score
}

/// Choose a concise projection for `table`.
///
/// `predicate_columns` are appended after the intent picks.
pub fn select_columns(
    table: &TableMeta,
    query: &str,
    predicate_columns: &[String],
    max_columns: usize,
) -> Vec<String> {
    let cols = table.column_names();
    let q = query.to_lowercase();

    let first_matching = |re: &Regex| cols.iter().find(|c| re.is_match(c)).map(|c| c.to_string());
    let name_col = first_matching(&NAME_LIKE);
    let buckets: [(&[&str], Option<String>); 4] = [
        (&["name"], name_col.clone()),
        (&["department", "dept"], first_matching(&DEPT_LIKE)),
        (&["salary", "pay", "compensation"], first_matching(&SALARY_LIKE)),
        (&["hire", "hired", "date"], first_matching(&DATE_LIKE)),
    ];

    let mut picks: Vec<String> = buckets
        .iter()
        .filter(|(intents, _)| intents.iter().any(|k| q.contains(k)))
        .filter_map(|(_, col)| col.clone())
        .collect();

    let table_id = format!("{}_id", table.name.to_lowercase());
    let id_col = cols
        .iter()
        .find(|c| {
            let lower = c.to_lowercase();
            lower == "id" || lower == table_id
        })
        .map(|c| c.to_string());

    if picks.is_empty() {
        picks = id_col.iter().chain(name_col.iter()).cloned().collect();
        if picks.is_empty() {
            picks = cols.iter().take(3).map(|c| c.to_string()).collect();
        }
    } else if let Some(id) = &id_col {
        picks.insert(0, id.clone());
    }

    picks.extend(predicate_columns.iter().cloned());

    let mut seen = HashSet::new();
    picks.retain(|c| seen.insert(c.clone()));
    picks.truncate(max_columns);
    picks
}

/// Predicate clauses, their parameters, and the columns they touch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filters {
    pub clauses: Vec<String>,
    pub params: BTreeMap<String, SqlValue>,
    pub columns: Vec<String>,
}

impl Filters {
    fn push(&mut self, column: &str, op: &str, param: &str, value: SqlValue) {
        self.clauses
            .push(format!("{} {} :{}", quote_ident(column), op, param));
        self.params.insert(param.to_string(), value);
        self.columns.push(column.to_string());
    }
}

/// Recognize numeric range, department equality, and skill patterns.
pub fn build_filters(table: &TableMeta, query: &str) -> Filters {
    let mut filters = Filters::default();
    let cols = table.column_names();
    let q = query.to_lowercase();

    if let Some(col) = cols.iter().find(|c| SALARY_LIKE.is_match(c)) {
        if let Some(n) = capture_number(&OVER, &q) {
            filters.push(col, ">", "salary_min", SqlValue::Integer(n));
        }
        if let Some(n) = capture_number(&UNDER, &q) {
            filters.push(col, "<", "salary_max", SqlValue::Integer(n));
        }
    }

    if let Some(col) = cols.iter().find(|c| DEPT_LIKE.is_match(c)) {
        if let Some(dept) = department_value(table, col, query, &q) {
            filters.push(col, "=", "dept", SqlValue::Text(dept));
        }
    }

    let skill_col = cols
        .iter()
        .find(|c| FREE_TEXT_COLUMNS.contains(&c.to_lowercase().as_str()));
    if let (Some(col), Some(caps)) = (skill_col, SKILL.captures(&q)) {
        filters.push(col, "LIKE", "skill", SqlValue::Text(format!("%{}%", &caps[1])));
    }

    filters
}

fn capture_number(re: &Regex, q: &str) -> Option<i64> {
    let caps = re.captures(q)?;
    caps[2].replace(',', "").parse().ok()
}

/// Resolve the department the query refers to.
///
/// An explicit `department <word>` phrase wins; otherwise a value seen in
/// the sample rows. Only a column with no sampled values falls back to a
/// capitalized word after `in`, skipping skills and month names.
fn department_value(table: &TableMeta, col: &str, query: &str, q: &str) -> Option<String> {
    if let Some(caps) = DEPT_PHRASE.captures(q) {
        return Some(capitalize(&caps[3]));
    }

    let query_tokens = tokenize(query);
    let mut seen = HashSet::new();
    for row in &table.sample {
        let Some(value) = row.get(col).and_then(|v| v.as_str()) else {
            continue;
        };
        if !seen.insert(value) {
            continue;
        }
        let value_tokens = tokenize(value);
        if !value_tokens.is_empty()
            && query_tokens
                .windows(value_tokens.len())
                .any(|w| w == value_tokens.as_slice())
        {
            return Some(value.to_string());
        }
    }

    if !seen.is_empty() {
        return None;
    }
    IN_PROPER_NOUN
        .captures_iter(query)
        .map(|caps| caps[1].to_string())
        .find(|word| {
            let lower = word.to_lowercase();
            !MONTHS.contains(&lower.as_str()) && !SKILL.is_match(&lower)
        })
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// `limit N` in the query overrides the default cap.
fn row_limit(query: &str, default: usize) -> usize {
    LIMIT
        .captures(&query.to_lowercase())
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(default)
}
