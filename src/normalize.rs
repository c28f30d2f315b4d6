//! Strips environment-specific absolute origins (e.g. `http://localhost:5000/`)
//! from stored content URLs so the data stays portable between deployments.

use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{Connection, ToSql};
use serde::Serialize;

use crate::db::{quote_ident, table_columns, table_exists};
use crate::error::Result;

/// Columns per table that may hold URLs, scanned in this order.
pub const DEFAULT_TARGETS: &[(&str, &[&str])] = &[
    ("hero_slides", &["image_url"]),
    ("about_page", &["image_url"]),
    ("initiatives", &["images", "image_url"]),
    ("partners", &["logo_url"]),
    ("news", &["image_url", "gallery"]),
    ("landing_pages", &["hero_image", "gallery"]),
    ("header_settings", &["logo_url"]),
    ("footer_settings", &["logo_url"]),
    ("cta_sections", &["background_image"]),
    ("donation_settings", &["qr_code_path"]),
];

/// A stored cell as the normalizer sees it.
///
/// Arrays live in TEXT columns as JSON; a cell only decodes as `StringArray`
/// when its text is a JSON array of strings. Anything else that is text,
/// including double-encoded JSON, stays `Text` and keeps its encoding.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Text(String),
    StringArray(Vec<String>),
    /// Integer, real or blob cells. Never rewritten.
    Other,
}

impl ColumnValue {
    pub fn from_sql(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => ColumnValue::Null,
            ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
                Ok(s) => Self::from_text(s),
                Err(_) => ColumnValue::Other,
            },
            _ => ColumnValue::Other,
        }
    }

    pub fn from_text(s: &str) -> Self {
        if s.trim_start().starts_with('[') {
            if let Ok(items) = serde_json::from_str::<Vec<String>>(s) {
                return ColumnValue::StringArray(items);
            }
        }
        ColumnValue::Text(s.to_string())
    }
}

impl ToSql for ColumnValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        match self {
            ColumnValue::Text(s) => Ok(ToSqlOutput::from(s.as_str())),
            ColumnValue::StringArray(items) => {
                let encoded = serde_json::to_string(items)
                    .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
                Ok(ToSqlOutput::Owned(Value::Text(encoded)))
            }
            ColumnValue::Null | ColumnValue::Other => Ok(ToSqlOutput::Owned(Value::Null)),
        }
    }
}

/// Literal prefix removal. Matching is on the exact string, so already
/// relative values are never altered and applying the rule twice is a no-op.
#[derive(Debug, Clone)]
pub struct RewriteRule {
    prefix: String,
}

impl RewriteRule {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns the rewritten string, or `None` when `s` does not contain the prefix.
    pub fn apply_str(&self, s: &str) -> Option<String> {
        if self.prefix.is_empty() || !s.contains(&self.prefix) {
            return None;
        }
        Some(s.replace(&self.prefix, ""))
    }

    /// Returns the new value when something changed; unchanged arrays yield `None`.
    pub fn apply(&self, value: &ColumnValue) -> Option<ColumnValue> {
        match value {
            ColumnValue::Text(s) => self.apply_str(s).map(ColumnValue::Text),
            ColumnValue::StringArray(items) => {
                let mut changed = false;
                let rewritten = items
                    .iter()
                    .map(|item| match self.apply_str(item) {
                        Some(new) => {
                            changed = true;
                            new
                        }
                        None => item.clone(),
                    })
                    .collect();
                changed.then_some(ColumnValue::StringArray(rewritten))
            }
            ColumnValue::Null | ColumnValue::Other => None,
        }
    }
}

/// A table and the columns of it to scan.
#[derive(Debug, Clone)]
pub struct Target {
    pub table: String,
    pub columns: Vec<String>,
}

pub fn default_targets() -> Vec<Target> {
    DEFAULT_TARGETS
        .iter()
        .map(|(table, columns)| Target {
            table: table.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        })
        .collect()
}

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct NormalizeReport {
    pub tables_scanned: usize,
    pub tables_skipped: usize,
    pub rows_updated: usize,
    pub columns_updated: usize,
}

/// Scan every target and rewrite matching cells. Each changed row gets one
/// UPDATE covering all of its changed columns. With `dry_run` nothing is written.
pub fn run(
    conn: &Connection,
    targets: &[Target],
    rule: &RewriteRule,
    dry_run: bool,
) -> Result<NormalizeReport> {
    let mut report = NormalizeReport::default();

    for target in targets {
        if !table_exists(conn, &target.table)? {
            log::warn!("Table {} does not exist, skipping", target.table);
            report.tables_skipped += 1;
            continue;
        }

        let existing = table_columns(conn, &target.table)?;
        let columns: Vec<&str> = target
            .columns
            .iter()
            .filter(|c| {
                let present = existing.iter().any(|e| e == *c);
                if !present {
                    log::warn!("Column {}.{} does not exist, skipping", target.table, c);
                }
                present
            })
            .map(|c| c.as_str())
            .collect();

        log::info!("Scanning {} ({})", target.table, columns.join(", "));
        report.tables_scanned += 1;
        if columns.is_empty() {
            continue;
        }

        let (rows_updated, columns_updated) = normalize_table(conn, &target.table, &columns, rule, dry_run)?;
        report.rows_updated += rows_updated;
        report.columns_updated += columns_updated;
    }

    log::info!(
        "Normalize finished: {} table(s) scanned, {} skipped, {} row(s) / {} column(s) {}",
        report.tables_scanned,
        report.tables_skipped,
        report.rows_updated,
        report.columns_updated,
        if dry_run { "would change" } else { "updated" }
    );
    Ok(report)
}

fn normalize_table(
    conn: &Connection,
    table: &str,
    columns: &[&str],
    rule: &RewriteRule,
    dry_run: bool,
) -> Result<(usize, usize)> {
    let select = format!(
        "SELECT id, {} FROM {}",
        columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
        quote_ident(table)
    );

    let rows: Vec<(i64, Vec<ColumnValue>)> = {
        let mut stmt = conn.prepare(&select)?;
        let mapped = stmt.query_map([], |row| {
            let id: i64 = row.get(0)?;
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(ColumnValue::from_sql(row.get_ref(i + 1)?));
            }
            Ok((id, values))
        })?;
        mapped.collect::<rusqlite::Result<Vec<_>>>()?
    };

    let mut rows_updated = 0;
    let mut columns_updated = 0;

    for (id, values) in rows {
        let staged: Vec<(&str, ColumnValue)> = columns
            .iter()
            .zip(values.iter())
            .filter_map(|(col, value)| rule.apply(value).map(|new| (*col, new)))
            .collect();

        if staged.is_empty() {
            continue;
        }

        for (col, value) in &staged {
            log::debug!("{}#{}.{} -> {:?}", table, id, col, value);
        }
        let changed: Vec<&str> = staged.iter().map(|(c, _)| *c).collect();
        log::info!("{}", row_progress(table, id, &changed, dry_run));

        if !dry_run {
            update_row(conn, table, id, &staged)?;
        }
        rows_updated += 1;
        columns_updated += staged.len();
    }

    Ok((rows_updated, columns_updated))
}

fn update_row(conn: &Connection, table: &str, id: i64, staged: &[(&str, ColumnValue)]) -> Result<()> {
    let assignments = staged
        .iter()
        .enumerate()
        .map(|(i, (col, _))| format!("{} = ?{}", quote_ident(col), i + 1))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        quote_ident(table),
        assignments,
        staged.len() + 1
    );

    let mut params: Vec<&dyn ToSql> = staged.iter().map(|(_, v)| v as &dyn ToSql).collect();
    params.push(&id);
    conn.execute(&sql, params.as_slice())?;
    Ok(())
}

/// Per-row progress line, e.g. `Updated hero_slides row 3: image_url`.
pub fn row_progress(table: &str, id: i64, columns: &[&str], dry_run: bool) -> String {
    format!(
        "{} {} row {}: {}",
        if dry_run { "Would update" } else { "Updated" },
        table,
        id,
        columns.join(", ")
    )
}
