use rusqlite::{params, Connection, OptionalExtension};

use crate::error::Result;

/// Key-value rows of `trust_settings`.
pub struct TrustSetting;

impl TrustSetting {
    pub fn get(conn: &Connection, key: &str) -> Result<Option<String>> {
        let value = conn
            .query_row(
                "SELECT value FROM trust_settings WHERE key = ?1",
                params![key],
                |row| row.get::<_, Option<String>>(0),
            )
            .optional()?;
        Ok(value.flatten())
    }

    pub fn get_or(conn: &Connection, key: &str, default: &str) -> String {
        Self::get(conn, key)
            .ok()
            .flatten()
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}
