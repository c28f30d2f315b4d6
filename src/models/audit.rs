use chrono::NaiveDateTime;
use rusqlite::{params, Connection};
use serde::Serialize;

use crate::error::Result;

/// Actor recorded for entries written by the maintenance commands.
pub const MAINTENANCE_ACTOR: &str = "maintenance";

#[derive(Debug, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub actor: String,
    pub action: String,
    pub entity_type: Option<String>,
    pub entity_id: Option<i64>,
    pub details: Option<String>,
    pub created_at: NaiveDateTime,
}

impl AuditEntry {
    pub fn log(
        conn: &Connection,
        actor: &str,
        action: &str,
        entity_type: Option<&str>,
        entity_id: Option<i64>,
        details: Option<&str>,
    ) -> Result<i64> {
        conn.execute(
            "INSERT INTO audit_logs (actor, action, entity_type, entity_id, details)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![actor, action, entity_type, entity_id, details],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn list(conn: &Connection, action_filter: Option<&str>, limit: i64) -> Result<Vec<Self>> {
        let mut stmt = conn.prepare(
            "SELECT * FROM audit_logs
             WHERE (?1 IS NULL OR action = ?1)
             ORDER BY created_at DESC, id DESC LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![action_filter, limit], |row| {
                Ok(AuditEntry {
                    id: row.get("id")?,
                    actor: row.get("actor")?,
                    action: row.get("action")?,
                    entity_type: row.get("entity_type")?,
                    entity_id: row.get("entity_id")?,
                    details: row.get("details")?,
                    created_at: row.get("created_at")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}
