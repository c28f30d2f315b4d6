use rusqlite::Connection;
use serde::Serialize;

use crate::config::AssetsConfig;
use crate::db::{current_version, quote_ident, table_exists};
use crate::error::Result;
use crate::models::audit::AuditEntry;
use crate::models::settings::TrustSetting;

/// Tables reported by `status`, in display order.
pub const TABLES: &[&str] = &[
    "trust_settings",
    "donors",
    "donations",
    "certificates",
    "audit_logs",
    "hero_slides",
    "about_page",
    "initiatives",
    "partners",
    "news",
    "landing_pages",
    "header_settings",
    "footer_settings",
    "cta_sections",
    "donation_settings",
];

#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub trust_name: String,
    pub schema_version: i64,
    /// `None` when the table has not been created yet.
    pub table_counts: Vec<(String, Option<u64>)>,
    pub static_dir_exists: bool,
    pub uploads_dir_exists: bool,
    pub recent_audit: Vec<AuditEntry>,
}

pub fn gather(conn: &Connection, assets: &AssetsConfig) -> Result<StatusReport> {
    let mut table_counts = Vec::with_capacity(TABLES.len());
    for t in TABLES {
        let count = if table_exists(conn, t)? {
            let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(t));
            Some(conn.query_row(&sql, [], |r| r.get::<_, u64>(0))?)
        } else {
            None
        };
        table_counts.push((t.to_string(), count));
    }

    let trust_name = if table_exists(conn, "trust_settings")? {
        TrustSetting::get_or(conn, "trust_name", "(unnamed)")
    } else {
        "(unnamed)".to_string()
    };

    let recent_audit = if table_exists(conn, "audit_logs")? {
        AuditEntry::list(conn, None, 5)?
    } else {
        Vec::new()
    };

    Ok(StatusReport {
        trust_name,
        schema_version: current_version(conn)?,
        table_counts,
        static_dir_exists: assets.static_dir.is_dir(),
        uploads_dir_exists: assets.uploads_dir.is_dir(),
        recent_audit,
    })
}

impl StatusReport {
    pub fn render(&self) -> String {
        let mut out = format!(
            "{}\nschema version: {}\n\n",
            self.trust_name, self.schema_version
        );
        for (table, count) in &self.table_counts {
            match count {
                Some(n) => out.push_str(&format!("  {:<20} {}\n", table, n)),
                None => out.push_str(&format!("  {:<20} (missing)\n", table)),
            }
        }
        out.push_str(&format!(
            "\nstatic dir:  {}\nuploads dir: {}\n",
            if self.static_dir_exists { "ok" } else { "missing" },
            if self.uploads_dir_exists { "ok" } else { "missing" }
        ));
        if !self.recent_audit.is_empty() {
            out.push_str("\nrecent activity:\n");
            for e in &self.recent_audit {
                out.push_str(&format!(
                    "  {}  {:<16} {}\n",
                    e.created_at.format("%Y-%m-%d %H:%M"),
                    e.action,
                    e.details.as_deref().unwrap_or("")
                ));
            }
        }
        out
    }
}
