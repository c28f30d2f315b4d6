use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension};
use std::fs;
use std::path::Path;

use crate::error::{Error, Result};

pub type DbPool = Pool<SqliteConnectionManager>;

/// Open a pool on the database file at `path`, creating its directory if needed.
/// Maintenance commands only ever check out a single connection.
pub fn init_pool_at(path: &Path) -> Result<DbPool> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    let manager = SqliteConnectionManager::file(path)
        .with_init(|c| c.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;"));
    let pool = Pool::builder().max_size(2).build(manager)?;
    Ok(pool)
}

/// A single schema step. Steps are applied in order and recorded in
/// `schema_migrations`, so each runs at most once per database.
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub sql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_trust_and_donation_tables",
        sql: "
        -- Trust configuration (key-value)
        CREATE TABLE IF NOT EXISTS trust_settings (
            key TEXT PRIMARY KEY,
            value TEXT
        );

        CREATE TABLE IF NOT EXISTS donors (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            email TEXT,
            phone TEXT,
            pan TEXT,
            donor_type TEXT NOT NULL DEFAULT 'individual',
            address TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS donations (
            id INTEGER PRIMARY KEY,
            donor_id INTEGER NOT NULL,
            amount REAL NOT NULL,
            currency TEXT NOT NULL DEFAULT 'INR',
            mode TEXT NOT NULL DEFAULT 'bank_transfer',
            category TEXT NOT NULL DEFAULT 'general',
            reference TEXT,
            status TEXT NOT NULL DEFAULT 'received',
            donated_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (donor_id) REFERENCES donors(id)
        );

        -- 80G certificates issued against donations
        CREATE TABLE IF NOT EXISTS certificates (
            id INTEGER PRIMARY KEY,
            donation_id INTEGER NOT NULL,
            certificate_no TEXT UNIQUE NOT NULL,
            file_path TEXT,
            issued_at DATETIME DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (donation_id) REFERENCES donations(id)
        );

        CREATE TABLE IF NOT EXISTS audit_logs (
            id INTEGER PRIMARY KEY,
            actor TEXT NOT NULL,
            action TEXT NOT NULL,
            entity_type TEXT,
            entity_id INTEGER,
            details TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        ",
    },
    Migration {
        version: 2,
        name: "create_website_content_tables",
        sql: "
        CREATE TABLE IF NOT EXISTS hero_slides (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            subtitle TEXT,
            image_url TEXT,
            cta_text TEXT,
            cta_link TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            is_active INTEGER NOT NULL DEFAULT 1,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS about_page (
            id INTEGER PRIMARY KEY,
            section_key TEXT UNIQUE NOT NULL,
            title TEXT NOT NULL,
            content TEXT,
            image_url TEXT,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS initiatives (
            id INTEGER PRIMARY KEY,
            slug TEXT UNIQUE NOT NULL,
            title TEXT NOT NULL,
            summary TEXT,
            image_url TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS partners (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            logo_url TEXT,
            website TEXT,
            sort_order INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS news (
            id INTEGER PRIMARY KEY,
            title TEXT NOT NULL,
            slug TEXT UNIQUE NOT NULL,
            body TEXT,
            image_url TEXT,
            gallery TEXT NOT NULL DEFAULT '[]',
            published_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS landing_pages (
            id INTEGER PRIMARY KEY,
            slug TEXT UNIQUE NOT NULL,
            title TEXT NOT NULL,
            hero_image TEXT,
            gallery TEXT NOT NULL DEFAULT '[]',
            body TEXT,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        ",
    },
    Migration {
        version: 3,
        name: "create_header_footer_cta_tables",
        sql: "
        CREATE TABLE IF NOT EXISTS header_settings (
            id INTEGER PRIMARY KEY,
            logo_url TEXT,
            menu TEXT NOT NULL DEFAULT '[]',
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS footer_settings (
            id INTEGER PRIMARY KEY,
            logo_url TEXT,
            address TEXT,
            email TEXT,
            phone TEXT,
            social_links TEXT NOT NULL DEFAULT '{}',
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );

        CREATE TABLE IF NOT EXISTS cta_sections (
            id INTEGER PRIMARY KEY,
            section_key TEXT UNIQUE NOT NULL,
            title TEXT NOT NULL,
            description TEXT,
            button_text TEXT,
            button_link TEXT,
            background_image TEXT,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        ",
    },
    Migration {
        version: 4,
        name: "create_donation_settings",
        sql: "
        -- bank_details holds JSON text; older rows may be double-encoded
        CREATE TABLE IF NOT EXISTS donation_settings (
            id INTEGER PRIMARY KEY,
            bank_details TEXT NOT NULL DEFAULT '{}',
            fcra_bank_details TEXT,
            qr_code_path TEXT,
            updated_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );
        ",
    },
    Migration {
        version: 5,
        name: "add_initiative_images",
        sql: "ALTER TABLE initiatives ADD COLUMN images TEXT NOT NULL DEFAULT '[]';",
    },
    Migration {
        version: 6,
        name: "create_indexes",
        sql: "
        CREATE INDEX IF NOT EXISTS idx_donations_donor ON donations(donor_id);
        CREATE INDEX IF NOT EXISTS idx_donations_date ON donations(donated_at);
        CREATE INDEX IF NOT EXISTS idx_certificates_donation ON certificates(donation_id);
        CREATE INDEX IF NOT EXISTS idx_audit_created ON audit_logs(created_at);
        CREATE INDEX IF NOT EXISTS idx_hero_order ON hero_slides(sort_order);
        ",
    },
];

/// Apply every migration newer than the recorded version. Returns how many ran.
pub fn run_migrations(conn: &Connection) -> Result<usize> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at DATETIME DEFAULT CURRENT_TIMESTAMP
        );",
    )?;

    let current = current_version(conn)?;
    let mut applied = 0;

    for m in MIGRATIONS.iter().filter(|m| m.version > current) {
        let tx = conn.unchecked_transaction()?;
        tx.execute_batch(m.sql)?;
        tx.execute(
            "INSERT INTO schema_migrations (version, name) VALUES (?1, ?2)",
            params![m.version, m.name],
        )?;
        tx.commit()?;
        log::info!("Applied migration {:03}_{}", m.version, m.name);
        applied += 1;
    }

    Ok(applied)
}

/// Highest applied migration version, 0 for a fresh database.
pub fn current_version(conn: &Connection) -> Result<i64> {
    if !table_exists(conn, "schema_migrations")? {
        return Ok(0);
    }
    let v: Option<i64> =
        conn.query_row("SELECT MAX(version) FROM schema_migrations", [], |r| r.get(0))?;
    Ok(v.unwrap_or(0))
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |_| Ok(()),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Column names of `table`, in declaration order.
pub fn table_columns(conn: &Connection, table: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", quote_ident(table)))?;
    let cols = stmt
        .query_map([], |row| row.get::<_, String>("name"))?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(cols)
}

/// Double-quote an SQL identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

const DEFAULT_BANK_DETAILS: &str = r#"{"accountName":"Trust Foundation","accountNumber":"000000000000","ifscCode":"SBIN0000000","bankName":"State Bank of India"}"#;

const DEFAULT_INITIATIVES: &[(&str, &str)] = &[
    ("Education for All", "Scholarships, school kits and evening classes for children."),
    ("Health Camps", "Free medical check-ups and medicines in rural villages."),
    ("Women Empowerment", "Skill training and micro-enterprise support for women."),
    ("Clean Water", "Borewells and purification units for drought-hit communities."),
];

/// Insert default rows. Safe to run repeatedly: keyed tables use
/// `INSERT OR IGNORE`, single-row and list tables are only filled when empty.
pub fn seed_defaults(conn: &Connection) -> Result<()> {
    let settings = vec![
        ("trust_name", "Trust Foundation"),
        ("trust_registration_no", ""),
        ("trust_pan", ""),
        ("trust_80g_registration", ""),
        ("trust_csr_registration", ""),
        ("trust_fcra_registration", ""),
        ("contact_email", ""),
        ("contact_phone", ""),
        ("site_url", "http://localhost:5000"),
        ("certificate_prefix", "80G"),
        ("currency", "INR"),
    ];
    for (key, value) in settings {
        conn.execute(
            "INSERT OR IGNORE INTO trust_settings (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
    }

    if is_empty(conn, "hero_slides")? {
        let slides = [
            ("Every child deserves a chance", "Support education across our villages", "Donate Now", "/donate"),
            ("Healthcare at the doorstep", "Mobile clinics reaching the last mile", "Learn More", "/initiatives"),
            ("Stronger together", "Volunteer with us this season", "Join Us", "/volunteer"),
        ];
        for (i, (title, subtitle, cta_text, cta_link)) in slides.iter().enumerate() {
            conn.execute(
                "INSERT INTO hero_slides (title, subtitle, cta_text, cta_link, sort_order) VALUES (?1, ?2, ?3, ?4, ?5)",
                params![title, subtitle, cta_text, cta_link, i as i64 + 1],
            )?;
        }
    }

    let about = [
        ("main", "About Us", "We are a registered charitable trust working since 2005."),
        ("mission", "Our Mission", "To enable dignified lives through education and health."),
        ("vision", "Our Vision", "A society where no one is left behind."),
    ];
    for (key, title, content) in about {
        conn.execute(
            "INSERT OR IGNORE INTO about_page (section_key, title, content) VALUES (?1, ?2, ?3)",
            params![key, title, content],
        )?;
    }

    for (i, (title, summary)) in DEFAULT_INITIATIVES.iter().enumerate() {
        conn.execute(
            "INSERT OR IGNORE INTO initiatives (slug, title, summary, sort_order) VALUES (?1, ?2, ?3, ?4)",
            params![slug::slugify(title), title, summary, i as i64 + 1],
        )?;
    }

    if is_empty(conn, "partners")? {
        for (i, name) in ["Rotary Club", "Local Panchayat", "City Hospital"].iter().enumerate() {
            conn.execute(
                "INSERT INTO partners (name, sort_order) VALUES (?1, ?2)",
                params![name, i as i64 + 1],
            )?;
        }
    }

    conn.execute(
        "INSERT OR IGNORE INTO news (title, slug, body) VALUES (?1, ?2, ?3)",
        params![
            "Annual Health Camp Concludes",
            "annual-health-camp-concludes",
            "Over 1,200 patients were examined during this year's camp."
        ],
    )?;

    conn.execute(
        "INSERT OR IGNORE INTO landing_pages (slug, title, body) VALUES (?1, ?2, ?3)",
        params!["donate", "Donate", "Your contribution is eligible for tax exemption under section 80G."],
    )?;

    if is_empty(conn, "header_settings")? {
        conn.execute(
            "INSERT INTO header_settings (menu) VALUES (?1)",
            params![r#"[{"label":"Home","href":"/"},{"label":"About","href":"/about"},{"label":"Initiatives","href":"/initiatives"},{"label":"Donate","href":"/donate"}]"#],
        )?;
    }

    if is_empty(conn, "footer_settings")? {
        conn.execute(
            "INSERT INTO footer_settings (address, email, phone) VALUES (?1, ?2, ?3)",
            params!["", "", ""],
        )?;
    }

    let ctas = [
        ("donate", "Make a Difference Today", "Every contribution counts.", "Donate Now", "/donate"),
        ("volunteer", "Become a Volunteer", "Give your time to a cause.", "Sign Up", "/volunteer"),
    ];
    for (key, title, description, button_text, button_link) in ctas {
        conn.execute(
            "INSERT OR IGNORE INTO cta_sections (section_key, title, description, button_text, button_link)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![key, title, description, button_text, button_link],
        )?;
    }

    if is_empty(conn, "donation_settings")? {
        conn.execute(
            "INSERT INTO donation_settings (bank_details) VALUES (?1)",
            params![DEFAULT_BANK_DETAILS],
        )?;
    }

    Ok(())
}

fn is_empty(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", quote_ident(table)),
        [],
        |r| r.get(0),
    )?;
    Ok(count == 0)
}
