use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process;

mod assets;
mod config;
mod db;
mod error;
mod models;
mod normalize;
mod qr;
mod status;


use config::Config;
use error::Result;
use models::audit::{AuditEntry, MAINTENANCE_ACTOR};

#[derive(Debug, Parser)]
#[command(name = "trustcms", version, about = "Schema, seeds and maintenance passes for the trust database")]
struct Cli {
    /// Config file (missing file means built-in defaults)
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Database file, overrides [database].path
    #[arg(long)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Apply pending schema migrations
    Migrate,
    /// Insert default rows (safe to repeat)
    Seed,
    /// Strip the absolute dev origin from stored content URLs
    Normalize {
        /// Log the changes without writing them
        #[arg(long)]
        dry_run: bool,
        /// Origin to strip, overrides [normalize].origin
        #[arg(long)]
        origin: Option<String>,
    },
    /// Copy canonical images into the uploads tree and update their rows
    SyncAssets,
    /// Render the donation bank-details QR code
    GenerateQr,
    /// Show table counts and asset directory checks
    Status,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli) {
        eprintln!("trustcms error: {}", e);
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut cfg = Config::load(&cli.config)?;
    if let Some(path) = cli.database {
        cfg.database.path = path;
    }

    // One connection for the whole command; released when this function returns.
    let pool = db::init_pool_at(&cfg.database.path)?;
    let conn = pool.get()?;
    log::debug!("Opened {}", cfg.database.path.display());

    match cli.command {
        Command::Migrate => {
            let applied = db::run_migrations(&conn)?;
            if applied == 0 {
                log::info!("Schema up to date (version {})", db::current_version(&conn)?);
            }
        }
        Command::Seed => {
            db::seed_defaults(&conn)?;
            log::info!("Seeded default rows");
        }
        Command::Normalize { dry_run, origin } => {
            let origin = config::normalize_origin(origin.as_deref().unwrap_or(&cfg.normalize.origin))?;
            let rule = normalize::RewriteRule::new(origin);
            log::info!("Stripping '{}' from stored URLs", rule.prefix());
            let report = normalize::run(&conn, &normalize::default_targets(), &rule, dry_run)?;
            if !dry_run {
                let details = serde_json::to_string(&report)?;
                AuditEntry::log(&conn, MAINTENANCE_ACTOR, "normalize_urls", None, None, Some(&details))?;
            }
        }
        Command::SyncAssets => {
            let report = assets::sync(&conn, &cfg.assets)?;
            let details = serde_json::to_string(&report)?;
            AuditEntry::log(&conn, MAINTENANCE_ACTOR, "sync_assets", None, None, Some(&details))?;
        }
        Command::GenerateQr => {
            let outcome = qr::generate(&conn, &cfg.assets, &cfg.qr)?;
            AuditEntry::log(
                &conn,
                MAINTENANCE_ACTOR,
                "generate_qr",
                Some("donation_settings"),
                Some(outcome.settings_id),
                Some(&outcome.public_path),
            )?;
        }
        Command::Status => {
            let report = status::gather(&conn, &cfg.assets)?;
            print!("{}", report.render());
        }
    }

    Ok(())
}
