use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::config::AssetsConfig;
use crate::error::{Error, Result};

#[derive(Debug, Default, Serialize, PartialEq)]
pub struct SyncReport {
    pub copied: usize,
    pub skipped: usize,
}

/// Where an asset comes from and where it lands, relative to the
/// static and uploads roots respectively.
struct AssetCopy {
    label: String,
    sources: Vec<PathBuf>,
    dest: String,
}

impl AssetCopy {
    /// First candidate that exists on disk.
    fn find_source(&self, static_dir: &Path) -> Option<PathBuf> {
        self.sources
            .iter()
            .map(|rel| static_dir.join(rel))
            .find(|p| p.is_file())
    }
}

/// Copy the canonical images into the uploads tree and point the owning rows
/// at the served copies. Missing sources are skipped; IO and SQL errors abort.
pub fn sync(conn: &Connection, cfg: &AssetsConfig) -> Result<SyncReport> {
    let mut report = SyncReport::default();

    // ── Initiatives (one per slug) ──────────────────────
    let slugs: Vec<(i64, String)> = {
        let mut stmt = conn.prepare("SELECT id, slug FROM initiatives ORDER BY sort_order, id")?;
        let rows = stmt.query_map([], |r| Ok((r.get(0)?, r.get(1)?)))?;
        rows.collect::<rusqlite::Result<Vec<_>>>()?
    };
    for (id, slug) in slugs {
        if !is_safe_slug(&slug) {
            log::warn!("Initiative {} has unsafe slug '{}', skipping", id, slug);
            report.skipped += 1;
            continue;
        }
        let asset = AssetCopy {
            label: format!("initiative '{}'", slug),
            sources: vec![
                PathBuf::from(format!("initiatives/{}/01.jpg", slug)),
                PathBuf::from(format!("initiatives/{}.jpg", slug)),
            ],
            dest: format!("initiatives/{}/01.jpg", slug),
        };
        if let Some(public) = copy_asset(cfg, &asset, &mut report)? {
            let images = serde_json::to_string(&[public.as_str()])?;
            conn.execute(
                "UPDATE initiatives SET images = ?1, image_url = ?2, updated_at = CURRENT_TIMESTAMP WHERE id = ?3",
                params![images, public, id],
            )?;
        }
    }

    // ── About page ──────────────────────────────────────
    let about = AssetCopy {
        label: "about image".to_string(),
        sources: vec![PathBuf::from("about/about.jpg"), PathBuf::from("about.jpg")],
        dest: "about/about.jpg".to_string(),
    };
    if let Some(public) = copy_asset(cfg, &about, &mut report)? {
        conn.execute(
            "UPDATE about_page SET image_url = ?1, updated_at = CURRENT_TIMESTAMP",
            params![public],
        )?;
    }

    // ── Primary hero slide ──────────────────────────────
    let hero_id: Option<i64> = conn
        .query_row(
            "SELECT id FROM hero_slides ORDER BY sort_order, id LIMIT 1",
            [],
            |r| r.get(0),
        )
        .optional()?;
    match hero_id {
        Some(id) => {
            let hero = AssetCopy {
                label: "hero image".to_string(),
                sources: vec![PathBuf::from("hero/hero-1.jpg"), PathBuf::from("hero-1.jpg")],
                dest: "hero/hero-1.jpg".to_string(),
            };
            if let Some(public) = copy_asset(cfg, &hero, &mut report)? {
                conn.execute(
                    "UPDATE hero_slides SET image_url = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
                    params![public, id],
                )?;
            }
        }
        None => {
            log::info!("No hero slides, skipping hero image");
            report.skipped += 1;
        }
    }

    // ── Site logo ───────────────────────────────────────
    let logo = AssetCopy {
        label: "site logo".to_string(),
        sources: vec![PathBuf::from("logo/logo.png"), PathBuf::from("logo.png")],
        dest: "site/logo.png".to_string(),
    };
    if let Some(public) = copy_asset(cfg, &logo, &mut report)? {
        conn.execute(
            "UPDATE header_settings SET logo_url = ?1, updated_at = CURRENT_TIMESTAMP",
            params![public],
        )?;
        conn.execute(
            "UPDATE footer_settings SET logo_url = ?1, updated_at = CURRENT_TIMESTAMP",
            params![public],
        )?;
    }

    log::info!(
        "Asset sync finished: {} copied, {} skipped",
        report.copied,
        report.skipped
    );
    Ok(report)
}

/// A slug is only used in a path when it is already in slug form and is
/// a single plain path component.
pub fn is_safe_slug(slug: &str) -> bool {
    !slug.is_empty()
        && slug::slugify(slug) == slug
        && Path::new(slug)
            .components()
            .all(|c| matches!(c, Component::Normal(_)))
}

/// Copy one asset if its source exists. Returns the served path of the copy.
fn copy_asset(cfg: &AssetsConfig, asset: &AssetCopy, report: &mut SyncReport) -> Result<Option<String>> {
    let source = match asset.find_source(&cfg.static_dir) {
        Some(p) => p,
        None => {
            log::info!("No source image for {}, skipping", asset.label);
            report.skipped += 1;
            return Ok(None);
        }
    };

    let dest = cfg.uploads_dir.join(&asset.dest);
    if let Some(parent) = dest.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    fs::copy(&source, &dest).map_err(|e| Error::io(&source, e))?;

    let public = cfg.public_path(&asset.dest);
    log::info!("Copied {} -> {} ({})", source.display(), dest.display(), asset.label);
    report.copied += 1;
    Ok(Some(public))
}
