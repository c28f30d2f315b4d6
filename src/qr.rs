use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use qrcodegen::{QrCode, QrCodeEcc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

use crate::config::{parse_hex_color, AssetsConfig, QrConfig};
use crate::error::{Error, Result};

/// Location of the generated image, relative to the uploads directory.
pub const QR_RELATIVE_PATH: &str = "qr/donation-qr.png";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BankDetails {
    pub account_name: String,
    pub account_number: String,
    pub ifsc_code: String,
    pub bank_name: String,
}

impl BankDetails {
    /// Decode the stored column. Accepts a JSON object or a JSON string that
    /// itself contains the object.
    pub fn decode(raw: &str) -> Result<Self> {
        let mut value: serde_json::Value = serde_json::from_str(raw)?;
        if let serde_json::Value::String(inner) = &value {
            value = serde_json::from_str(inner)?;
        }
        if !value.is_object() {
            return Err(Error::BankDetails("expected a JSON object".to_string()));
        }
        serde_json::from_value(value).map_err(|e| Error::BankDetails(e.to_string()))
    }

    pub fn payload(&self) -> String {
        format!(
            "Account Name: {}\nAccount Number: {}\nIFSC Code: {}\nBank Name: {}",
            self.account_name, self.account_number, self.ifsc_code, self.bank_name
        )
    }
}

#[derive(Debug, Serialize)]
pub struct QrOutcome {
    pub settings_id: i64,
    pub file: PathBuf,
    pub public_path: String,
}

/// Render `payload` as a square PNG-ready image.
pub fn render(payload: &str, cfg: &QrConfig) -> Result<RgbImage> {
    let code = QrCode::encode_text(payload, QrCodeEcc::Medium)
        .map_err(|e| Error::Qr(e.to_string()))?;
    let dark = Rgb(parse_hex_color(&cfg.dark)?);
    let light = Rgb(parse_hex_color(&cfg.light)?);

    let size = code.size() as u32;
    let modules = cfg
        .margin
        .checked_mul(2)
        .and_then(|m| m.checked_add(size))
        .ok_or_else(|| Error::Qr(format!("margin {} too large", cfg.margin)))?;
    if cfg.width < modules {
        return Err(Error::Qr(format!(
            "width {}px is smaller than the {} modules of the code",
            cfg.width, modules
        )));
    }
    let scale = cfg.width / modules;
    let side = modules * scale;

    let mut img = RgbImage::from_pixel(side, side, light);
    for y in 0..size {
        for x in 0..size {
            if !code.get_module(x as i32, y as i32) {
                continue;
            }
            let px = (x + cfg.margin) * scale;
            let py = (y + cfg.margin) * scale;
            for dy in 0..scale {
                for dx in 0..scale {
                    img.put_pixel(px + dx, py + dy, dark);
                }
            }
        }
    }

    if side != cfg.width {
        img = image::imageops::resize(&img, cfg.width, cfg.width, FilterType::Nearest);
    }
    Ok(img)
}

/// Build the payment QR from the first `donation_settings` row, write it
/// under the uploads directory and store its served path on the row.
pub fn generate(conn: &Connection, assets: &AssetsConfig, cfg: &QrConfig) -> Result<QrOutcome> {
    let (id, raw): (i64, String) = conn
        .query_row(
            "SELECT id, bank_details FROM donation_settings ORDER BY id LIMIT 1",
            [],
            |r| Ok((r.get(0)?, r.get(1)?)),
        )
        .optional()?
        .ok_or(Error::MissingRow("donation_settings"))?;

    let details = BankDetails::decode(&raw)?;
    let payload = details.payload();
    log::debug!("QR payload:\n{}", payload);

    let img = render(&payload, cfg)?;

    let file = assets.uploads_dir.join(QR_RELATIVE_PATH);
    if let Some(parent) = file.parent() {
        fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    img.save(&file)?;

    let public_path = assets.public_path(QR_RELATIVE_PATH);
    conn.execute(
        "UPDATE donation_settings SET qr_code_path = ?1, updated_at = CURRENT_TIMESTAMP WHERE id = ?2",
        params![public_path, id],
    )?;

    log::info!("Generated donation QR at {} ({})", file.display(), public_path);
    Ok(QrOutcome {
        settings_id: id,
        file,
        public_path,
    })
}
