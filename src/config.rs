use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default location of the optional config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "trustcms.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub assets: AssetsConfig,
    pub normalize: NormalizeConfig,
    pub qr: QrConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("data/trustcms.db"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AssetsConfig {
    /// Canonical image tree shipped with the site.
    pub static_dir: PathBuf,
    /// Directory the web server exposes under `public_prefix`.
    pub uploads_dir: PathBuf,
    pub public_prefix: String,
}

impl Default for AssetsConfig {
    fn default() -> Self {
        Self {
            static_dir: PathBuf::from("static/images"),
            uploads_dir: PathBuf::from("public/uploads"),
            public_prefix: "/uploads".to_string(),
        }
    }
}

impl AssetsConfig {
    /// Served path for a file stored at `relative` under the uploads directory.
    pub fn public_path(&self, relative: &str) -> String {
        format!(
            "{}/{}",
            self.public_prefix.trim_end_matches('/'),
            relative.trim_start_matches('/')
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NormalizeConfig {
    pub origin: String,
}

impl Default for NormalizeConfig {
    fn default() -> Self {
        Self {
            origin: "http://localhost:5000/".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QrConfig {
    pub width: u32,
    pub margin: u32,
    pub dark: String,
    pub light: String,
}

impl Default for QrConfig {
    fn default() -> Self {
        Self {
            width: 300,
            margin: 2,
            dark: "#000000".to_string(),
            light: "#FFFFFF".to_string(),
        }
    }
}

impl Config {
    /// Load from `path`. A missing file yields the defaults; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml(&raw)
    }

    pub fn from_toml(raw: &str) -> Result<Self> {
        toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Validate an http(s) origin such as `http://localhost:5000` and return it
/// with a trailing slash. The authority is kept as written, so an explicit
/// default port (`:80`) still matches stored values that carry it.
pub fn normalize_origin(origin: &str) -> Result<String> {
    let parsed = url::Url::parse(origin)
        .map_err(|e| Error::Config(format!("invalid origin '{}': {}", origin, e)))?;
    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(Error::Config(format!("origin '{}' is not http or https", origin)));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(Error::Config(format!("origin '{}' has no host", origin)));
    }

    let rest = origin
        .trim()
        .split_once("://")
        .map(|(_, rest)| rest)
        .ok_or_else(|| Error::Config(format!("origin '{}' has no authority", origin)))?;
    let authority = rest
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or("");
    if authority.is_empty() || authority.contains('@') {
        return Err(Error::Config(format!("origin '{}' has an unsupported authority", origin)));
    }
    Ok(format!("{}://{}/", scheme, authority))
}

/// Parse `#RRGGBB` into an RGB triple.
pub fn parse_hex_color(s: &str) -> Result<[u8; 3]> {
    let hex = s.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err(Error::Config(format!("invalid color '{}'", s)));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16)
            .map_err(|_| Error::Config(format!("invalid color '{}'", s)))
    };
    Ok([channel(0)?, channel(2)?, channel(4)?])
}
