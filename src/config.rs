use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::model::{DEFAULT_TAX_CODE, Defaults};

pub const DEFAULT_SHARE_BASE_URL: &str = "http://localhost:8081/";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub default_tax_code: String,
    pub google_maps_api_key: Option<String>,
    /// Page address that shared links point at.
    pub share_base_url: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            default_tax_code: DEFAULT_TAX_CODE.to_string(),
            google_maps_api_key: None,
            share_base_url: DEFAULT_SHARE_BASE_URL.to_string(),
        }
    }
}

impl Settings {
    /// The API key, treating a blank one as absent.
    pub fn api_key(&self) -> Option<&str> {
        self.google_maps_api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
    }

    /// Values from flags or the environment take precedence over the file.
    pub fn with_overrides(mut self, tax_code: Option<String>, api_key: Option<String>) -> Self {
        if let Some(code) = tax_code.filter(|c| !c.trim().is_empty()) {
            self.default_tax_code = code;
        }
        if let Some(key) = api_key.filter(|k| !k.trim().is_empty()) {
            self.google_maps_api_key = Some(key);
        }
        self
    }

    pub fn defaults(&self) -> Defaults {
        Defaults::new(self.default_tax_code.clone())
    }
}

pub fn config_path() -> PathBuf {
    if let Some(proj_dirs) = ProjectDirs::from("com", "sales-order-entry", "app") {
        return proj_dirs.config_dir().join("settings.toml");
    }
    PathBuf::from("settings.toml")
}

/// `Ok(None)` when there is no settings file yet.
pub fn load_from(path: &Path) -> Result<Option<Settings>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    Ok(Some(toml::from_str(&content)?))
}

pub fn save_to(path: &Path, settings: &Settings) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        fs::create_dir_all(dir)?;
    }
    fs::write(path, toml::to_string_pretty(settings)?)?;
    Ok(())
}
