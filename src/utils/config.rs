use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::source::Genre;

const APP_DIR: &str = "booklore-enrich";
const PASSWORD_ENV: &str = "BOOKLORE_PASSWORD";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub booklore: BookloreConfig,
    pub scraping: ScrapingConfig,
    pub discovery: DiscoveryConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BookloreConfig {
    pub url: String,
    pub username: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapingConfig {
    /// Minimum seconds between two page fetches.
    pub rate_limit_seconds: u64,
    pub max_concurrent: u32,
    pub headless: bool,
}

/// Trope slugs browsed by `discover`, per genre.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub romance_tropes: Vec<String>,
    pub scifi_tropes: Vec<String>,
    pub fantasy_tropes: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl Default for BookloreConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:6060".to_string(),
            username: String::new(),
        }
    }
}

impl Default for ScrapingConfig {
    fn default() -> Self {
        Self {
            rate_limit_seconds: 3,
            max_concurrent: 1,
            headless: true,
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            romance_tropes: strings(&["enemies-to-lovers", "slow-burn", "forced-proximity"]),
            scifi_tropes: strings(&["space-opera", "first-contact", "cyberpunk"]),
            fantasy_tropes: strings(&["epic-fantasy", "urban-fantasy", "dark-fantasy"]),
        }
    }
}

impl ScrapingConfig {
    pub fn rate_limit(&self) -> Duration {
        Duration::from_secs(self.rate_limit_seconds)
    }
}

impl DiscoveryConfig {
    pub fn tropes_for(&self, genre: Genre) -> &[String] {
        match genre {
            Genre::Romance => &self.romance_tropes,
            Genre::SciFi => &self.scifi_tropes,
            Genre::Fantasy => &self.fantasy_tropes,
        }
    }
}

impl Config {
    /// The configured BookLore username; commands that talk to BookLore
    /// stop here, before any network call, when it is missing.
    pub fn require_username(&self) -> Result<&str> {
        if self.booklore.username.trim().is_empty() {
            bail!("No BookLore username configured. Run `export --username <NAME>` or set it in the config file.");
        }
        Ok(&self.booklore.username)
    }
}

fn app_dir() -> Result<PathBuf> {
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR))
        .ok_or_else(|| anyhow!("Could not determine the user config directory"))
}

pub fn default_config_path() -> Result<PathBuf> {
    Ok(app_dir()?.join("config.toml"))
}

pub fn default_db_path() -> Result<PathBuf> {
    Ok(app_dir()?.join("cache.db"))
}

/// Loads the config file, falling back to defaults for a missing file or
/// missing keys.
pub fn load_config(path: &Path) -> Result<Config> {
    if !path.exists() {
        debug!("No config at {:?}, using defaults", path);
        return Ok(Config::default());
    }

    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {:?}", path))?;
    toml::from_str(&content).with_context(|| format!("Invalid config file {:?}", path))
}

pub fn save_config(config: &Config, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context("Failed to create config directory")?;
    }
    let content = toml::to_string_pretty(config).context("Failed to serialize config")?;
    fs::write(path, content).with_context(|| format!("Failed to write config file {:?}", path))?;
    info!("Saved config to {:?}", path);
    Ok(())
}

/// BookLore password from `BOOKLORE_PASSWORD`, else an interactive prompt.
/// Never written to disk.
pub fn get_password() -> Result<String> {
    if let Ok(password) = std::env::var(PASSWORD_ENV) {
        if !password.is_empty() {
            return Ok(password);
        }
    }
    rpassword::prompt_password("BookLore password: ").context("Failed to read password")
}
