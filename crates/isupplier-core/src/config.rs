use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use anyhow::{Result, anyhow};
use reqwest::Url;

use crate::lang::Lang;

pub const DEFAULT_WEBHOOK_BASE_URL: &str = "http://localhost:5005";
pub const WEBHOOK_PATH: &str = "/webhooks/rest/webhook";
pub const DEFAULT_TIMEOUT_MS: u64 = 20_000;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    pub webhook_base_url: String,
    pub auth_token: String,
    pub default_language: Lang,
    pub timeout_ms: u64,
    /// Shell command that streams speech transcripts on stdout
    pub voice_command: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    pub fn new() -> Self {
        Self {
            webhook_base_url: DEFAULT_WEBHOOK_BASE_URL.to_string(),
            auth_token: String::new(),
            default_language: Lang::En,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            voice_command: None,
        }
    }

    /// Load the config file (if any), then apply environment overrides
    pub fn load() -> Result<Self> {
        let mut config = Self::load_file()?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    fn load_file() -> Result<Self> {
        let config_path = Self::get_config_path()?;

        if !config_path.exists() {
            return Ok(Self::new());
        }

        let config_content = fs::read_to_string(&config_path)?;
        let config: Config = serde_json::from_str(&config_content)?;
        Ok(config)
    }

    /// Overlay values from `RASA_URL`, `RASA_TOKEN`, `DEFAULT_LANG`,
    /// `ISUPPLIER_TIMEOUT_MS` and `ISUPPLIER_VOICE_CMD`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("RASA_URL").filter(|v| !v.trim().is_empty()) {
            self.webhook_base_url = url.trim().to_string();
        }
        if let Some(token) = lookup("RASA_TOKEN") {
            self.auth_token = token;
        }
        if let Some(lang) = lookup("DEFAULT_LANG").as_deref().and_then(Lang::from_str) {
            self.default_language = lang;
        }
        if let Some(ms) = lookup("ISUPPLIER_TIMEOUT_MS").and_then(|v| v.trim().parse().ok()) {
            self.timeout_ms = ms;
        }
        if let Some(cmd) = lookup("ISUPPLIER_VOICE_CMD").filter(|v| !v.trim().is_empty()) {
            self.voice_command = Some(cmd);
        }
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::get_config_path()?;

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let config_content = serde_json::to_string_pretty(self)?;
        fs::write(&config_path, config_content)?;
        Ok(())
    }

    /// Persist the language preference, keeping the rest of the file intact
    pub fn save_language(lang: Lang) -> Result<()> {
        let mut config = Self::load_file().unwrap_or_else(|_| Self::new());
        config.default_language = lang;
        config.save()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Full webhook URL: base + fixed path, with `?token=` when configured
    pub fn webhook_url(&self) -> Result<Url> {
        let base = self.webhook_base_url.trim_end_matches('/');
        let mut url = Url::parse(&format!("{}{}", base, WEBHOOK_PATH))
            .map_err(|e| anyhow!("Invalid webhook base URL {:?}: {}", self.webhook_base_url, e))?;

        if !self.auth_token.is_empty() {
            url.query_pairs_mut().append_pair("token", &self.auth_token);
        }
        Ok(url)
    }

    fn get_config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?;

        Ok(config_dir.join("isupplier").join("config.json"))
    }
}
