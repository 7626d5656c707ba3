//! Configuration loader and validator for the invoicing bot.
use chrono::Duration;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::handlers::EngineSettings;
use crate::notify::DeliveryTemplates;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub whatsapp: WhatsApp,
    #[serde(default)]
    pub transcription: Option<Transcription>,
    pub server: Server,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
    /// Defaults to `sqlite://<data_dir>/invoicer.db`.
    #[serde(default)]
    pub database_url: Option<String>,
    pub session_ttl_seconds: u64,
    pub min_invoice_amount: u64,
    pub catalog_match_limit: u32,
    pub home_country_code: String,
    /// Where invoice PDFs are served; invoices carry no document without it.
    #[serde(default)]
    pub document_base_url: Option<String>,
}

/// Business Messaging API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WhatsApp {
    pub token: String,
    pub phone_number_id: String,
    pub api_base: String,
    pub api_version: String,
    pub verify_token: String,
    #[serde(default)]
    pub templates: Templates,
}

/// Pre-approved message templates. Either may be absent.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Templates {
    #[serde(default)]
    pub invoice: Option<String>,
    #[serde(default)]
    pub invoice_with_payment: Option<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

/// Speech-to-text endpoint for voice notes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Transcription {
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Server {
    pub host: String,
    pub port: u16,
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(&self.app.data_dir)
    }

    pub fn database_url(&self) -> String {
        self.app
            .database_url
            .clone()
            .unwrap_or_else(|| format!("sqlite://{}/invoicer.db", self.app.data_dir))
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn delivery_templates(&self) -> DeliveryTemplates {
        let non_empty = |v: &Option<String>| v.clone().filter(|s| !s.trim().is_empty());
        DeliveryTemplates {
            invoice: non_empty(&self.whatsapp.templates.invoice),
            invoice_with_payment: non_empty(&self.whatsapp.templates.invoice_with_payment),
            language: self.whatsapp.templates.language.clone(),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            session_ttl: Duration::seconds(self.app.session_ttl_seconds as i64),
            min_invoice_amount: Decimal::from(self.app.min_invoice_amount),
            catalog_match_limit: self.app.catalog_match_limit,
            templates: self.delivery_templates(),
        }
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
pub fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }
    if cfg.app.session_ttl_seconds == 0 {
        return Err(ConfigError::Invalid("app.session_ttl_seconds must be > 0"));
    }
    if cfg.app.min_invoice_amount == 0 {
        return Err(ConfigError::Invalid("app.min_invoice_amount must be > 0"));
    }
    if !(1..=50).contains(&cfg.app.catalog_match_limit) {
        return Err(ConfigError::Invalid("app.catalog_match_limit must be between 1 and 50"));
    }
    if cfg.app.home_country_code != crate::phone::HOME_COUNTRY_CODE {
        return Err(ConfigError::Invalid("app.home_country_code must be 234"));
    }
    if let Some(base) = &cfg.app.document_base_url {
        if !base.starts_with("http://") && !base.starts_with("https://") {
            return Err(ConfigError::Invalid("app.document_base_url must be an http(s) URL"));
        }
    }

    let wa = &cfg.whatsapp;
    if wa.token.trim().is_empty() {
        return Err(ConfigError::Invalid("whatsapp.token must be non-empty"));
    }
    if wa.phone_number_id.trim().is_empty() {
        return Err(ConfigError::Invalid("whatsapp.phone_number_id must be non-empty"));
    }
    if !wa.api_base.starts_with("http://") && !wa.api_base.starts_with("https://") {
        return Err(ConfigError::Invalid("whatsapp.api_base must be an http(s) URL"));
    }
    if wa.api_version.trim().is_empty() {
        return Err(ConfigError::Invalid("whatsapp.api_version must be non-empty"));
    }
    if wa.verify_token.trim().is_empty() {
        return Err(ConfigError::Invalid("whatsapp.verify_token must be non-empty"));
    }
    if wa.templates.language.trim().is_empty() {
        return Err(ConfigError::Invalid("whatsapp.templates.language must be non-empty"));
    }

    if let Some(t) = &cfg.transcription {
        if !t.endpoint.starts_with("http://") && !t.endpoint.starts_with("https://") {
            return Err(ConfigError::Invalid("transcription.endpoint must be an http(s) URL"));
        }
        if t.model.trim().is_empty() {
            return Err(ConfigError::Invalid("transcription.model must be non-empty"));
        }
    }

    if cfg.server.host.trim().is_empty() {
        return Err(ConfigError::Invalid("server.host must be non-empty"));
    }
    if cfg.server.port == 0 {
        return Err(ConfigError::Invalid("server.port must be > 0"));
    }

    Ok(())
}

/// A complete example configuration.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"
  session_ttl_seconds: 900
  min_invoice_amount: 100
  catalog_match_limit: 50
  home_country_code: "234"
  document_base_url: "https://invoices.example.com"

whatsapp:
  token: "YOUR_BUSINESS_API_TOKEN"
  phone_number_id: "123456789012345"
  api_base: "https://graph.facebook.com"
  api_version: "v19.0"
  verify_token: "choose-a-verify-token"
  templates:
    invoice: "invoice_notification"
    invoice_with_payment: "invoice_with_payment_details"
    language: "en"

transcription:
  endpoint: "https://api.openai.com/v1/audio/transcriptions"
  api_key: "YOUR_TRANSCRIPTION_API_KEY"
  model: "whisper-1"

server:
  host: "0.0.0.0"
  port: 8080
"#
}
