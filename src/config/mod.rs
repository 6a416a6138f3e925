//! Configuration loaded from `config.toml`.
//!
//! Resolution order: `VOXTUTOR_CONFIG_DIR` env → `~/.voxtutor/config.toml`.
//! Missing credentials are fatal only for what they gate: the server starts
//! without an SMTP password, but summary dispatch then fails (and the caller
//! hears an apology). Structurally invalid values fail at process start,
//! never mid-call.

use anyhow::{Context, Result};
use directories::UserDirs;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tokio::fs;

// ── Top-level config ──────────────────────────────────────────────

/// Top-level VoxTutor configuration, loaded from `config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to config.toml - computed, not serialized
    #[serde(skip)]
    pub config_path: PathBuf,
    /// API key for the completion service. Overridden by `VOXTUTOR_API_KEY`
    /// or `OPENAI_API_KEY` env vars.
    pub api_key: Option<String>,
    /// Base URL override for the completion API (any OpenAI-compatible endpoint).
    pub api_url: Option<String>,
    /// Model routed through the completion service.
    #[serde(default = "default_model")]
    pub model: String,
    /// Completion temperature (0.0–2.0). Default: `0.7`.
    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Webhook gateway configuration (`[gateway]`).
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Transcript email delivery configuration (`[summary]`).
    #[serde(default)]
    pub summary: SummaryConfig,
}

fn default_model() -> String {
    "gpt-4o-mini".into()
}

fn default_temperature() -> f64 {
    0.7
}

// ── Gateway ──────────────────────────────────────────────────────

/// Webhook gateway configuration (`[gateway]` section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Gateway port (default: 5000)
    #[serde(default = "default_gateway_port")]
    pub port: u16,
    /// Gateway host (default: 0.0.0.0 — the telephony provider calls in from outside)
    #[serde(default = "default_gateway_host")]
    pub host: String,
}

fn default_gateway_port() -> u16 {
    5000
}

fn default_gateway_host() -> String {
    "0.0.0.0".into()
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: default_gateway_port(),
            host: default_gateway_host(),
        }
    }
}

// ── Summary delivery ─────────────────────────────────────────────

/// Transcript email delivery configuration (`[summary]` section).
///
/// The recipient is fixed in configuration; it is not collected from the
/// caller during the call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryConfig {
    /// Offer the transcript email at the end of a session (default: true).
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// SMTP relay hostname.
    pub smtp_host: Option<String>,
    /// SMTP submission port (default: 587, STARTTLS).
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    /// SMTP username.
    pub smtp_username: Option<String>,
    /// SMTP password. Overridden by the `SMTP_PASSWORD` env var.
    pub smtp_password: Option<String>,
    /// Sender address, e.g. `VoxTutor <tutor@example.com>`.
    pub from_address: Option<String>,
    /// Fixed recipient for session transcripts. Overridden by `SUMMARY_RECIPIENT`.
    pub recipient: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            smtp_host: None,
            smtp_port: default_smtp_port(),
            smtp_username: None,
            smtp_password: None,
            from_address: None,
            recipient: None,
        }
    }
}

// ── Config impl ──────────────────────────────────────────────────

impl Default for Config {
    fn default() -> Self {
        Self {
            config_path: default_config_dir()
                .map(|dir| dir.join("config.toml"))
                .unwrap_or_else(|_| PathBuf::from("config.toml")),
            api_key: None,
            api_url: None,
            model: default_model(),
            temperature: default_temperature(),
            gateway: GatewayConfig::default(),
            summary: SummaryConfig::default(),
        }
    }
}

fn default_config_dir() -> Result<PathBuf> {
    if let Ok(custom) = std::env::var("VOXTUTOR_CONFIG_DIR") {
        let custom = custom.trim();
        if !custom.is_empty() {
            return Ok(PathBuf::from(custom));
        }
    }

    let home = UserDirs::new()
        .map(|u| u.home_dir().to_path_buf())
        .context("Could not find home directory")?;
    Ok(home.join(".voxtutor"))
}

impl Config {
    pub async fn load_or_init() -> Result<Self> {
        let config_dir = default_config_dir()?;
        let config_path = config_dir.join("config.toml");

        fs::create_dir_all(&config_dir).await.with_context(|| {
            format!("Failed to create config directory: {}", config_dir.display())
        })?;

        let mut config = if config_path.exists() {
            let contents = fs::read_to_string(&config_path)
                .await
                .context("Failed to read config file")?;
            let mut config: Config =
                toml::from_str(&contents).context("Failed to parse config file")?;
            config.config_path = config_path.clone();
            config
        } else {
            let mut config = Config::default();
            config.config_path = config_path.clone();
            config.save().await?;

            // Restrict permissions on the newly created file (it may hold credentials).
            #[cfg(unix)]
            {
                use std::{fs::Permissions, os::unix::fs::PermissionsExt};
                let _ = fs::set_permissions(&config_path, Permissions::from_mode(0o600)).await;
            }

            config
        };

        config.apply_env_overrides();
        config.validate()?;
        tracing::info!(path = %config.config_path.display(), "Config loaded");
        Ok(config)
    }

    pub async fn save(&self) -> Result<()> {
        let serialized = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&self.config_path, serialized)
            .await
            .with_context(|| format!("Failed to write config file: {}", self.config_path.display()))
    }

    /// Apply environment variable overrides to config.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) =
            std::env::var("VOXTUTOR_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
        {
            if !key.is_empty() {
                self.api_key = Some(key);
            }
        }

        if let Ok(model) = std::env::var("VOXTUTOR_MODEL") {
            if !model.is_empty() {
                self.model = model;
            }
        }

        if let Ok(port_str) =
            std::env::var("VOXTUTOR_GATEWAY_PORT").or_else(|_| std::env::var("PORT"))
        {
            if let Ok(port) = port_str.parse::<u16>() {
                self.gateway.port = port;
            }
        }

        if let Ok(host) = std::env::var("VOXTUTOR_GATEWAY_HOST").or_else(|_| std::env::var("HOST"))
        {
            if !host.is_empty() {
                self.gateway.host = host;
            }
        }

        if let Ok(password) = std::env::var("SMTP_PASSWORD") {
            if !password.is_empty() {
                self.summary.smtp_password = Some(password);
            }
        }

        if let Ok(recipient) = std::env::var("SUMMARY_RECIPIENT") {
            if !recipient.is_empty() {
                self.summary.recipient = Some(recipient);
            }
        }
    }

    /// Validate configuration values that would cause runtime failures.
    ///
    /// Called after TOML deserialization and env-override application so the
    /// process fails at startup instead of at an arbitrary point mid-call.
    pub fn validate(&self) -> Result<()> {
        if self.gateway.host.trim().is_empty() {
            anyhow::bail!("gateway.host must not be empty");
        }
        if self.model.trim().is_empty() {
            anyhow::bail!("model must not be empty");
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            anyhow::bail!("temperature must be between 0.0 and 2.0");
        }
        Ok(())
    }

    /// Whether summary delivery has every setting it needs.
    pub fn summary_configured(&self) -> bool {
        let set = |v: &Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
        self.summary.enabled
            && set(&self.summary.smtp_host)
            && set(&self.summary.smtp_username)
            && set(&self.summary.smtp_password)
            && set(&self.summary.from_address)
            && set(&self.summary.recipient)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.gateway.port, 5000);
        assert_eq!(config.temperature, 0.7);
        assert!(!config.summary_configured());
    }

    #[test]
    fn toml_round_trip_preserves_sections() {
        let mut config = Config::default();
        config.api_key = Some("key".into());
        config.summary.smtp_host = Some("smtp.example.com".into());

        let serialized = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&serialized).unwrap();
        assert_eq!(parsed.api_key.as_deref(), Some("key"));
        assert_eq!(parsed.summary.smtp_host.as_deref(), Some("smtp.example.com"));
        assert_eq!(parsed.summary.smtp_port, 587);
    }

    #[test]
    fn partial_toml_fills_defaults() {
        let parsed: Config = toml::from_str("api_key = \"abc\"\n").unwrap();
        assert_eq!(parsed.model, default_model());
        assert_eq!(parsed.gateway.host, "0.0.0.0");
        assert!(parsed.summary.enabled);
    }

    #[test]
    fn out_of_range_temperature_fails_validation() {
        let mut config = Config::default();
        config.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn empty_host_fails_validation() {
        let mut config = Config::default();
        config.gateway.host = "  ".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn summary_configured_requires_every_field() {
        let mut config = Config::default();
        config.summary.smtp_host = Some("smtp.example.com".into());
        config.summary.smtp_username = Some("user".into());
        config.summary.smtp_password = Some("pass".into());
        config.summary.from_address = Some("tutor@example.com".into());
        assert!(!config.summary_configured(), "recipient still missing");

        config.summary.recipient = Some("student@example.com".into());
        assert!(config.summary_configured());

        config.summary.enabled = false;
        assert!(!config.summary_configured());
    }

    #[tokio::test]
    async fn load_or_init_creates_the_file_then_reloads_saved_edits() {
        let dir = tempfile::tempdir().unwrap();
        std::env::set_var("VOXTUTOR_CONFIG_DIR", dir.path());

        let created = Config::load_or_init().await.unwrap();
        assert!(created.config_path.exists(), "first run writes a default file");
        assert_eq!(created.config_path, dir.path().join("config.toml"));

        // Edit a field no env var overrides, save, and load again.
        let mut edited = created.clone();
        edited.temperature = 1.3;
        edited.save().await.unwrap();

        let reloaded = Config::load_or_init().await.unwrap();
        assert_eq!(reloaded.temperature, 1.3);

        std::env::remove_var("VOXTUTOR_CONFIG_DIR");
    }

    #[test]
    fn env_overrides_apply_when_set() {
        // One test covers every override so parallel tests never race on env.
        std::env::set_var("VOXTUTOR_MODEL", "gpt-4.1");
        std::env::set_var("VOXTUTOR_GATEWAY_PORT", "8080");
        std::env::set_var("SMTP_PASSWORD", "secret");

        let mut config = Config::default();
        config.apply_env_overrides();

        assert_eq!(config.model, "gpt-4.1");
        assert_eq!(config.gateway.port, 8080);
        assert_eq!(config.summary.smtp_password.as_deref(), Some("secret"));

        std::env::remove_var("VOXTUTOR_MODEL");
        std::env::remove_var("VOXTUTOR_GATEWAY_PORT");
        std::env::remove_var("SMTP_PASSWORD");
    }
}
