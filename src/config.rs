//! Configuration for the callscribe pipeline.
//!
//! Configuration sources (highest priority first):
//! 1. Environment variables (credentials, CALLSCRIBE_HOME)
//! 2. Config file (.callscribe/config.yaml)
//! 3. Defaults (~/.callscribe, public API endpoints)
//!
//! Credentials only ever come from the environment; the config file
//! holds tuning that is safe to commit. Config file discovery searches
//! the current directory and parents for .callscribe/config.yaml.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::adapters::helpdesk::PaginationPolicy;
use crate::core::retry::RetryPolicy;
use crate::domain::ResolutionStrategy;

const DEFAULT_WINDOW_START_HOUR: u32 = 4;
const DEFAULT_TRANSCRIPTION_MODEL: &str = "whisper-1";
const DEFAULT_COMPLETION_MODEL: &str = "gpt-4o";
const DEFAULT_SPEECH_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_LOGIN_BASE_URL: &str = "https://login.microsoftonline.com";
const DEFAULT_GRAPH_BASE_URL: &str = "https://graph.microsoft.com/v1.0";

/// Raw config file schema (matches YAML structure)
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigFile {
    /// Helpdesk account's own organization name. Voice comments carry
    /// this name as the caller when the call came through the account's
    /// own line, in which case the counterparty name is used instead.
    pub organization: Option<String>,
    /// UTC hour at which reporting windows start (0-23)
    pub window_start_hour: Option<u32>,
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    #[serde(default)]
    pub pagination: Option<PaginationPolicy>,
    #[serde(default)]
    pub resolution: Option<ResolutionStrategy>,
    #[serde(default)]
    pub models: Option<ModelsConfig>,
    #[serde(default)]
    pub endpoints: Option<EndpointsConfig>,
}

/// Model overrides for the speech service
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ModelsConfig {
    pub transcription: Option<String>,
    pub completion: Option<String>,
}

/// Endpoint overrides, mainly useful against staging tenants
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointsConfig {
    pub helpdesk_base_url: Option<String>,
    pub speech_base_url: Option<String>,
    pub mail_login_base_url: Option<String>,
    pub mail_graph_base_url: Option<String>,
}

/// Fully resolved runtime settings.
///
/// Built once at startup and passed explicitly to everything that
/// needs it. Tests construct this directly with their own endpoints.
#[derive(Debug, Clone)]
pub struct Settings {
    pub helpdesk: HelpdeskSettings,
    pub speech: SpeechSettings,
    pub mail: MailSettings,
    /// Organization name triggering caller substitution (empty disables it)
    pub organization: String,
    /// UTC hour at which reporting windows start
    pub window_start_hour: u32,
    pub retry: RetryPolicy,
    pub pagination: PaginationPolicy,
    pub resolution: ResolutionStrategy,
    /// State directory holding per-run workspaces and the run lock
    pub home: PathBuf,
    /// Path to config file (if found)
    pub config_file: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct HelpdeskSettings {
    pub subdomain: String,
    pub email: String,
    pub api_token: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct SpeechSettings {
    pub api_key: String,
    pub base_url: String,
    pub transcription_model: String,
    pub completion_model: String,
}

#[derive(Debug, Clone)]
pub struct MailSettings {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
    pub login_base_url: String,
    pub graph_base_url: String,
    /// Mailbox the digest is sent from
    pub from: String,
    /// Recipient of the digest
    pub to: String,
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self> {
        let config_path = find_config_file();
        let file = match config_path {
            Some(ref path) => load_config_file(path)?,
            None => ConfigFile::default(),
        };
        Self::from_sources(file, config_path)
    }

    fn from_sources(file: ConfigFile, config_file: Option<PathBuf>) -> Result<Self> {
        let subdomain = require_env("HELPDESK_SUBDOMAIN")?;
        let email = require_env("HELPDESK_EMAIL")?;
        let api_token = require_env("HELPDESK_TOKEN")?;
        let api_key = require_env("OPENAI_API_KEY")?;
        let tenant_id = require_env("MAIL_TENANT_ID")?;
        let client_id = require_env("MAIL_CLIENT_ID")?;
        let client_secret = require_env("MAIL_CLIENT_SECRET")?;
        let from = require_env("DIGEST_FROM")?;
        let to = require_env("DIGEST_TO")?;

        let endpoints = file.endpoints.unwrap_or_default();
        let models = file.models.unwrap_or_default();

        let helpdesk = HelpdeskSettings {
            base_url: endpoints
                .helpdesk_base_url
                .unwrap_or_else(|| default_helpdesk_base_url(&subdomain)),
            subdomain,
            email,
            api_token,
        };

        let speech = SpeechSettings {
            api_key,
            base_url: endpoints
                .speech_base_url
                .unwrap_or_else(|| DEFAULT_SPEECH_BASE_URL.to_string()),
            transcription_model: models
                .transcription
                .unwrap_or_else(|| DEFAULT_TRANSCRIPTION_MODEL.to_string()),
            completion_model: models
                .completion
                .unwrap_or_else(|| DEFAULT_COMPLETION_MODEL.to_string()),
        };

        let mail = MailSettings {
            tenant_id,
            client_id,
            client_secret,
            login_base_url: endpoints
                .mail_login_base_url
                .unwrap_or_else(|| DEFAULT_LOGIN_BASE_URL.to_string()),
            graph_base_url: endpoints
                .mail_graph_base_url
                .unwrap_or_else(|| DEFAULT_GRAPH_BASE_URL.to_string()),
            from,
            to,
        };

        let organization = std::env::var("HELPDESK_ORGANIZATION")
            .ok()
            .or(file.organization)
            .unwrap_or_default();

        let home = match std::env::var("CALLSCRIBE_HOME") {
            Ok(path) => PathBuf::from(path),
            Err(_) => dirs::home_dir()
                .context("Failed to determine home directory")?
                .join(".callscribe"),
        };

        Ok(Settings {
            helpdesk,
            speech,
            mail,
            organization,
            window_start_hour: resolve_window_start_hour(file.window_start_hour)?,
            retry: file.retry.unwrap_or_default(),
            pagination: file.pagination.unwrap_or_default(),
            resolution: file.resolution.unwrap_or_default(),
            home,
            config_file,
        })
    }
}

fn default_helpdesk_base_url(subdomain: &str) -> String {
    format!("https://{}.zendesk.com/api/v2", subdomain)
}

fn resolve_window_start_hour(configured: Option<u32>) -> Result<u32> {
    let hour = configured.unwrap_or(DEFAULT_WINDOW_START_HOUR);
    if hour > 23 {
        anyhow::bail!("window_start_hour must be between 0 and 23, got {}", hour);
    }
    Ok(hour)
}

fn require_env(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("{} environment variable required", name))
}

/// Find config file by searching current directory and parents
fn find_config_file() -> Option<PathBuf> {
    let mut current = std::env::current_dir().ok()?;

    loop {
        let config_path = current.join(".callscribe").join("config.yaml");
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            break;
        }
    }

    None
}

/// Load and parse config file
fn load_config_file(path: &Path) -> Result<ConfigFile> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}
