use serde::Deserialize;
use std::{env, fs, path::PathBuf, time::Duration};

use crate::session::RolePrecedence;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:5000";
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 1;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 500;

/// Client-side configuration for the session layer.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientConfig {
    /// Base URL of the auth API, without the `/api/auth` suffix.
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Extra attempts for the idempotent "current user" call.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default)]
    pub role_precedence: RolePrecedence,
    /// Where the CLI keeps its token store.
    #[serde(default = "default_store_path")]
    pub store_path: PathBuf,
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECONDS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_store_path() -> PathBuf {
    if let Ok(xdg) = env::var("XDG_STATE_HOME") {
        return PathBuf::from(xdg).join("fintrack").join("session.json");
    }
    if let Ok(home) = env::var("HOME") {
        return PathBuf::from(home)
            .join(".local")
            .join("state")
            .join("fintrack")
            .join("session.json");
    }
    PathBuf::from(".fintrack-session.json")
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECONDS,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            role_precedence: RolePrecedence::default(),
            store_path: default_store_path(),
        }
    }
}

impl ClientConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Parse a JSON config document, expanding `${VAR}` references.
    pub fn from_json_str(raw: &str) -> anyhow::Result<Self> {
        let mut cfg: ClientConfig = serde_json::from_str(raw)?;
        cfg.api_base_url = expand_env_vars(&cfg.api_base_url);
        let store_path = expand_env_vars(&cfg.store_path.to_string_lossy());
        cfg.store_path = PathBuf::from(store_path);
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject configurations the client cannot work with.
    pub fn validate(&self) -> anyhow::Result<()> {
        let parsed = url::Url::parse(&self.api_base_url).map_err(|e| {
            anyhow::anyhow!("Invalid api_base_url `{}`: {}", self.api_base_url, e)
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(anyhow::anyhow!(
                "api_base_url must use http or https, got `{}`",
                parsed.scheme()
            ));
        }
        if self.request_timeout_secs == 0 {
            return Err(anyhow::anyhow!("request_timeout_secs must be at least 1"));
        }
        Ok(())
    }
}

/// Find the config file, if any.
///
/// Unlike a required config, a missing file is not an error: the client
/// falls back to defaults.
pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("FINTRACK_CONFIG") {
        return Some(PathBuf::from(p));
    }

    if let Ok(xdg) = env::var("XDG_CONFIG_HOME") {
        let candidate = PathBuf::from(xdg).join("fintrack").join("config.json");
        if candidate.exists() {
            return Some(candidate);
        }
    }

    let candidate = PathBuf::from("fintrack.json");
    if candidate.exists() {
        return Some(candidate);
    }

    None
}

/// Load the client config from disk and environment overrides.
pub fn load_client_config() -> anyhow::Result<ClientConfig> {
    let mut cfg = match resolve_config_path() {
        Some(path) => {
            let raw = fs::read_to_string(&path)
                .map_err(|e| anyhow::anyhow!("Could not read {}: {}", path.display(), e))?;
            ClientConfig::from_json_str(&raw)?
        }
        None => ClientConfig::default(),
    };

    if let Ok(url) = env::var("FINTRACK_API_URL") {
        cfg.api_base_url = url;
        cfg.validate()?;
    }

    Ok(cfg)
}

fn expand_env_vars(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next(); // consume '{'
            let mut name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                name.push(c);
            }
            if let Ok(val) = env::var(&name) {
                out.push_str(&val);
            } else {
                out.push_str("${");
                out.push_str(&name);
                out.push('}');
            }
        } else {
            out.push(ch);
        }
    }

    out
}
