use crate::error::{ActionError, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tempfile::NamedTempFile;

pub const DEFAULT_CONFIG_FILE: &str = "jah-actions.yaml";

pub const ENV_API_ROOT: &str = "JAH_API_ROOT";
pub const ENV_AUTH_TOKEN: &str = "JAH_AUTH_TOKEN";
pub const ENV_RELAY_TIMEOUT_SECS: &str = "JAH_RELAY_TIMEOUT_SECS";

// ---------------------------------------------------------------------------
// ConfigWarning / WarnLevel
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigWarning {
    pub level: WarnLevel,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WarnLevel {
    Warning,
    Error,
}

// ---------------------------------------------------------------------------
// DispatcherConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatcherConfig {
    #[serde(default = "default_api_root")]
    pub api_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth_token: Option<String>,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// Upper bound on a single relay. Unset means a hung request stalls the
    /// queue until the connection gives up.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relay_timeout_secs: Option<u64>,
    /// Mirror every action to the local tracing sink.
    #[serde(default = "default_track_locally")]
    pub track_locally: bool,
}

fn default_api_root() -> String {
    "http://localhost:8000".to_string()
}

fn default_user_agent() -> String {
    format!("jah-actions/{}", env!("CARGO_PKG_VERSION"))
}

fn default_track_locally() -> bool {
    true
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            api_root: default_api_root(),
            auth_token: None,
            user_agent: default_user_agent(),
            relay_timeout_secs: None,
            track_locally: default_track_locally(),
        }
    }
}

impl DispatcherConfig {
    /// Load from `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let data = std::fs::read_to_string(path)?;
        let cfg: DispatcherConfig = serde_yaml::from_str(&data)?;
        Ok(cfg)
    }

    /// Write atomically via a tempfile in the target directory.
    pub fn save(&self, path: &Path) -> Result<()> {
        let data = serde_yaml::to_string(self)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(data.as_bytes())?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Apply `JAH_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_from(|key| std::env::var(key).ok())
    }

    pub fn apply_env_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(ENV_API_ROOT) {
            self.api_root = root;
        }
        if let Some(token) = lookup(ENV_AUTH_TOKEN) {
            self.auth_token = Some(token).filter(|t| !t.is_empty());
        }
        if let Some(secs) = lookup(ENV_RELAY_TIMEOUT_SECS) {
            let secs = secs.trim();
            self.relay_timeout_secs = if secs.is_empty() {
                None
            } else {
                Some(secs.parse().map_err(|_| {
                    ActionError::Config(format!(
                        "{ENV_RELAY_TIMEOUT_SECS} must be an integer, got '{secs}'"
                    ))
                })?)
            };
        }
        Ok(())
    }

    pub fn relay_timeout(&self) -> Option<Duration> {
        self.relay_timeout_secs
            .filter(|&s| s > 0)
            .map(Duration::from_secs)
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    pub fn validate(&self) -> Vec<ConfigWarning> {
        let mut warnings = Vec::new();
        let root = self.api_root.trim();

        if root.is_empty() {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "api_root is empty".to_string(),
            });
        } else if !(root.starts_with("http://") || root.starts_with("https://")) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: format!("api_root '{root}' must start with http:// or https://"),
            });
        } else if root.starts_with("http://") && !is_local(root) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: format!("api_root '{root}' is not using https"),
            });
        }

        if self.relay_timeout_secs == Some(0) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Error,
                message: "relay_timeout_secs must be greater than 0 (omit it to disable)"
                    .to_string(),
            });
        }

        if self.auth_token.as_deref().map_or(true, str::is_empty) {
            warnings.push(ConfigWarning {
                level: WarnLevel::Warning,
                message: "no auth_token set; the action endpoint may reject requests"
                    .to_string(),
            });
        }

        warnings
    }
}

fn is_local(root: &str) -> bool {
    let host = root
        .trim_start_matches("http://")
        .split(['/', ':'])
        .next()
        .unwrap_or("");
    matches!(host, "localhost" | "127.0.0.1")
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
