use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use crate::collaborators::types::{
    BUSINESS_EXPANSION, BUSINESS_READINESS_COACHING, SMALL_BUSINESS_STARTUP,
    SUPPORTED_SELF_EMPLOYMENT,
};

pub const DEFAULT_HTTP_PORT: u16 = 3200;
pub const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Orchestrator and server configuration loaded from file and/or environment.
#[derive(Debug, Clone)]
pub struct FlowConfig {
    pub http_port: u16,
    /// Upper bound on every collaborator call.
    pub collaborator_timeout: Duration,
    pub event_capacity: usize,
    /// Service category id -> workspace template name.
    pub workspace_templates: BTreeMap<String, String>,
}

/// Raw TOML file structure for `~/.config/ascend/config.toml`.
#[derive(Debug, Deserialize, Default)]
struct ConfigFile {
    http_port: Option<u16>,
    collaborator_timeout_ms: Option<u64>,
    event_capacity: Option<usize>,
    #[serde(default)]
    workspace_templates: BTreeMap<String, String>,
}

/// Default config file location.
fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("ascend").join("config.toml"))
}

/// Workspace templates for the built-in service categories.
pub fn default_workspace_templates() -> BTreeMap<String, String> {
    [
        (SUPPORTED_SELF_EMPLOYMENT, "vr-self-employment"),
        (SMALL_BUSINESS_STARTUP, "startup-launch"),
        (BUSINESS_EXPANSION, "growth-plan"),
        (BUSINESS_READINESS_COACHING, "readiness-coaching"),
    ]
    .into_iter()
    .map(|(category, template)| (category.to_string(), template.to_string()))
    .collect()
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            http_port: DEFAULT_HTTP_PORT,
            collaborator_timeout: Duration::from_millis(DEFAULT_COLLABORATOR_TIMEOUT_MS),
            event_capacity: DEFAULT_EVENT_CAPACITY,
            workspace_templates: default_workspace_templates(),
        }
    }
}

impl FlowConfig {
    /// Load configuration from file and environment variables.
    ///
    /// Environment variables override file values. A missing file yields
    /// the defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        let path = config_path.cloned().or_else(default_config_path);

        let file_config = match path {
            Some(path) if path.exists() => {
                let content = std::fs::read_to_string(&path)
                    .with_context(|| format!("failed to read config: {}", path.display()))?;
                toml::from_str::<ConfigFile>(&content)
                    .with_context(|| format!("failed to parse config: {}", path.display()))?
            }
            _ => ConfigFile::default(),
        };

        Self::from_file_and_env(file_config)
    }

    /// Template configured for a service category.
    pub fn workspace_template(&self, category: &str) -> Option<&str> {
        self.workspace_templates.get(category).map(String::as_str)
    }

    fn from_file_and_env(file_config: ConfigFile) -> Result<Self> {
        let http_port = env_parse::<u16>("ASCEND_HTTP_PORT")?.or(file_config.http_port);
        let timeout_ms = env_parse::<u64>("ASCEND_COLLABORATOR_TIMEOUT_MS")?
            .or(file_config.collaborator_timeout_ms);
        let event_capacity =
            env_parse::<usize>("ASCEND_EVENT_CAPACITY")?.or(file_config.event_capacity);

        Self::build(
            http_port,
            timeout_ms,
            event_capacity,
            file_config.workspace_templates,
        )
    }

    /// Build config from resolved option values (after file + env merging).
    ///
    /// Configured templates extend and override the built-in ones.
    fn build(
        http_port: Option<u16>,
        collaborator_timeout_ms: Option<u64>,
        event_capacity: Option<usize>,
        workspace_templates: BTreeMap<String, String>,
    ) -> Result<Self> {
        let timeout_ms = collaborator_timeout_ms.unwrap_or(DEFAULT_COLLABORATOR_TIMEOUT_MS);
        if timeout_ms == 0 {
            bail!("collaborator_timeout_ms must be greater than zero");
        }
        let event_capacity = event_capacity.unwrap_or(DEFAULT_EVENT_CAPACITY);
        if event_capacity == 0 {
            bail!("event_capacity must be greater than zero");
        }

        let mut templates = default_workspace_templates();
        for (category, template) in workspace_templates {
            if template.trim().is_empty() {
                bail!("workspace template for '{}' is empty", category);
            }
            templates.insert(category, template);
        }

        Ok(Self {
            http_port: http_port.unwrap_or(DEFAULT_HTTP_PORT),
            collaborator_timeout: Duration::from_millis(timeout_ms),
            event_capacity,
            workspace_templates: templates,
        })
    }
}

fn env_parse<T>(key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("invalid {}='{}': {}", key, raw, e)),
        _ => Ok(None),
    }
}
