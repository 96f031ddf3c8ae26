use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::errors::AppError;
use crate::models::approval::DesiredApprovals;
use crate::models::project::Environment;

pub const DEFAULT_BASE_URL: &str = "https://app.launchdarkly.com/api/v2";
pub const DEFAULT_COLOR: &str = "7B42BC";

/// Process-wide settings, read once at startup before any network call.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: String,
    pub base_url: String,
    /// ServiceNow template sys_id used when approval settings name the
    /// `servicenow` service kind without their own template.
    pub servicenow_template_id: Option<String>,
    pub log_dir: PathBuf,
}

pub fn load() -> Result<Settings, AppError> {
    dotenvy::dotenv().ok();
    from_lookup(|key| std::env::var(key).ok())
}

/// Builds settings from an arbitrary variable lookup. Empty values count as unset.
pub fn from_lookup<F>(lookup: F) -> Result<Settings, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

    let api_key = get("LD_API_KEY").ok_or_else(|| {
        AppError::Auth("LD_API_KEY not found in environment variables".to_string())
    })?;

    Ok(Settings {
        api_key,
        base_url: get("LD_BASE_URL")
            .unwrap_or_else(|| DEFAULT_BASE_URL.into())
            .trim_end_matches('/')
            .to_string(),
        servicenow_template_id: get("SERVICENOW_TEMPLATE_SYS_ID"),
        log_dir: get("LD_LOG_DIR").map(PathBuf::from).unwrap_or_else(|| "logs".into()),
    })
}

// ── Provisioning document ─────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct ProvisionConfig {
    pub project: ProjectSpec,
    #[serde(default)]
    pub environments: Vec<EnvironmentSpec>,
    #[serde(default)]
    pub defaults: Defaults,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectSpec {
    pub key: String,
    pub name: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EnvironmentSpec {
    pub key: String,
    pub name: String,
    pub color: Option<String>,
    pub tags: Option<Vec<String>>,
    pub confirm_changes: Option<bool>,
    pub require_comments: Option<bool>,
    pub default_ttl: Option<u32>,
    pub secure_mode: Option<bool>,
    pub default_track_events: Option<bool>,
    /// Approval settings applied right after the environment is configured.
    pub approvals: Option<DesiredApprovals>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Defaults {
    pub confirm_changes: bool,
    pub require_comments: bool,
    pub tags: Vec<String>,
    pub remove_default_test_env: bool,
    pub color: Option<String>,
    pub default_ttl: u32,
    pub secure_mode: bool,
    pub default_track_events: bool,
}

impl ProvisionConfig {
    pub fn from_yaml_str(raw: &str) -> Result<Self, AppError> {
        let cfg: ProvisionConfig = serde_yaml::from_str(raw)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_yaml_str(&raw)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.project.name.trim().is_empty() {
            return Err(AppError::Config("project.name must not be empty".into()));
        }
        validate_key("project.key", &self.project.key)?;

        let mut seen = HashSet::new();
        for env in &self.environments {
            validate_key("environments[].key", &env.key)?;
            if env.name.trim().is_empty() {
                return Err(AppError::Config(format!(
                    "environment '{}' has an empty name",
                    env.key
                )));
            }
            if !seen.insert(env.key.to_lowercase()) {
                return Err(AppError::Config(format!(
                    "environment key '{}' is listed more than once",
                    env.key
                )));
            }
        }
        Ok(())
    }
}

fn validate_key(field: &str, key: &str) -> Result<(), AppError> {
    if key.is_empty() {
        return Err(AppError::Config(format!("{} must not be empty", field)));
    }
    if !key
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
    {
        return Err(AppError::Config(format!(
            "{} '{}' may only contain letters, digits, '-', '_' and '.'",
            field, key
        )));
    }
    Ok(())
}

impl EnvironmentSpec {
    /// Fills unset fields from `defaults`. The key is lowercased, the display
    /// name keeps its casing.
    pub fn resolve(&self, defaults: &Defaults) -> Environment {
        Environment {
            key: self.key.to_lowercase(),
            name: self.name.clone(),
            color: self
                .color
                .clone()
                .or_else(|| defaults.color.clone())
                .unwrap_or_else(|| DEFAULT_COLOR.to_string()),
            tags: self.tags.clone().unwrap_or_else(|| defaults.tags.clone()),
            confirm_changes: self.confirm_changes.unwrap_or(defaults.confirm_changes),
            require_comments: self.require_comments.unwrap_or(defaults.require_comments),
            default_ttl: self.default_ttl.unwrap_or(defaults.default_ttl),
            secure_mode: self.secure_mode.unwrap_or(defaults.secure_mode),
            default_track_events: self
                .default_track_events
                .unwrap_or(defaults.default_track_events),
            approval_settings: None,
            resource_approval_settings: None,
        }
    }
}
