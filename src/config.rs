use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
pub struct AppConfig {
    pub jira: JiraConfig,
    pub github: GitHubConfig,
    #[serde(default)]
    pub labels: LabelConfig,
    /// Jira user name -> GitHub login.
    #[serde(default)]
    pub users: HashMap<String, String>,
    #[serde(default)]
    pub export: ExportConfig,
}

#[derive(Debug, Deserialize)]
pub struct JiraConfig {
    pub url: String,
    pub username: String,
    pub api_token: String,
    /// Project prefixes recognised when rewriting references, e.g. `["PROJ", "OPS"]`.
    #[serde(default)]
    pub project_keys: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct GitHubConfig {
    pub token: String,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_web_url")]
    pub web_url: String,
}

#[derive(Debug, Deserialize)]
pub struct LabelConfig {
    #[serde(default = "default_triage_status")]
    pub triage_status: String,
    #[serde(default)]
    pub priority: HashMap<String, String>,
    #[serde(default, rename = "type")]
    pub issue_type: HashMap<String, String>,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            triage_status: default_triage_status(),
            priority: HashMap::new(),
            issue_type: HashMap::new(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ExportConfig {
    #[serde(default = "default_workers")]
    pub workers: usize,
    /// Reporters who are not credited with a "(Reported by ...)" line.
    #[serde(default)]
    pub omit_reporters: Vec<String>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            omit_reporters: Vec::new(),
        }
    }
}

fn default_api_url() -> String {
    "https://api.github.com".into()
}

fn default_web_url() -> String {
    "https://github.com".into()
}

fn default_triage_status() -> String {
    "Pending Triage".into()
}

fn default_workers() -> usize {
    10
}

pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tracker-bridge")
        .join("config.toml")
}

pub fn load_config(path: &Path) -> Result<AppConfig> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config from {}", path.display()))?;
    parse_config(&contents).with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn parse_config(contents: &str) -> Result<AppConfig> {
    let mut config: AppConfig = toml::from_str(contents)?;
    config.jira.url = config.jira.url.trim_end_matches('/').to_string();
    config.github.api_url = config.github.api_url.trim_end_matches('/').to_string();
    config.github.web_url = config.github.web_url.trim_end_matches('/').to_string();
    Ok(config)
}
