use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::config::{self, AppConfig};
use crate::migrate::crosslink::{self, ReferenceRewriter};
use crate::migrate::export::{self, JiraExporter};
use crate::migrate::import::{ImportOptions, Importer};
use crate::migrate::notify;
use crate::providers::github::GitHubClient;
use crate::providers::jira::JiraClient;
use crate::store::mapping::IssueMapping;
use crate::store::records::RecordStore;
use crate::store::status::StatusStore;
use crate::store::{MAPPING_FILE, STATUS_FILE};
use crate::util::keys::sort_keys;

/// Move Jira (or old GitHub) tickets into a GitHub repository.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the TOML config file [default: ~/.tracker-bridge/config.toml]
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Directory holding exported records and migration state
    #[arg(long, global = true, default_value = "data")]
    pub data_dir: PathBuf,

    /// Log at debug level
    #[arg(short, long, global = true)]
    pub debug: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Export the unresolved tickets of a Jira project
    ExportJira {
        /// Jira project key
        project: String,
    },

    /// Export open issues of a GitHub repository carrying the given labels
    ExportGithub {
        /// owner/repo
        repo: String,
        /// Comma separated labels
        labels: String,
    },

    /// Import exported records into a GitHub repository
    Import {
        /// owner/repo
        repo: String,
        /// Submit at most this many new imports; 0 only waits on earlier ones
        #[arg(long)]
        limit: Option<usize>,
        /// Only this key (repeatable)
        #[arg(long = "issue")]
        issues: Vec<String>,
        /// Resubmit keys whose earlier import failed
        #[arg(long)]
        retry_failed: bool,
        /// Seconds to wait between polling sweeps
        #[arg(long, default_value_t = 1)]
        poll_interval: u64,
    },

    /// Rewrite ticket references in migrated issues into links
    UpdateLinks {
        #[arg(long = "issue")]
        issues: Vec<String>,
    },

    /// Comment on each Jira ticket with the url of its GitHub issue
    AddJiraLinks {
        #[arg(long = "issue")]
        issues: Vec<String>,
    },

    /// Append the Jira key to each migrated issue title
    AddJiraIds {
        #[arg(long = "issue")]
        issues: Vec<String>,
    },

    /// Comment on each old GitHub issue with the url of its replacement
    AddOldIssueLinks {
        /// owner/repo the issues were exported from
        old_repo: String,
        #[arg(long = "issue")]
        issues: Vec<String>,
    },

    /// Print every entry of the import status store
    DumpStatus,
}

/// Explicit `--issue` keys win; otherwise fall back to the command's default set.
fn select_keys(
    explicit: Vec<String>,
    default: impl FnOnce() -> Result<Vec<String>>,
) -> Result<Vec<String>> {
    if explicit.is_empty() {
        default()
    } else {
        Ok(explicit)
    }
}

fn mapping_keys_by_age(mapping: &IssueMapping) -> Vec<String> {
    let mut keys = mapping.keys();
    sort_keys(&mut keys);
    keys
}

pub async fn run(cli: Cli) -> Result<()> {
    let data_dir = cli.data_dir;

    if cli.command == Command::DumpStatus {
        return handle_dump_status(&data_dir);
    }

    let config_path = cli.config.unwrap_or_else(config::default_config_path);
    let config = config::load_config(&config_path)?;

    match cli.command {
        Command::ExportJira { project } => handle_export_jira(&config, &data_dir, &project).await,
        Command::ExportGithub { repo, labels } => {
            handle_export_github(&config, &data_dir, &repo, &labels).await
        }
        Command::Import {
            repo,
            limit,
            issues,
            retry_failed,
            poll_interval,
        } => {
            let options = ImportOptions {
                keys: (!issues.is_empty()).then_some(issues),
                limit,
                retry_failed,
                poll_interval: Duration::from_secs(poll_interval),
            };
            handle_import(&config, &data_dir, &repo, &options).await
        }
        Command::UpdateLinks { issues } => handle_update_links(&config, &data_dir, issues).await,
        Command::AddJiraLinks { issues } => handle_add_jira_links(&config, &data_dir, issues).await,
        Command::AddJiraIds { issues } => handle_add_jira_ids(&config, &data_dir, issues).await,
        Command::AddOldIssueLinks { old_repo, issues } => {
            handle_add_old_issue_links(&config, &data_dir, &old_repo, issues).await
        }
        Command::DumpStatus => handle_dump_status(&data_dir),
    }
}

async fn handle_export_jira(config: &AppConfig, data_dir: &Path, project: &str) -> Result<()> {
    let jira = JiraClient::new(&config.jira);
    let records = RecordStore::new(data_dir);
    let exporter = JiraExporter::new(
        &jira,
        &records,
        &config.users,
        &config.export.omit_reporters,
    );
    let written = exporter
        .export_project(project, config.export.workers)
        .await
        .with_context(|| format!("Failed to export project {project}"))?;
    println!("Exported {written} tickets to {}", data_dir.display());
    Ok(())
}

async fn handle_export_github(
    config: &AppConfig,
    data_dir: &Path,
    repo: &str,
    labels: &str,
) -> Result<()> {
    let github = GitHubClient::new(&config.github);
    let records = RecordStore::new(data_dir);
    let written = export::export_github(
        &github,
        repo,
        labels,
        &records,
        &config.export.omit_reporters,
    )
    .await?;
    println!("Exported {written} issues to {}", data_dir.display());
    Ok(())
}

async fn handle_import(
    config: &AppConfig,
    data_dir: &Path,
    repo: &str,
    options: &ImportOptions,
) -> Result<()> {
    let github = GitHubClient::new(&config.github);
    let records = RecordStore::new(data_dir);
    let mut status = StatusStore::open(data_dir.join(STATUS_FILE))?;
    tracing::debug!(entries = status.len(), "loaded status store");
    let mapping_path = data_dir.join(MAPPING_FILE);
    let mapping = IssueMapping::load_or_default(&mapping_path)?;

    let mut importer = Importer::new(
        &github,
        &records,
        &mut status,
        &config.labels,
        repo,
        &config.github.api_url,
    );
    let mapping = importer.run(options, mapping).await?;
    mapping.save(&mapping_path)?;
    println!("{} tickets mapped to issues in {repo}", mapping.len());
    Ok(())
}

async fn handle_update_links(
    config: &AppConfig,
    data_dir: &Path,
    issues: Vec<String>,
) -> Result<()> {
    let github = GitHubClient::new(&config.github);
    let records = RecordStore::new(data_dir);
    let mapping = IssueMapping::load(&data_dir.join(MAPPING_FILE))?;
    let rewriter = ReferenceRewriter::new(
        &config.jira.project_keys,
        &mapping,
        &config.github.web_url,
        &config.jira.url,
    )?;
    let keys = select_keys(issues, || records.keys())?;
    crosslink::update_links(&github, &records, &rewriter, &mapping, &keys).await
}

async fn handle_add_jira_links(
    config: &AppConfig,
    data_dir: &Path,
    issues: Vec<String>,
) -> Result<()> {
    let jira = JiraClient::new(&config.jira);
    let mapping = IssueMapping::load(&data_dir.join(MAPPING_FILE))?;
    let keys = select_keys(issues, || Ok(mapping_keys_by_age(&mapping)))?;
    notify::announce_in_source(&jira, &mapping, &config.github.web_url, &keys).await
}

async fn handle_add_jira_ids(
    config: &AppConfig,
    data_dir: &Path,
    issues: Vec<String>,
) -> Result<()> {
    let github = GitHubClient::new(&config.github);
    let records = RecordStore::new(data_dir);
    let mapping = IssueMapping::load(&data_dir.join(MAPPING_FILE))?;
    let keys = select_keys(issues, || Ok(mapping_keys_by_age(&mapping)))?;
    notify::restore_titles(&github, &records, &mapping, &keys).await
}

async fn handle_add_old_issue_links(
    config: &AppConfig,
    data_dir: &Path,
    old_repo: &str,
    issues: Vec<String>,
) -> Result<()> {
    let github = GitHubClient::new(&config.github);
    let mapping = IssueMapping::load(&data_dir.join(MAPPING_FILE))?;
    let keys = select_keys(issues, || Ok(mapping.keys()))?;
    notify::announce_in_old_repo(&github, &mapping, &config.github.web_url, old_repo, &keys)
        .await
}

fn handle_dump_status(data_dir: &Path) -> Result<()> {
    let status = StatusStore::open(data_dir.join(STATUS_FILE))?;
    for key in status.keys() {
        if let Some(entry) = status.get(&key) {
            println!("{key}: {entry}");
        }
    }
    Ok(())
}
