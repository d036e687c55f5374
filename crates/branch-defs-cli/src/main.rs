mod config;

use anyhow::Result;
use branch_defs::{
    BranchCreation, DefinitionLoader, RemoteBranchRepository, RepositoryCoordinates, SyncReport,
    Synchronizer,
};
use branch_defs_github::{GitHubClient, HttpSourceFetcher};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;

const LOG_ENV: &str = "BRANCH_DEF_SYNC_LOG";

#[derive(Parser, Debug)]
#[command(name = "branch-def-sync")]
#[command(about = "Create and protect GitHub branches from a declarative definition")]
struct Cli {
    /// Branch definition: a web link, a file path, or the JSON/YAML itself
    #[arg(long)]
    branches: String,

    /// Target repository as owner/repository
    #[arg(long)]
    repository: String,

    /// Base branch for entries that do not name one
    #[arg(long)]
    default_base_branch: Option<String>,

    /// GitHub API base URL
    #[arg(long)]
    api_url: Option<String>,

    /// GitHub token
    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true)]
    token: Option<String>,
}

/// Effective settings after applying flags over the config file.
#[derive(Debug, PartialEq, Eq)]
struct Settings {
    default_base_branch: String,
    api_base_url: Option<String>,
}

impl Settings {
    fn resolve(cli: &Cli, config: AppConfig) -> Self {
        Self {
            default_base_branch: cli
                .default_base_branch
                .clone()
                .unwrap_or(config.default_base_branch),
            api_base_url: cli.api_url.clone().or(config.api_base_url),
        }
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn summarize(report: &SyncReport) -> String {
    let existing = report
        .branches
        .iter()
        .filter(|b| b.creation == BranchCreation::AlreadyExists)
        .count();

    format!(
        "Managed {} branches ({} created, {} already present, {} protected)",
        report.branches.len(),
        report.created(),
        existing,
        report.protected()
    )
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    let settings = Settings::resolve(&cli, config::load_config());

    let token = cli.token.clone();
    let api_base_url = settings.api_base_url.clone();
    let synchronizer = Synchronizer::new(
        DefinitionLoader::new(HttpSourceFetcher::new()),
        move |coords: &RepositoryCoordinates| {
            RemoteBranchRepository::new(
                &coords.owner,
                &coords.repo,
                GitHubClient::new(token.clone(), api_base_url.clone()),
            )
        },
    );

    match synchronizer
        .run(&cli.branches, &cli.repository, &settings.default_base_branch)
        .await
    {
        Ok(report) => {
            info!("{}", summarize(&report));
            Ok(())
        }
        Err(e) => anyhow::bail!("{e}"),
    }
}
