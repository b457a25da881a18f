use crate::config::{Config, DEFAULT_CONFIG_PATH};
use crate::github::{resolve_token, GitHubClient};
use crate::store::RecordStore;
use anyhow::{Context, Result};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "contributor-network")]
#[command(about = "Fetch GitHub contributor data and build the contributor network page")]
#[command(version)]
pub struct Cli {
    #[clap(flatten)]
    pub common: CommonArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Clone)]
pub struct CommonArgs {
    #[arg(short, long = "config", help = "Path to config.toml", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    #[arg(short = 'd', long, help = "Directory for fetched JSON records and generated tables", default_value = "assets/data")]
    pub data_dir: PathBuf,

    #[arg(long, env = "GITHUB_TOKEN", hide_env_values = true, help = "GitHub token (falls back to ~/.netrc)")]
    pub github_token: Option<String>,

    #[arg(short, long, action = ArgAction::Count, help = "Increase log verbosity (-v info, -vv debug)")]
    pub verbose: u8,
}

impl CommonArgs {
    pub fn load_config(&self) -> Result<Config> {
        Config::from_toml(&self.config)
            .with_context(|| format!("Failed to load {}", self.config.display()))
    }

    pub fn store(&self) -> Result<RecordStore> {
        RecordStore::new(&self.data_dir)
            .with_context(|| format!("Failed to open data directory {}", self.data_dir.display()))
    }

    pub fn client(&self) -> Result<GitHubClient> {
        let token = resolve_token(self.github_token.as_deref());
        GitHubClient::with_token(token).context("Failed to create GitHub client")
    }
}

#[derive(Args, Clone)]
pub struct FetchArgs {
    #[arg(long, help = "Include all contributor groups when fetching link data")]
    pub all_contributors: bool,

    #[arg(long, help = "Discover which organizations have forked each repo (extra API calls)")]
    pub fetch_forking_orgs: bool,

    #[arg(long, help = "Also fetch links for contributors not listed in config.toml")]
    pub community: bool,

    #[arg(long, help = "Maximum unlisted contributors per repository", default_value_t = crate::fetch::DEFAULT_MAX_COMMUNITY)]
    pub max_community: usize,

    #[arg(long, help = "Hide the progress bar")]
    pub no_progress: bool,
}

#[derive(Args, Clone)]
pub struct TableArgs {
    #[arg(long, help = "How far back a last commit still counts as recent (e.g. 90d, 6months)", default_value = "90days")]
    pub recent_window: String,

    #[arg(long, help = "Reference time for recency (RFC3339 or YYYY-MM-DD), defaults to now")]
    pub as_of: Option<String>,
}

#[derive(Args, Clone)]
pub struct SiteArgs {
    #[arg(help = "Output directory for the assembled site", default_value = crate::site::DEFAULT_DESTINATION)]
    pub destination: PathBuf,

    #[arg(long, help = "Directory holding index.html, js/ and assets/", default_value = crate::site::DEFAULT_SITE_ROOT)]
    pub site_root: PathBuf,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ContributorScope {
    Core,
    All,
}

#[derive(Subcommand)]
pub enum DiscoverCommands {
    /// Find contributors of tracked repositories who are not in config.toml
    FromRepositories {
        #[arg(long, help = "Minimum contributions to include a contributor", default_value_t = 1)]
        min_contributions: u64,

        #[arg(long, help = "Interactively classify each new contributor as core or community")]
        classify: bool,
    },
    /// Find repositories that listed contributors work on but are not tracked
    FromContributors {
        #[arg(long = "type", value_enum, help = "Which contributors to scan", default_value_t = ContributorScope::Core)]
        scope: ContributorScope,

        #[arg(long, help = "Minimum contributors to include a repo", default_value_t = crate::discover::DEFAULT_MIN_CONTRIBUTORS)]
        min_contributors: usize,

        #[arg(long, help = "Maximum number of repos to output", default_value_t = crate::discover::DEFAULT_REPO_LIMIT)]
        limit: usize,
    },
}

#[derive(Subcommand)]
pub enum Commands {
    /// Fetch data, generate tables and assemble the static site
    Build {
        #[clap(flatten)]
        site: SiteArgs,

        #[clap(flatten)]
        fetch: FetchArgs,

        #[clap(flatten)]
        tables: TableArgs,

        #[arg(long, help = "Skip the GitHub fetch step and reuse existing records")]
        skip_fetch: bool,

        #[arg(long, help = "Only regenerate the tables from existing records")]
        csvs_only: bool,
    },
    /// Fetch repository and contributor records from GitHub
    Fetch {
        #[clap(flatten)]
        fetch: FetchArgs,
    },
    /// Regenerate CSV tables and config.json from fetched records
    Csvs {
        #[clap(flatten)]
        tables: TableArgs,
    },
    /// Copy the front end and generated data into an output directory
    Assemble {
        #[clap(flatten)]
        site: SiteArgs,
    },
    /// List contributors from config.toml
    ListContributors,
    /// Discover contributors or repositories from GitHub
    Discover {
        #[command(subcommand)]
        command: DiscoverCommands,
    },
    /// Generate a config.toml from a list of repos or contributors
    Bootstrap {
        #[arg(help = "Repos file (one owner/repo per line) or contributors CSV (username,name)")]
        infile: PathBuf,

        #[arg(short, long, help = "Path for the generated config.toml", default_value = DEFAULT_CONFIG_PATH)]
        output: PathBuf,

        #[arg(long, alias = "org", help = "Organization name used for the page title", default_value = crate::bootstrap::DEFAULT_ORGANIZATION)]
        organization: String,
    },
}

impl Cli {
    pub fn parse() -> Self {
        <Self as Parser>::parse()
    }

    pub fn execute(self) -> Result<()> {
        match self.command {
            Commands::Build {
                site,
                fetch,
                tables,
                skip_fetch,
                csvs_only,
            } => crate::build::exec(&self.common, &site, &fetch, &tables, skip_fetch, csvs_only),
            Commands::Fetch { fetch } => crate::fetch::exec(&self.common, &fetch).map(|_| ()),
            Commands::Csvs { tables } => crate::aggregate::exec(&self.common, &tables),
            Commands::Assemble { site } => crate::site::exec(&self.common, &site),
            Commands::ListContributors => crate::list::exec(&self.common),
            Commands::Discover { command } => match command {
                DiscoverCommands::FromRepositories {
                    min_contributions,
                    classify,
                } => crate::discover::exec_from_repositories(&self.common, min_contributions, classify),
                DiscoverCommands::FromContributors {
                    scope,
                    min_contributors,
                    limit,
                } => crate::discover::exec_from_contributors(
                    &self.common,
                    scope == ContributorScope::All,
                    min_contributors,
                    limit,
                ),
            },
            Commands::Bootstrap {
                infile,
                output,
                organization,
            } => crate::bootstrap::exec(&infile, &output, &organization),
        }
    }
}
