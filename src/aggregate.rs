//! Turns persisted records into the flat tables read by the front end.
//!
//! Tiers are never trusted from disk: every pass re-derives them from the
//! current configuration, so moving someone between groups only needs a
//! table rebuild.

use crate::cli::{CommonArgs, TableArgs};
use crate::config::{tier_for_name, Config, VisualizationConfig};
use crate::error::Result;
use crate::model::{Link, Repository, Tier};
use crate::store::RecordStore;
use anyhow::Context;
use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use console::style;
use indexmap::IndexMap;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use tracing::info;

pub const REPOSITORIES_CSV: &str = "repositories.csv";
pub const LINKS_CSV: &str = "links.csv";
pub const TOP_CONTRIBUTORS_CSV: &str = "top_contributors.csv";
pub const CONFIG_JSON: &str = "config.json";

pub const DEFAULT_RECENT_WINDOW_DAYS: i64 = 90;

const REPOSITORY_COLUMNS: &[&str] = &[
    "repo",
    "repo_stars",
    "repo_forks",
    "repo_watchers",
    "repo_open_issues",
    "repo_createdAt",
    "repo_updatedAt",
    "repo_total_commits",
    "repo_url",
    "repo_description",
    "repo_languages",
    "repo_license",
    "repo_topics",
    "repo_has_discussions",
    "repo_archived",
    "repo_total_contributors",
    "repo_core_contributors",
    "repo_external_contributors",
    "repo_community_ratio",
    "repo_forking_organizations",
];

const LINK_COLUMNS: &[&str] = &[
    "author_name",
    "repo",
    "commit_count",
    "commit_sec_min",
    "commit_sec_max",
    "tier",
    "contribution_span_days",
    "is_recent",
];

const TOP_CONTRIBUTOR_COLUMNS: &[&str] = &["author_name", "tier", "repo_count", "total_commits"];

#[derive(Debug, Clone, Copy)]
pub struct TableOptions {
    /// Reference time for `is_recent`.
    pub as_of: DateTime<Utc>,
    pub recent_window: chrono::Duration,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            as_of: Utc::now(),
            recent_window: chrono::Duration::days(DEFAULT_RECENT_WINDOW_DAYS),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositoryRow {
    pub repo: String,
    pub repo_stars: u64,
    pub repo_forks: u64,
    pub repo_watchers: u64,
    pub repo_open_issues: u64,
    #[serde(rename = "repo_createdAt")]
    pub repo_created_at: String,
    #[serde(rename = "repo_updatedAt")]
    pub repo_updated_at: String,
    pub repo_total_commits: u64,
    pub repo_url: String,
    pub repo_description: String,
    pub repo_languages: String,
    pub repo_license: String,
    pub repo_topics: String,
    pub repo_has_discussions: bool,
    pub repo_archived: bool,
    pub repo_total_contributors: u64,
    pub repo_core_contributors: u64,
    pub repo_external_contributors: u64,
    pub repo_community_ratio: f64,
    pub repo_forking_organizations: String,
}

impl From<&Repository> for RepositoryRow {
    fn from(r: &Repository) -> Self {
        Self {
            repo: r.repo.clone(),
            repo_stars: r.repo_stars,
            repo_forks: r.repo_forks,
            repo_watchers: r.repo_watchers,
            repo_open_issues: r.repo_open_issues,
            repo_created_at: r.repo_created_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            repo_updated_at: r.repo_updated_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            repo_total_commits: r.repo_total_commits,
            repo_url: r.repo_url.clone(),
            repo_description: r.repo_description.clone().unwrap_or_default(),
            repo_languages: r.repo_languages.clone(),
            repo_license: r.repo_license.clone().unwrap_or_default(),
            repo_topics: r.repo_topics.join(","),
            repo_has_discussions: r.repo_has_discussions,
            repo_archived: r.repo_archived,
            repo_total_contributors: r.repo_total_contributors,
            repo_core_contributors: r.repo_core_contributors,
            repo_external_contributors: r.repo_external_contributors,
            repo_community_ratio: r.repo_community_ratio,
            repo_forking_organizations: r.repo_forking_organizations.join(","),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LinkRow {
    pub author_name: String,
    pub repo: String,
    pub commit_count: u64,
    pub commit_sec_min: i64,
    pub commit_sec_max: i64,
    pub tier: Tier,
    pub contribution_span_days: i64,
    pub is_recent: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopContributorRow {
    pub author_name: String,
    pub tier: Tier,
    pub repo_count: usize,
    pub total_commits: u64,
}

/// `config.json` consumed by the front end.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeConfig {
    pub title: String,
    pub description: String,
    pub organization_name: String,
    pub author: String,
    pub contributor_padding: u32,
    pub contributors: IndexMap<String, String>,
    pub core_contributors: IndexMap<String, String>,
    pub visualization: VisualizationConfig,
}

impl From<&Config> for RuntimeConfig {
    fn from(cfg: &Config) -> Self {
        Self {
            title: cfg.title.clone(),
            description: cfg.description.clone(),
            organization_name: cfg.organization_name.clone(),
            author: cfg.author.clone(),
            contributor_padding: cfg.contributor_padding,
            contributors: cfg.all_contributors(),
            core_contributors: cfg.core_contributors(),
            visualization: cfg.visualization.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Tables {
    pub repositories: Vec<RepositoryRow>,
    pub links: Vec<LinkRow>,
    pub top_contributors: Vec<TopContributorRow>,
    pub runtime_config: RuntimeConfig,
}

impl Tables {
    pub fn core_links(&self) -> usize {
        self.links.iter().filter(|l| l.tier == Tier::Core).count()
    }

    pub fn community_links(&self) -> usize {
        self.links.len() - self.core_links()
    }

    pub fn write_to(&self, dir: &Path) -> Result<()> {
        std::fs::create_dir_all(dir)?;
        write_csv(&dir.join(REPOSITORIES_CSV), REPOSITORY_COLUMNS, &self.repositories)?;
        write_csv(&dir.join(LINKS_CSV), LINK_COLUMNS, &self.links)?;
        write_csv(
            &dir.join(TOP_CONTRIBUTORS_CSV),
            TOP_CONTRIBUTOR_COLUMNS,
            &self.top_contributors,
        )?;
        let mut json = serde_json::to_string_pretty(&self.runtime_config)?;
        json.push('\n');
        std::fs::write(dir.join(CONFIG_JSON), json)?;
        Ok(())
    }
}

/// Recompute tiers, community stats and derived fields. Output order is
/// fully determined by the inputs.
pub fn build_tables(
    mut repositories: Vec<Repository>,
    mut links: Vec<Link>,
    config: &Config,
    options: &TableOptions,
) -> Tables {
    let core_names = config.core_names();
    for link in &mut links {
        link.tier = tier_for_name(&core_names, &link.author_name);
    }
    links.sort_by(|a, b| {
        (&a.repo, &a.author_name, a.commit_sec_min).cmp(&(&b.repo, &b.author_name, b.commit_sec_min))
    });

    let mut core_per_repo: HashMap<&str, u64> = HashMap::new();
    for link in links.iter().filter(|l| l.tier == Tier::Core) {
        *core_per_repo.entry(link.repo.as_str()).or_insert(0) += 1;
    }
    for repo in &mut repositories {
        let core_count = core_per_repo.get(repo.repo.as_str()).copied().unwrap_or(0);
        repo.update_community_stats(core_count);
    }
    repositories.sort_by(|a, b| a.repo.cmp(&b.repo));

    let link_rows = links
        .iter()
        .map(|l| LinkRow {
            author_name: l.author_name.clone(),
            repo: l.repo.clone(),
            commit_count: l.commit_count,
            commit_sec_min: l.commit_sec_min,
            commit_sec_max: l.commit_sec_max,
            tier: l.tier,
            contribution_span_days: l.contribution_span_days(),
            is_recent: l.is_recent(options.as_of, options.recent_window),
        })
        .collect();

    Tables {
        repositories: repositories.iter().map(RepositoryRow::from).collect(),
        links: link_rows,
        top_contributors: top_contributors(&links),
        runtime_config: RuntimeConfig::from(config),
    }
}

/// One row per distinct author: core first, then by total commits, then name.
pub fn top_contributors(links: &[Link]) -> Vec<TopContributorRow> {
    let mut by_author: BTreeMap<&str, (Tier, BTreeSet<&str>, u64)> = BTreeMap::new();
    for link in links {
        let entry = by_author
            .entry(link.author_name.as_str())
            .or_insert((link.tier, BTreeSet::new(), 0));
        entry.1.insert(link.repo.as_str());
        entry.2 += link.commit_count;
    }

    let mut rows: Vec<TopContributorRow> = by_author
        .into_iter()
        .map(|(name, (tier, repos, commits))| TopContributorRow {
            author_name: name.to_string(),
            tier,
            repo_count: repos.len(),
            total_commits: commits,
        })
        .collect();

    rows.sort_by(|a, b| {
        a.tier
            .cmp(&b.tier)
            .then(b.total_commits.cmp(&a.total_commits))
            .then(a.author_name.cmp(&b.author_name))
    });
    rows
}

/// Load every record, rebuild the tables and write them next to the records.
pub fn generate(store: &RecordStore, config: &Config, options: &TableOptions) -> Result<Tables> {
    let repositories = store.load_repositories()?;
    let links = store.load_links()?;
    let tables = build_tables(repositories, links, config, options);

    info!(
        repositories = tables.repositories.len(),
        core_links = tables.core_links(),
        community_links = tables.community_links(),
        "writing tables"
    );
    tables.write_to(store.root())?;
    Ok(tables)
}

fn write_csv<T: Serialize>(path: &Path, columns: &[&str], rows: &[T]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)?;
    writer.write_record(columns)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// `--as-of` accepts RFC3339 or a bare `YYYY-MM-DD` (midnight UTC).
pub fn parse_as_of(value: &str) -> anyhow::Result<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .with_context(|| format!("Invalid date '{}', expected RFC3339 or YYYY-MM-DD", value))?;
    Ok(date.and_time(NaiveTime::MIN).and_utc())
}

pub fn table_options(args: &TableArgs) -> anyhow::Result<TableOptions> {
    let window = humantime::parse_duration(&args.recent_window)
        .with_context(|| format!("Invalid recent window '{}'", args.recent_window))?;
    let recent_window = chrono::Duration::from_std(window)
        .with_context(|| format!("Recent window '{}' is out of range", args.recent_window))?;
    let as_of = match &args.as_of {
        Some(value) => parse_as_of(value)?,
        None => Utc::now(),
    };
    Ok(TableOptions { as_of, recent_window })
}

pub fn exec(common: &CommonArgs, args: &TableArgs) -> anyhow::Result<()> {
    let options = table_options(args)?;
    let config = common.load_config()?;
    let store = common.store()?;
    let tables = generate(&store, &config, &options).context("Failed to generate tables")?;
    output_tables(&tables, store.root());
    Ok(())
}

pub fn output_tables(tables: &Tables, dir: &Path) {
    println!("{}", style("Generated Tables").bold());
    println!("{}", "─".repeat(50));
    println!("Repositories: {}", style(tables.repositories.len()).cyan());
    println!(
        "Links: {} ({} core, {} community)",
        style(tables.links.len()).cyan(),
        style(tables.core_links()).green(),
        style(tables.community_links()).yellow()
    );
    println!("Contributors: {}", style(tables.top_contributors.len()).cyan());
    println!("Written to {}", style(dir.display()).dim());
}
