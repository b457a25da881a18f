use crate::cli::{CommonArgs, FetchArgs};
use crate::config::Config;
use crate::error::{NetworkError, Result};
use crate::github::{ApiContributor, HostingApi, RepoSnapshot};
use crate::model::{Link, RepoName, Repository, Tier};
use crate::store::RecordStore;
use anyhow::Context;
use console::style;
use indexmap::IndexMap;
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashSet;
use std::fmt;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_COMMUNITY: usize = 100;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    /// Fetch links for every configured group instead of the core group only.
    pub all_contributors: bool,
    pub discover_community: bool,
    pub max_community: usize,
    pub forking_orgs: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            all_contributors: false,
            discover_community: false,
            max_community: DEFAULT_MAX_COMMUNITY,
            forking_orgs: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Repository,
    Contributors,
    Link,
    CommunityLink,
    UserName,
    Forks,
    Events,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Repository => "repository",
            Stage::Contributors => "contributors",
            Stage::Link => "link",
            Stage::CommunityLink => "community link",
            Stage::UserName => "user name",
            Stage::Forks => "forks",
            Stage::Events => "events",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub stage: Stage,
    pub entity: String,
    pub rate_limited: bool,
    pub message: String,
}

impl ItemFailure {
    pub fn new(stage: Stage, entity: &str, error: &NetworkError) -> Self {
        Self {
            stage,
            entity: entity.to_string(),
            rate_limited: error.is_rate_limited(),
            message: error.to_string(),
        }
    }
}

#[derive(Debug, Default)]
pub struct FetchSummary {
    pub repositories_updated: usize,
    pub links_updated: usize,
    pub community_links_updated: usize,
    pub forking_orgs_updated: usize,
    pub failures: Vec<ItemFailure>,
}

impl FetchSummary {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn rate_limited(&self) -> usize {
        self.failures.iter().filter(|f| f.rate_limited).count()
    }

    /// API errors become failures of the item being processed; anything
    /// else (filesystem, corrupt records) is returned to abort the run.
    fn record<T>(&mut self, stage: Stage, entity: &str, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if e.is_api() => {
                if e.is_rate_limited() {
                    warn!(stage = %stage, entity, "rate limit hit, skipping");
                } else {
                    warn!(stage = %stage, entity, error = %e, "API error, skipping");
                }
                self.failures.push(ItemFailure::new(stage, entity, &e));
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }
}

pub struct Fetcher<'a, A: HostingApi> {
    api: &'a A,
    store: &'a RecordStore,
    config: &'a Config,
    options: FetchOptions,
    progress: ProgressBar,
}

impl<'a, A: HostingApi> Fetcher<'a, A> {
    pub fn new(api: &'a A, store: &'a RecordStore, config: &'a Config, options: FetchOptions) -> Self {
        Self {
            api,
            store,
            config,
            options,
            progress: ProgressBar::hidden(),
        }
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        if show {
            let pb = ProgressBar::new(self.config.repositories.len() as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
            );
            self.progress = pb;
        }
        self
    }

    pub fn run(&self) -> Result<FetchSummary> {
        let mut summary = FetchSummary::default();
        let known = if self.options.all_contributors {
            self.config.all_contributors()
        } else {
            self.config.core_contributors()
        };
        let core_usernames = self.config.core_usernames();
        let configured: HashSet<String> = self.config.all_contributors().into_keys().collect();

        info!(
            repositories = self.config.repositories.len(),
            contributors = known.len(),
            "fetching"
        );

        for repo in &self.config.repositories {
            self.progress.set_message(repo.to_string());
            self.fetch_repository(repo, &known, &core_usernames, &configured, &mut summary)?;
            self.progress.inc(1);
        }

        self.progress.finish_and_clear();
        Ok(summary)
    }

    fn fetch_repository(
        &self,
        repo: &RepoName,
        known: &IndexMap<String, String>,
        core_usernames: &HashSet<String>,
        configured: &HashSet<String>,
        summary: &mut FetchSummary,
    ) -> Result<()> {
        let entity = repo.to_string();

        let Some(snapshot) = summary.record(Stage::Repository, &entity, self.api.repository(repo))? else {
            return Ok(());
        };
        let mut record = self.repository_record(repo, snapshot)?;
        self.store.put_repository(repo, &record)?;
        summary.repositories_updated += 1;

        let Some(contributors) =
            summary.record(Stage::Contributors, &entity, self.api.contributors(repo))?
        else {
            return Ok(());
        };

        let mut core_count = 0u64;
        for contributor in &contributors {
            let Some(name) = known.get(&contributor.login) else {
                continue;
            };
            let tier = if core_usernames.contains(&contributor.login) {
                core_count += 1;
                Tier::Core
            } else {
                Tier::Community
            };
            let link_entity = format!("{entity}@{}", contributor.login);
            let result = self.update_link(repo, contributor, name, tier);
            if summary.record(Stage::Link, &link_entity, result)? == Some(true) {
                summary.links_updated += 1;
            }
        }

        record.repo_total_contributors = contributors.len() as u64;
        record.update_community_stats(core_count);

        if self.options.discover_community {
            self.fetch_community(repo, &contributors, configured, summary)?;
        }

        if self.options.forking_orgs {
            if let Some(forks) = summary.record(Stage::Forks, &entity, self.api.forks(repo))? {
                let orgs: Vec<String> = forks
                    .into_iter()
                    .filter(|f| f.owner_is_organization)
                    .map(|f| f.owner_login)
                    .collect();
                record.update_forking_organizations(orgs);
                if !record.repo_forking_organizations.is_empty() {
                    debug!(
                        repo = %entity,
                        orgs = %record.repo_forking_organizations.join(", "),
                        "forking organizations"
                    );
                }
                summary.forking_orgs_updated += 1;
            }
        }

        self.store.put_repository(repo, &record)?;
        Ok(())
    }

    fn repository_record(&self, repo: &RepoName, snapshot: RepoSnapshot) -> Result<Repository> {
        let previous = self.store.get_repository(repo)?;
        Ok(Repository {
            repo: snapshot.full_name,
            repo_stars: snapshot.stars,
            repo_forks: snapshot.forks,
            repo_watchers: snapshot.watchers,
            repo_open_issues: snapshot.open_issues,
            repo_created_at: snapshot.created_at,
            repo_updated_at: snapshot.updated_at,
            repo_total_commits: snapshot.total_commits,
            repo_url: snapshot.url,
            repo_description: snapshot.description,
            repo_languages: snapshot.languages.join(","),
            repo_license: snapshot.license,
            repo_topics: snapshot.topics,
            repo_has_discussions: snapshot.has_discussions,
            repo_archived: snapshot.archived,
            repo_total_contributors: previous.as_ref().map_or(0, |p| p.repo_total_contributors),
            repo_core_contributors: previous.as_ref().map_or(0, |p| p.repo_core_contributors),
            repo_external_contributors: previous.as_ref().map_or(0, |p| p.repo_external_contributors),
            repo_community_ratio: previous.as_ref().map_or(0.0, |p| p.repo_community_ratio),
            repo_forking_organizations: previous
                .map(|p| p.repo_forking_organizations)
                .unwrap_or_default(),
        })
    }

    /// Create the link on first sight, otherwise refresh its counters.
    /// Returns whether a record was written.
    fn update_link(
        &self,
        repo: &RepoName,
        contributor: &ApiContributor,
        display_name: &str,
        tier: Tier,
    ) -> Result<bool> {
        let Some(window) = self.api.commit_window(repo, &contributor.login)? else {
            debug!(repo = %repo, login = %contributor.login, "no authored commits");
            return Ok(false);
        };

        let link = match self.store.get_link(repo, &contributor.login)? {
            Some(mut existing) => {
                existing.refresh(contributor.contributions, window.last, tier);
                existing
            }
            None => Link::new(display_name, repo, contributor.contributions, window, tier),
        };
        self.store.put_link(repo, &contributor.login, &link)?;
        Ok(true)
    }

    fn fetch_community(
        &self,
        repo: &RepoName,
        contributors: &[ApiContributor],
        configured: &HashSet<String>,
        summary: &mut FetchSummary,
    ) -> Result<()> {
        let candidates = community_candidates(contributors, configured, self.options.max_community);
        debug!(repo = %repo, count = candidates.len(), "community contributors");

        for contributor in candidates {
            let link_entity = format!("{repo}@{}", contributor.login);
            let display_name = match self.api.user_name(&contributor.login) {
                Ok(Some(name)) => name,
                Ok(None) => contributor.login.clone(),
                Err(e) if e.is_api() => {
                    debug!(login = %contributor.login, error = %e, "falling back to login");
                    contributor.login.clone()
                }
                Err(e) => return Err(e),
            };
            let result = self.update_link(repo, contributor, &display_name, Tier::Community);
            if summary.record(Stage::CommunityLink, &link_entity, result)? == Some(true) {
                summary.community_links_updated += 1;
            }
        }
        Ok(())
    }
}

/// Contributors not present in any configured group, in API order, capped.
pub fn community_candidates<'c>(
    contributors: &'c [ApiContributor],
    configured: &HashSet<String>,
    max: usize,
) -> Vec<&'c ApiContributor> {
    contributors
        .iter()
        .filter(|c| !configured.contains(&c.login))
        .take(max)
        .collect()
}

pub fn output_summary(summary: &FetchSummary) {
    println!("{}", style("Fetch Summary").bold());
    println!("{}", "─".repeat(50));
    println!("Repositories updated: {}", style(summary.repositories_updated).cyan());
    println!("Links updated: {}", style(summary.links_updated).cyan());
    if summary.community_links_updated > 0 {
        println!(
            "Community links updated: {}",
            style(summary.community_links_updated).cyan()
        );
    }
    if summary.forking_orgs_updated > 0 {
        println!(
            "Forking organizations updated: {}",
            style(summary.forking_orgs_updated).cyan()
        );
    }

    if summary.is_clean() {
        return;
    }

    println!(
        "Skipped items: {} ({} rate limited)",
        style(summary.failures.len()).red(),
        style(summary.rate_limited()).yellow()
    );
    for failure in &summary.failures {
        println!(
            "  {} {}: {}",
            style(format!("[{}]", failure.stage)).dim(),
            failure.entity,
            failure.message
        );
    }
}

pub fn exec(common: &CommonArgs, args: &FetchArgs) -> anyhow::Result<FetchSummary> {
    let config = common.load_config()?;
    let store = common.store()?;
    let client = common.client()?;

    let options = FetchOptions {
        all_contributors: args.all_contributors,
        discover_community: args.community,
        max_community: args.max_community,
        forking_orgs: args.fetch_forking_orgs,
    };
    let summary = Fetcher::new(&client, &store, &config, options)
        .with_progress(!args.no_progress)
        .run()
        .context("Failed to fetch contributor data")?;

    output_summary(&summary);
    Ok(summary)
}
