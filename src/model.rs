use crate::error::{NetworkError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SECS_PER_DAY: i64 = 86_400;

/// `owner/name` identifier of a hosted repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RepoName {
    owner: String,
    name: String,
}

impl RepoName {
    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for RepoName {
    type Err = NetworkError;

    fn from_str(s: &str) -> Result<Self> {
        match s.split_once('/') {
            Some((owner, name)) if !owner.is_empty() && !name.is_empty() => Ok(Self {
                owner: owner.to_string(),
                name: name.to_string(),
            }),
            _ => Err(NetworkError::InvalidRepoName(s.to_string())),
        }
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tier {
    Core,
    Community,
}

impl Tier {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tier::Core => "core",
            Tier::Community => "community",
        }
    }
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Repository {
    pub repo: String,
    pub repo_stars: u64,
    pub repo_forks: u64,
    #[serde(default)]
    pub repo_watchers: u64,
    #[serde(default)]
    pub repo_open_issues: u64,
    #[serde(rename = "repo_createdAt")]
    pub repo_created_at: DateTime<Utc>,
    #[serde(rename = "repo_updatedAt")]
    pub repo_updated_at: DateTime<Utc>,
    pub repo_total_commits: u64,
    pub repo_url: String,
    pub repo_description: Option<String>,
    #[serde(default)]
    pub repo_languages: String,
    #[serde(default)]
    pub repo_license: Option<String>,
    #[serde(default)]
    pub repo_topics: Vec<String>,
    #[serde(default)]
    pub repo_has_discussions: bool,
    #[serde(default)]
    pub repo_archived: bool,
    #[serde(default)]
    pub repo_total_contributors: u64,
    #[serde(default)]
    pub repo_core_contributors: u64,
    #[serde(default)]
    pub repo_external_contributors: u64,
    #[serde(default)]
    pub repo_community_ratio: f64,
    #[serde(default)]
    pub repo_forking_organizations: Vec<String>,
}

impl Repository {
    pub fn update_community_stats(&mut self, core_count: u64) {
        self.repo_core_contributors = core_count;
        self.repo_external_contributors = self.repo_total_contributors.saturating_sub(core_count);
        self.repo_community_ratio =
            community_ratio(self.repo_total_contributors, core_count);
    }

    pub fn update_forking_organizations(&mut self, mut orgs: Vec<String>) {
        orgs.sort();
        orgs.dedup();
        self.repo_forking_organizations = orgs;
    }
}

/// `(total - core) / total` rounded to three decimals, `0.0` for an empty
/// repository.
pub fn community_ratio(total_contributors: u64, core_count: u64) -> f64 {
    if total_contributors == 0 {
        return 0.0;
    }
    let external = total_contributors.saturating_sub(core_count);
    round3(external as f64 / total_contributors as f64)
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub author_name: String,
    pub repo: String,
    pub commit_count: u64,
    pub commit_sec_min: i64,
    pub commit_sec_max: i64,
    #[serde(default = "default_tier")]
    pub tier: Tier,
}

fn default_tier() -> Tier {
    Tier::Core
}

impl Link {
    pub fn new(
        author_name: impl Into<String>,
        repo: &RepoName,
        commit_count: u64,
        window: CommitWindow,
        tier: Tier,
    ) -> Self {
        Self {
            author_name: author_name.into(),
            repo: repo.to_string(),
            commit_count,
            commit_sec_min: window.first.timestamp(),
            commit_sec_max: window.last.timestamp(),
            tier,
        }
    }

    /// Refresh counters from a newer observation. The first commit and the
    /// author's display name are kept as first recorded.
    pub fn refresh(&mut self, commit_count: u64, last_commit: DateTime<Utc>, tier: Tier) {
        self.commit_count = commit_count;
        self.commit_sec_max = last_commit.timestamp();
        self.tier = tier;
    }

    pub fn contribution_span_days(&self) -> i64 {
        (self.commit_sec_max - self.commit_sec_min).max(0) / SECS_PER_DAY
    }

    /// A window reaching past the earliest representable time covers every
    /// commit.
    pub fn is_recent(&self, as_of: DateTime<Utc>, window: chrono::Duration) -> bool {
        match as_of.checked_sub_signed(window) {
            Some(cutoff) => self.commit_sec_max >= cutoff.timestamp(),
            None => true,
        }
    }
}

/// Earliest and latest commit of one author in one repository.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitWindow {
    pub first: DateTime<Utc>,
    pub last: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContributorEntry {
    pub username: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: Tier,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).single().unwrap()
    }

    fn repository(total: u64) -> Repository {
        Repository {
            repo: "a/b".into(),
            repo_stars: 1,
            repo_forks: 0,
            repo_watchers: 0,
            repo_open_issues: 0,
            repo_created_at: ts(0),
            repo_updated_at: ts(0),
            repo_total_commits: 10,
            repo_url: "https://github.com/a/b".into(),
            repo_description: None,
            repo_languages: String::new(),
            repo_license: None,
            repo_topics: Vec::new(),
            repo_has_discussions: false,
            repo_archived: false,
            repo_total_contributors: total,
            repo_core_contributors: 0,
            repo_external_contributors: 0,
            repo_community_ratio: 0.0,
            repo_forking_organizations: Vec::new(),
        }
    }

    #[test]
    fn repo_name_splits_on_first_slash() {
        let name: RepoName = "owner/repo".parse().unwrap();
        assert_eq!(name.owner(), "owner");
        assert_eq!(name.name(), "repo");
        assert_eq!(name.to_string(), "owner/repo");

        assert!("owner/".parse::<RepoName>().is_err());
        assert!("/repo".parse::<RepoName>().is_err());
        assert!("justrepo".parse::<RepoName>().is_err());
    }

    #[test]
    fn community_stats_round_to_three_decimals() {
        let mut repo = repository(3);
        repo.update_community_stats(1);
        assert_eq!(repo.repo_core_contributors, 1);
        assert_eq!(repo.repo_external_contributors, 2);
        assert_eq!(repo.repo_community_ratio, 0.667);
    }

    #[test]
    fn community_ratio_is_zero_without_contributors() {
        let mut repo = repository(0);
        repo.update_community_stats(0);
        assert_eq!(repo.repo_community_ratio, 0.0);
        assert_eq!(repo.repo_external_contributors, 0);
    }

    #[test]
    fn core_count_above_total_saturates() {
        assert_eq!(community_ratio(2, 5), 0.0);
    }

    #[test]
    fn link_refresh_keeps_first_commit() {
        let name: RepoName = "a/b".parse().unwrap();
        let window = CommitWindow { first: ts(1_000), last: ts(2_000) };
        let mut link = Link::new("User One", &name, 3, window, Tier::Core);

        link.refresh(5, ts(10_000), Tier::Community);

        assert_eq!(link.commit_sec_min, 1_000);
        assert_eq!(link.commit_sec_max, 10_000);
        assert_eq!(link.commit_count, 5);
        assert_eq!(link.tier, Tier::Community);
        assert_eq!(link.author_name, "User One");
    }

    #[test]
    fn derived_link_fields() {
        let name: RepoName = "a/b".parse().unwrap();
        let window = CommitWindow { first: ts(0), last: ts(3 * SECS_PER_DAY + 5) };
        let link = Link::new("x", &name, 1, window, Tier::Core);

        assert_eq!(link.contribution_span_days(), 3);
        let as_of = ts(10 * SECS_PER_DAY);
        assert!(link.is_recent(as_of, chrono::Duration::days(7)));
        assert!(!link.is_recent(as_of, chrono::Duration::days(6)));
    }

    #[test]
    fn link_without_tier_defaults_to_core() {
        let link: Link = serde_json::from_str(
            r#"{"author_name":"x","repo":"a/b","commit_count":1,"commit_sec_min":0,"commit_sec_max":1}"#,
        )
        .unwrap();
        assert_eq!(link.tier, Tier::Core);
    }

    #[test]
    fn recency_window_past_time_range_covers_all_links() {
        let name: RepoName = "a/b".parse().unwrap();
        let window = CommitWindow {
            first: ts(0),
            last: ts(86_400),
        };
        let link = Link::new("A", &name, 1, window, Tier::Core);
        assert!(link.is_recent(ts(2 * 86_400), chrono::Duration::days(200_000_000)));
        assert!(!link.is_recent(ts(100 * 86_400), chrono::Duration::days(30)));
    }
}
