//! Access to the GitHub REST API.
//!
//! Fetch and discovery code talks to [`HostingApi`]; [`GitHubClient`] is the
//! blocking HTTP implementation.

pub mod auth;
pub mod client;

pub use auth::resolve_token;
pub use client::{GitHubClient, GitHubConfig};

use crate::error::Result;
use crate::model::{CommitWindow, RepoName};
use chrono::{DateTime, Utc};

/// Repository metadata as returned by the API, before it becomes a
/// [`crate::model::Repository`] record.
#[derive(Debug, Clone, PartialEq)]
pub struct RepoSnapshot {
    pub full_name: String,
    pub stars: u64,
    pub forks: u64,
    pub watchers: u64,
    pub open_issues: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub total_commits: u64,
    pub url: String,
    pub description: Option<String>,
    pub languages: Vec<String>,
    pub license: Option<String>,
    pub topics: Vec<String>,
    pub has_discussions: bool,
    pub archived: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiContributor {
    pub login: String,
    pub contributions: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiFork {
    pub owner_login: String,
    pub owner_is_organization: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEvent {
    pub kind: String,
    pub repo_full_name: String,
}

pub trait HostingApi {
    fn repository(&self, repo: &RepoName) -> Result<RepoSnapshot>;

    fn contributors(&self, repo: &RepoName) -> Result<Vec<ApiContributor>>;

    /// First and last commit authored by `login`, `None` when the author has
    /// no commits reachable from the default branch.
    fn commit_window(&self, repo: &RepoName, login: &str) -> Result<Option<CommitWindow>>;

    fn user_name(&self, login: &str) -> Result<Option<String>>;

    fn forks(&self, repo: &RepoName) -> Result<Vec<ApiFork>>;

    fn user_events(&self, login: &str, max_pages: u32) -> Result<Vec<ApiEvent>>;
}
