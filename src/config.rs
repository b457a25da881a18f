//! Typed `config.toml` loading.
//!
//! The first `[contributors.<group>]` table is the core group; every later
//! group is community. Group and member order follow the file.

use crate::error::{NetworkError, Result};
use crate::model::{ContributorEntry, RepoName, Tier};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct VisualizationConfig {
    pub show_community_contributors: bool,
    pub show_repo_details: bool,
    pub max_forks_to_display: u32,
}

impl Default for VisualizationConfig {
    fn default() -> Self {
        Self {
            show_community_contributors: true,
            show_repo_details: true,
            max_forks_to_display: 10,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    title: Option<String>,
    organization_name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    repositories: Vec<String>,
    #[serde(default)]
    contributors: IndexMap<String, IndexMap<String, String>>,
    #[serde(default = "default_padding")]
    contributor_padding: u32,
    #[serde(default)]
    visualization: VisualizationConfig,
}

fn default_padding() -> u32 {
    40
}

#[derive(Debug, Clone)]
pub struct Config {
    pub title: String,
    pub organization_name: String,
    pub description: String,
    pub author: String,
    pub repositories: Vec<RepoName>,
    pub groups: IndexMap<String, IndexMap<String, String>>,
    pub contributor_padding: u32,
    pub visualization: VisualizationConfig,
}

impl Config {
    pub fn from_toml<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| NetworkError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents)?;

        if raw.organization_name.trim().is_empty() {
            return Err(NetworkError::ConfigInvalid(
                "organization_name must not be empty".to_string(),
            ));
        }

        let repositories = raw
            .repositories
            .iter()
            .map(|r| r.trim().parse::<RepoName>())
            .collect::<Result<Vec<_>>>()?;

        let title = raw
            .title
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| raw.organization_name.clone());

        Ok(Self {
            title,
            organization_name: raw.organization_name,
            description: raw.description,
            author: raw.author,
            repositories,
            groups: raw.contributors,
            contributor_padding: raw.contributor_padding,
            visualization: raw.visualization,
        })
    }

    pub fn contributors(&self) -> Vec<ContributorEntry> {
        self.groups
            .values()
            .enumerate()
            .flat_map(|(i, members)| {
                let kind = if i == 0 { Tier::Core } else { Tier::Community };
                members.iter().map(move |(username, name)| ContributorEntry {
                    username: username.clone(),
                    name: name.clone(),
                    kind,
                })
            })
            .collect()
    }

    fn contributors_of(&self, tier: Option<Tier>) -> IndexMap<String, String> {
        let mut out = IndexMap::new();
        for entry in self.contributors() {
            if tier.map_or(true, |t| t == entry.kind) {
                out.entry(entry.username).or_insert(entry.name);
            }
        }
        out
    }

    /// username -> display name of the core group
    pub fn core_contributors(&self) -> IndexMap<String, String> {
        self.contributors_of(Some(Tier::Core))
    }

    pub fn community_contributors(&self) -> IndexMap<String, String> {
        self.contributors_of(Some(Tier::Community))
    }

    pub fn all_contributors(&self) -> IndexMap<String, String> {
        self.contributors_of(None)
    }

    pub fn core_usernames(&self) -> HashSet<String> {
        self.core_contributors().into_keys().collect()
    }

    /// Display names of the core group; links are tiered against these.
    pub fn core_names(&self) -> HashSet<String> {
        self.core_contributors().into_values().collect()
    }

    pub fn tier_for_name(&self, author_name: &str) -> Tier {
        tier_for_name(&self.core_names(), author_name)
    }
}

pub fn tier_for_name(core_names: &HashSet<String>, author_name: &str) -> Tier {
    if core_names.contains(author_name) {
        Tier::Core
    } else {
        Tier::Community
    }
}
