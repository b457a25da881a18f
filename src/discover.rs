//! Read-only exploration: contributors of tracked repositories who are not
//! configured yet, and repositories that configured people work on but that
//! are not tracked yet. Nothing here writes records.

use crate::cli::CommonArgs;
use crate::error::Result;
use crate::fetch::{ItemFailure, Stage};
use crate::github::HostingApi;
use crate::model::{RepoName, Tier};
use anyhow::Context;
use console::{style, Term};
use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::warn;

pub const DEFAULT_MIN_CONTRIBUTORS: usize = 2;
pub const DEFAULT_REPO_LIMIT: usize = 50;
/// The events API serves at most 300 events, 100 per page.
const EVENT_PAGES: u32 = 3;
const MAX_NEW_REPOS_PER_USER: usize = 100;
const INTERESTING_EVENTS: &[&str] = &["PushEvent", "PullRequestEvent", "IssuesEvent"];

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredContributor {
    pub login: String,
    pub name: String,
    pub total_contributions: u64,
    pub repositories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredRepository {
    pub repo: String,
    pub contributors: Vec<String>,
}

#[derive(Debug)]
pub struct Discovery<T> {
    pub found: Vec<T>,
    pub failures: Vec<ItemFailure>,
    /// Candidates that met the activity threshold, known or not.
    pub scanned: usize,
}

impl<T> Default for Discovery<T> {
    fn default() -> Self {
        Self {
            found: Vec::new(),
            failures: Vec::new(),
            scanned: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    Core,
    Community,
    Skip,
}

/// Contributors across `repositories` with at least `min_contributions`
/// commits in total who are not in `known`, most active first.
pub fn contributors_from_repositories<A: HostingApi>(
    api: &A,
    repositories: &[RepoName],
    known: &HashSet<String>,
    min_contributions: u64,
) -> Result<Discovery<DiscoveredContributor>> {
    let mut discovery = Discovery::default();
    let mut all: IndexMap<String, DiscoveredContributor> = IndexMap::new();

    for repo in repositories {
        let entity = repo.to_string();
        let contributors = match api.contributors(repo) {
            Ok(c) => c,
            Err(e) if e.is_api() => {
                warn!(repo = %entity, error = %e, "skipping repository");
                discovery.failures.push(ItemFailure::new(Stage::Contributors, &entity, &e));
                continue;
            }
            Err(e) => return Err(e),
        };

        for contributor in contributors {
            let entry = all
                .entry(contributor.login.clone())
                .or_insert_with(|| DiscoveredContributor {
                    name: contributor.login.clone(),
                    login: contributor.login.clone(),
                    total_contributions: 0,
                    repositories: Vec::new(),
                });
            entry.total_contributions += contributor.contributions;
            if !entry.repositories.contains(&entity) {
                entry.repositories.push(entity.clone());
            }
        }
    }

    let active: Vec<DiscoveredContributor> = all
        .into_values()
        .filter(|c| c.total_contributions >= min_contributions)
        .collect();
    discovery.scanned = active.len();
    let mut remaining: Vec<DiscoveredContributor> = active
        .into_iter()
        .filter(|c| !known.contains(&c.login))
        .collect();
    remaining.sort_by(|a, b| b.total_contributions.cmp(&a.total_contributions));

    for contributor in &mut remaining {
        match api.user_name(&contributor.login) {
            Ok(Some(name)) => contributor.name = name,
            Ok(None) => {}
            Err(e) if e.is_api() => {
                discovery
                    .failures
                    .push(ItemFailure::new(Stage::UserName, &contributor.login, &e));
            }
            Err(e) => return Err(e),
        }
    }

    discovery.found = remaining;
    Ok(discovery)
}

/// Untracked repositories touched by at least `min_contributors` of the
/// given people, ranked by how many of them were active there.
pub fn repositories_from_contributors<A: HostingApi>(
    api: &A,
    contributors: &IndexMap<String, String>,
    tracked: &HashSet<String>,
    min_contributors: usize,
    limit: usize,
) -> Result<Discovery<DiscoveredRepository>> {
    let mut discovery = Discovery::default();
    let mut repos: IndexMap<String, Vec<String>> = IndexMap::new();

    for username in contributors.keys() {
        let events = match api.user_events(username, EVENT_PAGES) {
            Ok(events) => events,
            Err(e) if e.is_api() => {
                warn!(user = %username, error = %e, "skipping contributor");
                discovery.failures.push(ItemFailure::new(Stage::Events, username, &e));
                continue;
            }
            Err(e) => return Err(e),
        };

        let mut found = 0;
        for event in events {
            if !INTERESTING_EVENTS.contains(&event.kind.as_str())
                || tracked.contains(&event.repo_full_name)
            {
                continue;
            }
            let users = repos.entry(event.repo_full_name).or_default();
            if !users.contains(username) {
                users.push(username.clone());
                found += 1;
            }
            if found > MAX_NEW_REPOS_PER_USER {
                break;
            }
        }
    }

    discovery.scanned = repos.len();
    discovery.found = rank_repositories(repos, min_contributors, limit);
    Ok(discovery)
}

pub fn rank_repositories(
    repos: IndexMap<String, Vec<String>>,
    min_contributors: usize,
    limit: usize,
) -> Vec<DiscoveredRepository> {
    let mut ranked: Vec<DiscoveredRepository> = repos
        .into_iter()
        .filter(|(_, users)| users.len() >= min_contributors)
        .map(|(repo, contributors)| DiscoveredRepository { repo, contributors })
        .collect();
    // stable: ties keep first-seen order
    ranked.sort_by(|a, b| b.contributors.len().cmp(&a.contributors.len()));
    ranked.truncate(limit);
    ranked
}

/// Ask `choose` about each contributor and group the answers by tier.
pub fn classify<F>(
    contributors: &[DiscoveredContributor],
    mut choose: F,
) -> Result<IndexMap<Tier, Vec<&DiscoveredContributor>>>
where
    F: FnMut(&DiscoveredContributor) -> Result<Choice>,
{
    let mut groups: IndexMap<Tier, Vec<&DiscoveredContributor>> = IndexMap::new();
    groups.insert(Tier::Core, Vec::new());
    groups.insert(Tier::Community, Vec::new());

    for contributor in contributors {
        let tier = match choose(contributor)? {
            Choice::Core => Tier::Core,
            Choice::Community => Tier::Community,
            Choice::Skip => continue,
        };
        groups.entry(tier).or_default().push(contributor);
    }
    Ok(groups)
}

/// `login = "Display Name"` with TOML escaping.
pub fn toml_member_line(login: &str, name: &str) -> String {
    let key = if !login.is_empty()
        && login
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        login.to_string()
    } else {
        toml::Value::String(login.to_string()).to_string()
    };
    format!("{key} = {}", toml::Value::String(name.to_string()))
}

pub fn output_contributors(discovery: &Discovery<DiscoveredContributor>, known: usize) {
    println!();
    println!("{}", "=".repeat(60));
    println!("{}", style("NEW COMMUNITY CONTRIBUTORS").bold());
    println!("{}", "=".repeat(60));
    println!(
        "Total discovered: {}  |  Already known: {}  |  New: {}",
        discovery.scanned,
        known,
        style(discovery.found.len()).cyan()
    );

    for c in &discovery.found {
        println!(
            "  {} ({}) - {} contributions",
            style(&c.login).bold(),
            c.name,
            c.total_contributions
        );
    }

    println!();
    println!("Add these to [contributors.community] in config.toml.");
}

pub fn output_contributor_details(c: &DiscoveredContributor) {
    println!();
    println!("{}", "-".repeat(40));
    println!("  Username:      {}", style(&c.login).bold());
    println!("  Name:          {}", c.name);
    println!("  Contributions: {}", c.total_contributions);
    let repos: Vec<&str> = c.repositories.iter().take(5).map(String::as_str).collect();
    println!("  Repositories:  {}", repos.join(", "));
}

pub fn output_classification(groups: &IndexMap<Tier, Vec<&DiscoveredContributor>>) {
    for (tier, members) in groups {
        if members.is_empty() {
            continue;
        }
        println!();
        let group = match tier {
            Tier::Core => "core",
            Tier::Community => "community",
        };
        println!("{}", style(format!("[contributors.{group}]")).bold());
        for c in members {
            println!("{}", toml_member_line(&c.login, &c.name));
        }
    }
}

pub fn output_repositories(discovery: &Discovery<DiscoveredRepository>, min_contributors: usize) {
    println!();
    println!("{}", "=".repeat(60));
    println!(
        "{}",
        style(format!("DISCOVERED REPOSITORIES (min {min_contributors} contributors)")).bold()
    );
    println!("{}", "=".repeat(60));

    if discovery.found.is_empty() {
        println!("No repos found with {min_contributors}+ contributors.");
        return;
    }

    for r in &discovery.found {
        println!("  {}", style(&r.repo).bold());
        println!(
            "    Contributors ({}): {}",
            r.contributors.len(),
            r.contributors.join(", ")
        );
    }

    println!();
    println!("Add these to 'repositories' in config.toml:");
    for r in &discovery.found {
        println!("    {},", toml::Value::String(r.repo.clone()));
    }
}

pub fn exec_from_repositories(
    common: &CommonArgs,
    min_contributions: u64,
    interactive: bool,
) -> anyhow::Result<()> {
    let config = common.load_config()?;
    let client = common.client()?;
    let known: HashSet<String> = config.all_contributors().into_keys().collect();

    println!(
        "Scanning {} repositories for contributors...",
        style(config.repositories.len()).cyan()
    );
    let discovery = contributors_from_repositories(&client, &config.repositories, &known, min_contributions)
        .context("Failed to discover contributors")?;
    output_failures(&discovery.failures);

    if !interactive {
        output_contributors(&discovery, known.len());
        return Ok(());
    }
    if discovery.found.is_empty() {
        println!("No new contributors found.");
        return Ok(());
    }

    let term = Term::stdout();
    let groups = classify(&discovery.found, |c| {
        output_contributor_details(c);
        prompt_choice(&term)
    })
    .context("Failed to read classification")?;
    output_classification(&groups);
    Ok(())
}

fn prompt_choice(term: &Term) -> Result<Choice> {
    loop {
        term.write_str("  [c]ore, co[m]munity, [s]kip? ")?;
        let key = term.read_char()?;
        term.write_line(&key.to_string())?;
        match key.to_ascii_lowercase() {
            'c' => return Ok(Choice::Core),
            'm' => return Ok(Choice::Community),
            's' => return Ok(Choice::Skip),
            _ => continue,
        }
    }
}

pub fn exec_from_contributors(
    common: &CommonArgs,
    all: bool,
    min_contributors: usize,
    limit: usize,
) -> anyhow::Result<()> {
    let config = common.load_config()?;
    let client = common.client()?;
    let people = if all {
        config.all_contributors()
    } else {
        config.core_contributors()
    };
    let tracked: HashSet<String> = config.repositories.iter().map(|r| r.to_string()).collect();

    println!(
        "Scanning public activity of {} contributors...",
        style(people.len()).cyan()
    );
    let discovery = repositories_from_contributors(&client, &people, &tracked, min_contributors, limit)
        .context("Failed to discover repositories")?;
    output_failures(&discovery.failures);
    output_repositories(&discovery, min_contributors);
    Ok(())
}

fn output_failures(failures: &[ItemFailure]) {
    for failure in failures {
        eprintln!(
            "{} {} {}: {}",
            style("skipped").yellow(),
            failure.stage,
            failure.entity,
            failure.message
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NetworkError;
    use crate::github::{ApiContributor, ApiEvent, ApiFork, RepoSnapshot};
    use crate::model::CommitWindow;
    use std::collections::HashMap;

    #[derive(Default)]
    struct FakeApi {
        contributors: HashMap<String, Vec<(&'static str, u64)>>,
        events: HashMap<String, Vec<(&'static str, &'static str)>>,
        names: HashMap<String, String>,
        unnamed: HashSet<String>,
    }

    impl HostingApi for FakeApi {
        fn repository(&self, repo: &RepoName) -> Result<RepoSnapshot> {
            Err(NetworkError::NotFound(repo.to_string()))
        }

        fn contributors(&self, repo: &RepoName) -> Result<Vec<ApiContributor>> {
            match self.contributors.get(&repo.to_string()) {
                Some(list) => Ok(list
                    .iter()
                    .map(|(login, n)| ApiContributor {
                        login: login.to_string(),
                        contributions: *n,
                    })
                    .collect()),
                None => Err(NetworkError::RateLimited(repo.to_string())),
            }
        }

        fn commit_window(&self, _repo: &RepoName, _login: &str) -> Result<Option<CommitWindow>> {
            Ok(None)
        }

        fn user_name(&self, login: &str) -> Result<Option<String>> {
            if self.unnamed.contains(login) {
                return Err(NetworkError::Api {
                    status: 502,
                    entity: login.to_string(),
                });
            }
            Ok(self.names.get(login).cloned())
        }

        fn forks(&self, _repo: &RepoName) -> Result<Vec<ApiFork>> {
            Ok(Vec::new())
        }

        fn user_events(&self, login: &str, _max_pages: u32) -> Result<Vec<ApiEvent>> {
            Ok(self
                .events
                .get(login)
                .map(|events| {
                    events
                        .iter()
                        .map(|(kind, repo)| ApiEvent {
                            kind: kind.to_string(),
                            repo_full_name: repo.to_string(),
                        })
                        .collect()
                })
                .unwrap_or_default())
        }
    }

    fn repos(names: &[&str]) -> Vec<RepoName> {
        names.iter().map(|n| n.parse().unwrap()).collect()
    }

    #[test]
    fn merges_contributors_across_repositories() {
        let mut api = FakeApi::default();
        api.contributors
            .insert("a/one".into(), vec![("known", 50), ("new1", 3), ("new2", 1)]);
        api.contributors.insert("a/two".into(), vec![("new2", 4), ("tiny", 1)]);
        api.names.insert("new2".into(), "New Two".into());
        let known: HashSet<String> = ["known".to_string()].into();

        let discovery = contributors_from_repositories(
            &api,
            &repos(&["a/one", "a/two", "a/missing"]),
            &known,
            2,
        )
        .unwrap();

        // known, new1, new2 pass the threshold; tiny does not
        assert_eq!(discovery.scanned, 3);
        assert_eq!(discovery.failures.len(), 1);
        assert!(discovery.failures[0].rate_limited);
        assert_eq!(discovery.failures[0].stage, Stage::Contributors);
        assert_eq!(
            discovery.found,
            vec![
                DiscoveredContributor {
                    login: "new2".into(),
                    name: "New Two".into(),
                    total_contributions: 5,
                    repositories: vec!["a/one".into(), "a/two".into()],
                },
                DiscoveredContributor {
                    login: "new1".into(),
                    name: "new1".into(),
                    total_contributions: 3,
                    repositories: vec!["a/one".into()],
                },
            ]
        );
    }

    #[test]
    fn failed_name_lookup_keeps_login() {
        let mut api = FakeApi::default();
        api.contributors.insert("a/one".into(), vec![("newbie", 4)]);
        api.unnamed.insert("newbie".into());

        let discovery =
            contributors_from_repositories(&api, &repos(&["a/one"]), &HashSet::new(), 1).unwrap();

        assert_eq!(discovery.found[0].name, "newbie");
        assert_eq!(discovery.failures.len(), 1);
        assert_eq!(discovery.failures[0].stage, Stage::UserName);
        assert_eq!(discovery.failures[0].entity, "newbie");
    }

    #[test]
    fn finds_untracked_repositories_from_events() {
        let mut api = FakeApi::default();
        api.events.insert(
            "u1".into(),
            vec![
                ("PushEvent", "x/shared"),
                ("WatchEvent", "x/starred"),
                ("PushEvent", "a/tracked"),
                ("PushEvent", "x/solo"),
                ("PullRequestEvent", "x/shared"),
            ],
        );
        api.events
            .insert("u2".into(), vec![("IssuesEvent", "x/shared")]);
        let people: IndexMap<String, String> = [
            ("u1".to_string(), "User One".to_string()),
            ("u2".to_string(), "User Two".to_string()),
        ]
        .into_iter()
        .collect();
        let tracked: HashSet<String> = ["a/tracked".to_string()].into();

        let discovery = repositories_from_contributors(&api, &people, &tracked, 2, 10).unwrap();

        assert_eq!(discovery.scanned, 2);
        assert_eq!(
            discovery.found,
            vec![DiscoveredRepository {
                repo: "x/shared".into(),
                contributors: vec!["u1".into(), "u2".into()],
            }]
        );
    }

    #[test]
    fn ranking_limits_results() {
        let repos: IndexMap<String, Vec<String>> = [
            ("r/1".to_string(), vec!["a".to_string()]),
            ("r/2".to_string(), vec!["a".to_string(), "b".to_string()]),
            ("r/3".to_string(), vec!["c".to_string()]),
        ]
        .into_iter()
        .collect();

        let ranked = rank_repositories(repos, 1, 2);
        let names: Vec<&str> = ranked.iter().map(|r| r.repo.as_str()).collect();
        assert_eq!(names, vec!["r/2", "r/1"]);
    }

    #[test]
    fn classification_groups_answers() {
        let people: Vec<DiscoveredContributor> = ["a", "b", "c"]
            .iter()
            .map(|login| DiscoveredContributor {
                login: login.to_string(),
                name: login.to_uppercase(),
                total_contributions: 1,
                repositories: Vec::new(),
            })
            .collect();
        let mut answers = vec![Choice::Core, Choice::Skip, Choice::Community].into_iter();

        let groups = classify(&people, |_| Ok(answers.next().unwrap())).unwrap();

        assert_eq!(groups[&Tier::Core].len(), 1);
        assert_eq!(groups[&Tier::Core][0].login, "a");
        assert_eq!(groups[&Tier::Community][0].login, "c");
    }

    #[test]
    fn member_lines_are_valid_toml() {
        assert_eq!(toml_member_line("alice", "Alice A."), "alice = \"Alice A.\"");
        let parsed: toml::Table = toml::from_str(&toml_member_line("dependabot[bot]", "Bot \"x\"")).unwrap();
        assert_eq!(parsed["dependabot[bot]"].as_str(), Some("Bot \"x\""));
    }
}
