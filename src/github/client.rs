use super::{ApiContributor, ApiEvent, ApiFork, HostingApi, RepoSnapshot};
use crate::error::{NetworkError, Result};
use crate::model::{CommitWindow, RepoName};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, ACCEPT, LINK};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_API_URL: &str = "https://api.github.com";
const PER_PAGE: u32 = 100;
const MAX_PAGES: u32 = 50;

#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// Optional, raises the rate limit considerably.
    pub token: Option<String>,
    pub api_url: String,
    pub timeout: Duration,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

pub struct GitHubClient {
    token: Option<String>,
    api_url: String,
    client: Client,
}

impl GitHubClient {
    pub fn new(config: GitHubConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("contributor-network/", env!("CARGO_PKG_VERSION")))
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            token: config.token,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    pub fn with_token(token: Option<String>) -> Result<Self> {
        Self::new(GitHubConfig {
            token,
            ..Default::default()
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn request(&self, url: &str) -> RequestBuilder {
        let mut request = self
            .client
            .get(url)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(ref token) = self.token {
            request = request.bearer_auth(token);
        }
        request
    }

    fn send(&self, url: &str, entity: &str) -> Result<Response> {
        debug!(url, "GET");
        let response = self.request(url).send()?;
        if response.status().is_success() {
            Ok(response)
        } else {
            Err(error_for_response(&response, entity))
        }
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str, entity: &str) -> Result<T> {
        Ok(self.send(url, entity)?.json()?)
    }

    /// Follow `rel="next"` links, collecting every page up to `max_pages`.
    fn get_paginated<T: DeserializeOwned>(
        &self,
        first_url: &str,
        entity: &str,
        max_pages: u32,
    ) -> Result<Vec<T>> {
        let mut items = Vec::new();
        let mut next = Some(first_url.to_string());
        let mut pages = 0;

        while let Some(url) = next.take() {
            let response = self.send(&url, entity)?;
            if response.status() == StatusCode::NO_CONTENT {
                break;
            }
            next = link_header(response.headers()).and_then(|h| parse_link(&h, "next"));
            let mut page: Vec<T> = response.json()?;
            items.append(&mut page);

            pages += 1;
            if pages >= max_pages {
                break;
            }
        }

        Ok(items)
    }

    fn total_commits(&self, repo: &RepoName) -> Result<u64> {
        let entity = repo.to_string();
        let url = self.url(&format!("/repos/{repo}/commits?per_page=1"));
        let response = match self.send(&url, &entity) {
            Ok(r) => r,
            // empty repositories answer 409
            Err(NetworkError::Api { status: 409, .. }) => return Ok(0),
            Err(e) => return Err(e),
        };
        let last = link_header(response.headers())
            .and_then(|h| parse_link(&h, "last"))
            .and_then(|url| page_number(&url));
        match last {
            Some(n) => Ok(n),
            None => {
                let page: Vec<CommitItem> = response.json()?;
                Ok(page.len() as u64)
            }
        }
    }
}

impl HostingApi for GitHubClient {
    fn repository(&self, repo: &RepoName) -> Result<RepoSnapshot> {
        let entity = repo.to_string();
        let data: RepoResponse = self.get_json(&self.url(&format!("/repos/{repo}")), &entity)?;
        let languages: IndexMap<String, u64> =
            self.get_json(&self.url(&format!("/repos/{repo}/languages")), &entity)?;
        let total_commits = self.total_commits(repo)?;

        let url = data
            .homepage
            .filter(|h| !h.trim().is_empty())
            .unwrap_or(data.html_url);
        let license = data.license.and_then(|l| {
            l.spdx_id
                .filter(|id| id != "NOASSERTION")
                .or(l.name)
        });

        Ok(RepoSnapshot {
            full_name: data.full_name,
            stars: data.stargazers_count,
            forks: data.forks_count,
            watchers: data.subscribers_count.unwrap_or(data.watchers_count),
            open_issues: data.open_issues_count,
            created_at: data.created_at,
            updated_at: data.updated_at,
            total_commits,
            url,
            description: data.description,
            languages: languages.into_keys().collect(),
            license,
            topics: data.topics,
            has_discussions: data.has_discussions,
            archived: data.archived,
        })
    }

    fn contributors(&self, repo: &RepoName) -> Result<Vec<ApiContributor>> {
        let url = self.url(&format!("/repos/{repo}/contributors?per_page={PER_PAGE}"));
        let items: Vec<ContributorItem> = self.get_paginated(&url, &repo.to_string(), MAX_PAGES)?;
        Ok(items
            .into_iter()
            .map(|c| ApiContributor {
                login: c.login,
                contributions: c.contributions,
            })
            .collect())
    }

    fn commit_window(&self, repo: &RepoName, login: &str) -> Result<Option<CommitWindow>> {
        let entity = format!("{repo}@{login}");
        let url = self.url(&format!("/repos/{repo}/commits?author={login}&per_page=1"));
        let response = self.send(&url, &entity)?;
        let last_page = link_header(response.headers()).and_then(|h| parse_link(&h, "last"));
        let newest: Vec<CommitItem> = response.json()?;

        let Some(last) = newest.first().and_then(CommitItem::authored_at) else {
            return Ok(None);
        };

        let first = match last_page {
            Some(last_url) => {
                let oldest: Vec<CommitItem> = self.get_json(&last_url, &entity)?;
                oldest
                    .last()
                    .and_then(CommitItem::authored_at)
                    .unwrap_or(last)
            }
            None => last,
        };

        Ok(Some(CommitWindow { first, last }))
    }

    fn user_name(&self, login: &str) -> Result<Option<String>> {
        let user: UserResponse = self.get_json(&self.url(&format!("/users/{login}")), login)?;
        Ok(user.name.filter(|n| !n.trim().is_empty()))
    }

    fn forks(&self, repo: &RepoName) -> Result<Vec<ApiFork>> {
        let url = self.url(&format!("/repos/{repo}/forks?per_page={PER_PAGE}"));
        let items: Vec<ForkItem> = self.get_paginated(&url, &repo.to_string(), MAX_PAGES)?;
        Ok(items
            .into_iter()
            .map(|f| ApiFork {
                owner_is_organization: f.owner.kind == "Organization",
                owner_login: f.owner.login,
            })
            .collect())
    }

    fn user_events(&self, login: &str, max_pages: u32) -> Result<Vec<ApiEvent>> {
        let url = self.url(&format!("/users/{login}/events/public?per_page={PER_PAGE}"));
        let items: Vec<EventItem> = self.get_paginated(&url, login, max_pages.max(1))?;
        Ok(items
            .into_iter()
            .map(|e| ApiEvent {
                kind: e.kind,
                repo_full_name: e.repo.name,
            })
            .collect())
    }
}

fn error_for_response(response: &Response, entity: &str) -> NetworkError {
    let remaining = response
        .headers()
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok());
    classify_status(response.status(), remaining, entity)
}

pub(crate) fn classify_status(
    status: StatusCode,
    ratelimit_remaining: Option<&str>,
    entity: &str,
) -> NetworkError {
    match status {
        StatusCode::TOO_MANY_REQUESTS => NetworkError::RateLimited(entity.to_string()),
        StatusCode::FORBIDDEN if ratelimit_remaining == Some("0") => {
            NetworkError::RateLimited(entity.to_string())
        }
        StatusCode::UNAUTHORIZED => NetworkError::Auth("invalid or missing token".to_string()),
        StatusCode::NOT_FOUND => NetworkError::NotFound(entity.to_string()),
        other => NetworkError::Api {
            status: other.as_u16(),
            entity: entity.to_string(),
        },
    }
}

fn link_header(headers: &HeaderMap) -> Option<String> {
    headers
        .get(LINK)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// URL of the `rel` entry in a `Link` header:
/// `<https://..?page=2>; rel="next", <https://..?page=5>; rel="last"`
pub(crate) fn parse_link(header: &str, rel: &str) -> Option<String> {
    let wanted = format!("rel=\"{rel}\"");
    header.split(',').find_map(|part| {
        let (url, params) = part.split_once(';')?;
        if params.split(';').any(|p| p.trim() == wanted) {
            let url = url.trim().trim_start_matches('<').trim_end_matches('>');
            Some(url.to_string())
        } else {
            None
        }
    })
}

pub(crate) fn page_number(url: &str) -> Option<u64> {
    let query = url.split_once('?')?.1;
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(key, _)| *key == "page")
        .and_then(|(_, value)| value.parse().ok())
}

// --- API response types ---

#[derive(Debug, Deserialize)]
struct RepoResponse {
    full_name: String,
    html_url: String,
    homepage: Option<String>,
    description: Option<String>,
    stargazers_count: u64,
    forks_count: u64,
    watchers_count: u64,
    subscribers_count: Option<u64>,
    open_issues_count: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    license: Option<LicenseResponse>,
    #[serde(default)]
    topics: Vec<String>,
    #[serde(default)]
    has_discussions: bool,
    #[serde(default)]
    archived: bool,
}

#[derive(Debug, Deserialize)]
struct LicenseResponse {
    spdx_id: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContributorItem {
    login: String,
    contributions: u64,
}

#[derive(Debug, Deserialize)]
struct CommitItem {
    commit: CommitDetail,
}

impl CommitItem {
    fn authored_at(&self) -> Option<DateTime<Utc>> {
        self.commit.author.as_ref().and_then(|a| a.date)
    }
}

#[derive(Debug, Deserialize)]
struct CommitDetail {
    author: Option<CommitAuthor>,
}

#[derive(Debug, Deserialize)]
struct CommitAuthor {
    date: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForkItem {
    owner: OwnerItem,
}

#[derive(Debug, Deserialize)]
struct OwnerItem {
    login: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct EventItem {
    #[serde(rename = "type")]
    kind: String,
    repo: EventRepo,
}

#[derive(Debug, Deserialize)]
struct EventRepo {
    name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINK: &str = "<https://api.github.com/repositories/1/commits?per_page=1&page=2>; rel=\"next\", \
                        <https://api.github.com/repositories/1/commits?per_page=1&page=341>; rel=\"last\"";

    #[test]
    fn parses_next_and_last_links() {
        assert_eq!(
            parse_link(LINK, "next").as_deref(),
            Some("https://api.github.com/repositories/1/commits?per_page=1&page=2")
        );
        let last = parse_link(LINK, "last").unwrap();
        assert_eq!(page_number(&last), Some(341));
        assert_eq!(parse_link(LINK, "prev"), None);
    }

    #[test]
    fn page_number_requires_exact_key() {
        assert_eq!(page_number("https://x/y?per_page=100"), None);
        assert_eq!(page_number("https://x/y?per_page=100&page=7"), Some(7));
        assert_eq!(page_number("https://x/y"), None);
    }

    #[test]
    fn rate_limits_are_distinguished() {
        assert!(classify_status(StatusCode::FORBIDDEN, Some("0"), "a/b").is_rate_limited());
        assert!(classify_status(StatusCode::TOO_MANY_REQUESTS, None, "a/b").is_rate_limited());
        assert!(matches!(
            classify_status(StatusCode::FORBIDDEN, Some("12"), "a/b"),
            NetworkError::Api { status: 403, .. }
        ));
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, None, "a/b"),
            NetworkError::NotFound(_)
        ));
    }

    #[test]
    fn commit_without_author_date_is_skipped() {
        let item: CommitItem = serde_json::from_str(r#"{"commit":{"author":null}}"#).unwrap();
        assert_eq!(item.authored_at(), None);
    }

    #[test]
    fn client_strips_trailing_slash() {
        let client = GitHubClient::new(GitHubConfig {
            api_url: "http://localhost:1/".to_string(),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(client.url("/users/x"), "http://localhost:1/users/x");
    }

    mod served {
        use super::*;
        use std::io::{BufRead, BufReader, Write};
        use std::net::TcpListener;

        struct Route {
            path: &'static str,
            status: u16,
            link: Option<&'static str>,
            body: &'static str,
        }

        fn route(path: &'static str, status: u16, link: Option<&'static str>, body: &'static str) -> Route {
            Route { path, status, link, body }
        }

        /// Serves canned responses on localhost; `{base}` in a Link header
        /// expands to the server's URL. Returns a client pointed at it.
        fn serve(routes: Vec<Route>) -> GitHubClient {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let base = format!("http://{}", listener.local_addr().unwrap());
            let links_base = base.clone();

            std::thread::spawn(move || {
                for stream in listener.incoming() {
                    let mut stream = stream.unwrap();
                    let mut reader = BufReader::new(stream.try_clone().unwrap());
                    let mut request_line = String::new();
                    reader.read_line(&mut request_line).unwrap();
                    loop {
                        let mut header = String::new();
                        if reader.read_line(&mut header).unwrap() == 0 || header == "\r\n" {
                            break;
                        }
                    }
                    let path = request_line.split_whitespace().nth(1).unwrap_or("");

                    let (status, link, body) = match routes.iter().find(|r| r.path == path) {
                        Some(r) => (r.status, r.link, r.body),
                        None => (404, None, r#"{"message":"Not Found"}"#),
                    };
                    let mut response = format!(
                        "HTTP/1.1 {status} Status\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
                        body.len()
                    );
                    if let Some(link) = link {
                        response.push_str(&format!("Link: {}\r\n", link.replace("{base}", &links_base)));
                    }
                    response.push_str("\r\n");
                    response.push_str(body);
                    stream.write_all(response.as_bytes()).unwrap();
                }
            });

            GitHubClient::new(GitHubConfig {
                api_url: base,
                ..Default::default()
            })
            .unwrap()
        }

        fn commit(date: &str) -> String {
            format!(r#"[{{"commit":{{"author":{{"date":"{date}"}}}}}}]"#)
        }

        #[test]
        fn commit_window_reads_oldest_commit_from_last_page() {
            let newest: &'static str = Box::leak(commit("2024-05-01T00:00:00Z").into_boxed_str());
            let oldest: &'static str = Box::leak(commit("2020-01-02T03:04:05Z").into_boxed_str());
            let client = serve(vec![
                route(
                    "/repos/o/r/commits?author=alice&per_page=1",
                    200,
                    Some(r#"<{base}/repos/o/r/commits?author=alice&per_page=1&page=3>; rel="last""#),
                    newest,
                ),
                route("/repos/o/r/commits?author=alice&per_page=1&page=3", 200, None, oldest),
                route("/repos/o/r/commits?author=ghost&per_page=1", 200, None, "[]"),
            ]);
            let repo: RepoName = "o/r".parse().unwrap();

            let window = client.commit_window(&repo, "alice").unwrap().unwrap();
            assert_eq!(window.first.to_rfc3339(), "2020-01-02T03:04:05+00:00");
            assert_eq!(window.last.to_rfc3339(), "2024-05-01T00:00:00+00:00");

            assert_eq!(client.commit_window(&repo, "ghost").unwrap(), None);
        }

        #[test]
        fn total_commits_handles_empty_and_paged_repositories() {
            let single: &'static str = Box::leak(commit("2024-05-01T00:00:00Z").into_boxed_str());
            let client = serve(vec![
                route(
                    "/repos/o/empty/commits?per_page=1",
                    409,
                    None,
                    r#"{"message":"Git Repository is empty."}"#,
                ),
                route(
                    "/repos/o/big/commits?per_page=1",
                    200,
                    Some(r#"<{base}/repos/o/big/commits?per_page=1&page=2>; rel="next", <{base}/repos/o/big/commits?per_page=1&page=42>; rel="last""#),
                    single,
                ),
                route("/repos/o/one/commits?per_page=1", 200, None, single),
            ]);

            assert_eq!(client.total_commits(&"o/empty".parse().unwrap()).unwrap(), 0);
            assert_eq!(client.total_commits(&"o/big".parse().unwrap()).unwrap(), 42);
            assert_eq!(client.total_commits(&"o/one".parse().unwrap()).unwrap(), 1);
        }

        #[test]
        fn contributors_follow_next_links() {
            let client = serve(vec![
                route(
                    "/repos/o/r/contributors?per_page=100",
                    200,
                    Some(r#"<{base}/repos/o/r/contributors?per_page=100&page=2>; rel="next""#),
                    r#"[{"login":"a","contributions":9},{"login":"b","contributions":4}]"#,
                ),
                route(
                    "/repos/o/r/contributors?per_page=100&page=2",
                    200,
                    None,
                    r#"[{"login":"c","contributions":1}]"#,
                ),
            ]);

            let contributors = client.contributors(&"o/r".parse().unwrap()).unwrap();
            let logins: Vec<&str> = contributors.iter().map(|c| c.login.as_str()).collect();
            assert_eq!(logins, vec!["a", "b", "c"]);

            let missing = client.contributors(&"o/gone".parse().unwrap()).unwrap_err();
            assert!(matches!(missing, NetworkError::NotFound(_)));
        }
    }
}
