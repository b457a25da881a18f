use std::path::PathBuf;
use tracing::{debug, warn};

const NETRC_HOSTS: &[&str] = &["api.github.com", "github.com"];

/// Token from the command line or `GITHUB_TOKEN`, falling back to `~/.netrc`.
pub fn resolve_token(explicit: Option<&str>) -> Option<String> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    if let Some(path) = netrc_path() {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            for host in NETRC_HOSTS {
                if let Some(token) = netrc_password(&contents, host) {
                    debug!(path = %path.display(), host, "using token from netrc");
                    return Some(token);
                }
            }
        }
    }

    warn!("no GitHub token found, using unauthenticated requests");
    None
}

fn netrc_path() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os("NETRC") {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".netrc"))
}

/// Password of the `machine` entry for `host`. Entries without a password
/// are ignored.
pub fn netrc_password(contents: &str, host: &str) -> Option<String> {
    let mut tokens = contents.split_whitespace();
    let mut in_host = false;

    while let Some(token) = tokens.next() {
        match token {
            "machine" => in_host = tokens.next() == Some(host),
            "default" => in_host = false,
            "password" => {
                let value = tokens.next();
                if in_host {
                    return value.map(str::to_string);
                }
            }
            "login" | "account" => {
                tokens.next();
            }
            _ => {}
        }
    }
    None
}
