use crate::error::{NetworkError, Result};
use anyhow::Context;
use console::style;
use indexmap::IndexMap;
use std::path::Path;

pub const DEFAULT_ORGANIZATION: &str = "My Organization";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputFormat {
    Repositories,
    Contributors,
}

/// A first line with a comma is a contributors CSV, an `owner/repo` first
/// line is a repository list; otherwise any comma in the file decides.
pub fn detect_format(contents: &str) -> InputFormat {
    let first = contents.lines().next().unwrap_or("").trim();
    if first.contains(',') {
        return InputFormat::Contributors;
    }
    if looks_like_repo(first) {
        return InputFormat::Repositories;
    }
    if contents.contains(',') {
        InputFormat::Contributors
    } else {
        InputFormat::Repositories
    }
}

fn looks_like_repo(line: &str) -> bool {
    let valid = |s: &str| {
        !s.is_empty()
            && s.chars()
                .all(|c| c.is_alphanumeric() || c == '_' || c == '.' || c == '-')
    };
    match line.split_once('/') {
        Some((owner, name)) => valid(owner) && valid(name),
        None => false,
    }
}

/// Non-blank lines not starting with `#`, trimmed, in input order.
pub fn read_repositories(contents: &str) -> Vec<String> {
    contents
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

/// `username,name` CSV with a header row. Rows without a username are
/// dropped; a missing name falls back to the username.
pub fn read_contributors(contents: &str) -> Result<IndexMap<String, String>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .flexible(true)
        .from_reader(contents.as_bytes());
    let headers = reader.headers()?.clone();
    let column = |name: &str| headers.iter().position(|h| h == name);
    let username_col = column("username").ok_or_else(|| {
        NetworkError::Other("contributors file needs a 'username' column".to_string())
    })?;
    let name_col = column("name");

    let mut out = IndexMap::new();
    for record in reader.records() {
        let record = record?;
        let username = record.get(username_col).unwrap_or("");
        if username.is_empty() {
            continue;
        }
        let name = name_col
            .and_then(|i| record.get(i))
            .filter(|n| !n.is_empty())
            .unwrap_or(username);
        out.insert(username.to_string(), name.to_string());
    }
    Ok(out)
}

fn quoted(s: &str) -> String {
    toml::Value::String(s.to_string()).to_string()
}

pub fn render_config(
    organization: &str,
    repositories: &[String],
    contributors: &IndexMap<String, String>,
) -> String {
    let mut out = String::new();
    out.push_str(&format!("title = {}\n", quoted(organization)));
    out.push_str(&format!("organization_name = {}\n", quoted(organization)));
    out.push_str("description = \"\"\n");
    out.push_str("author = \"\"\n\n");

    out.push_str("repositories = [\n");
    if repositories.is_empty() {
        out.push_str("    # Run \"contributor-network discover from-contributors\" to find repositories\n");
    }
    for repo in repositories {
        out.push_str(&format!("    {},\n", quoted(repo)));
    }
    out.push_str("]\n\n");

    out.push_str("[contributors.core]\n");
    if contributors.is_empty() {
        out.push_str("# Run \"contributor-network discover from-repositories\" to find contributors\n");
    }
    for (username, name) in contributors {
        out.push_str(&crate::discover::toml_member_line(username, name));
        out.push('\n');
    }
    out
}

pub fn exec(infile: &Path, output: &Path, organization: &str) -> anyhow::Result<()> {
    let contents = std::fs::read_to_string(infile)
        .with_context(|| format!("Failed to read {}", infile.display()))?;

    let format = detect_format(&contents);
    let rendered = match format {
        InputFormat::Repositories => {
            let repos = read_repositories(&contents);
            println!(
                "Detected repos file with {} repositories",
                style(repos.len()).cyan()
            );
            render_config(organization, &repos, &IndexMap::new())
        }
        InputFormat::Contributors => {
            let contributors =
                read_contributors(&contents).context("Failed to parse contributors file")?;
            println!(
                "Detected contributors file with {} contributors",
                style(contributors.len()).cyan()
            );
            render_config(organization, &[], &contributors)
        }
    };

    std::fs::write(output, rendered)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    println!("Wrote {}", output.display());
    println!();
    match format {
        InputFormat::Repositories => {
            println!("Next: run 'contributor-network discover from-repositories' to find contributors")
        }
        InputFormat::Contributors => {
            println!("Next: run 'contributor-network discover from-contributors' to find repositories")
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    #[test]
    fn detects_input_format() {
        assert_eq!(detect_format("owner/repo\nother/repo\n"), InputFormat::Repositories);
        assert_eq!(detect_format("username,name\nu1,User One\n"), InputFormat::Contributors);
        assert_eq!(detect_format("# repos\nowner/repo\n"), InputFormat::Repositories);
        assert_eq!(detect_format("# people\nu1,User One\n"), InputFormat::Contributors);
    }

    #[test]
    fn repository_list_is_kept_verbatim() {
        let input = "# tracked repos\nowner/one\n\n  owner/two.rs  \n#owner/skipped\nother-org/three\n";
        let repos = read_repositories(input);
        assert_eq!(repos, vec!["owner/one", "owner/two.rs", "other-org/three"]);

        let rendered = render_config("Example Org", &repos, &IndexMap::new());
        let cfg = Config::from_toml_str(&rendered).unwrap();
        let loaded: Vec<String> = cfg.repositories.iter().map(|r| r.to_string()).collect();
        assert_eq!(loaded, repos);
        assert_eq!(cfg.organization_name, "Example Org");
        assert!(cfg.contributors().is_empty());
    }

    #[test]
    fn contributors_become_core_group() {
        let input = "username,name\nu1,User One\nu2,\n,Nobody\n";
        let contributors = read_contributors(input).unwrap();
        assert_eq!(contributors.len(), 2);
        assert_eq!(contributors["u2"], "u2");

        let rendered = render_config("Org \"Quoted\"", &[], &contributors);
        let cfg = Config::from_toml_str(&rendered).unwrap();
        assert_eq!(cfg.organization_name, "Org \"Quoted\"");
        assert!(cfg.repositories.is_empty());
        assert_eq!(cfg.core_contributors()["u1"], "User One");
    }

    #[test]
    fn contributors_file_without_username_column_fails() {
        assert!(read_contributors("login,name\nu1,User\n").is_err());
    }
}
