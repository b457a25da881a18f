use crate::error::{NetworkError, Result};
use crate::model::{Link, RepoName, Repository};
use ignore::WalkBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

const REPOSITORIES_DIR: &str = "repositories";
const LINKS_DIR: &str = "links";

/// Content directory holding one JSON record per repository and one per
/// (repository, contributor) pair.
pub struct RecordStore {
    root: PathBuf,
}

impl RecordStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn repository_path(&self, repo: &RepoName) -> PathBuf {
        self.root
            .join(REPOSITORIES_DIR)
            .join(repo.owner())
            .join(format!("{}.json", repo.name()))
    }

    pub fn link_path(&self, repo: &RepoName, login: &str) -> PathBuf {
        self.root
            .join(LINKS_DIR)
            .join(repo.owner())
            .join(repo.name())
            .join(format!("{login}.json"))
    }

    pub fn get_repository(&self, repo: &RepoName) -> Result<Option<Repository>> {
        read_optional(&self.repository_path(repo))
    }

    pub fn put_repository(&self, repo: &RepoName, record: &Repository) -> Result<()> {
        write_record(&self.repository_path(repo), record)
    }

    pub fn get_link(&self, repo: &RepoName, login: &str) -> Result<Option<Link>> {
        read_optional(&self.link_path(repo, login))
    }

    pub fn put_link(&self, repo: &RepoName, login: &str, link: &Link) -> Result<()> {
        write_record(&self.link_path(repo, login), link)
    }

    pub fn load_repositories(&self) -> Result<Vec<Repository>> {
        load_all(&self.root.join(REPOSITORIES_DIR))
    }

    pub fn load_links(&self) -> Result<Vec<Link>> {
        load_all(&self.root.join(LINKS_DIR))
    }
}

fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    read_record(path).map(Some)
}

fn read_record<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let contents = std::fs::read_to_string(path)?;
    serde_json::from_str(&contents).map_err(|e| NetworkError::Record {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn write_record<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serde_json::to_string_pretty(record)?)?;
    Ok(())
}

fn load_all<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths = Vec::new();
    for entry in WalkBuilder::new(dir).standard_filters(false).build() {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path.to_path_buf());
        }
    }
    paths.sort();

    paths.iter().map(|p| read_record(p)).collect()
}
