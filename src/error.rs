use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, NetworkError>;

#[derive(Error, Debug)]
pub enum NetworkError {
    #[error("failed to read config file '{path}': {source}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    ConfigInvalid(String),
    #[error("Invalid repository name '{0}': expected 'owner/name'")]
    InvalidRepoName(String),
    #[error("Rate limit exceeded while fetching {0}")]
    RateLimited(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Authentication failed: {0}")]
    Auth(String),
    #[error("GitHub API returned {status} for {entity}")]
    Api { status: u16, entity: String },
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Walk error: {0}")]
    Walk(#[from] ignore::Error),
    #[error("Record error in {path}: {message}")]
    Record { path: PathBuf, message: String },
    #[error("Other: {0}")]
    Other(String),
}

impl NetworkError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, NetworkError::RateLimited(_))
    }

    /// Errors raised by the remote API. These are skipped per item; everything
    /// else aborts the run.
    pub fn is_api(&self) -> bool {
        matches!(
            self,
            NetworkError::RateLimited(_)
                | NetworkError::NotFound(_)
                | NetworkError::Auth(_)
                | NetworkError::Api { .. }
                | NetworkError::Http(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_are_classified() {
        assert!(NetworkError::RateLimited("a/b".into()).is_api());
        assert!(NetworkError::RateLimited("a/b".into()).is_rate_limited());
        assert!(NetworkError::Api { status: 500, entity: "a/b".into() }.is_api());
        assert!(!NetworkError::Io(std::io::Error::other("disk")).is_api());
        assert!(!NetworkError::NotFound("a/b".into()).is_rate_limited());
    }
}
