//! Errors raised while locating, reading or validating the configuration.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    /// A setting holds a value the client cannot run with.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Cannot access {}: {source}", .path.display())]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed config file {}: {source}", .path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid server URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// There is no home directory to place `~/.panelkit` under.
    #[error("Could not determine home directory")]
    NoHome,
}

impl CoreError {
    pub(crate) fn file(path: &Path) -> impl FnOnce(std::io::Error) -> Self + '_ {
        move |source| CoreError::File {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(path: &Path) -> impl FnOnce(serde_json::Error) -> Self + '_ {
        move |source| CoreError::Malformed {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Result type alias using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_errors_name_the_path() {
        let err = CoreError::file(Path::new("/tmp/panelkit/config.json"))(
            std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        );
        let message = err.to_string();
        assert!(message.contains("/tmp/panelkit/config.json"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
