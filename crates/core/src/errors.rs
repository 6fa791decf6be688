//! Error types for the hg2git core library.
//!
//! Each subsystem has its own error type derived with `thiserror`, and a
//! top-level [`CoreError`] enum unifies them all for callers that want a
//! single error type.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Unified error type for the entire core library.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Process(#[from] ProcessError),

    #[error(transparent)]
    Mapping(#[from] MappingError),

    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Walk(#[from] WalkError),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and operator identity bootstrap.
///
/// Every variant is fatal to a run: no repository can be converted safely
/// without a valid configuration and a target identity.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// One of the forced global git settings could not be applied.
    #[error("failed to apply global git setting '{key}': {source}")]
    GlobalSetting {
        key: String,
        #[source]
        source: ProcessError,
    },

    /// The operator's name or email could not be read from git config.
    #[error("operator identity '{key}' is unavailable: {detail}")]
    IdentityUnavailable { key: String, detail: String },

    /// Global setup did not finish within its deadline.
    #[error("global git setup timed out after {0:?}")]
    Timeout(Duration),

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Process errors
// ---------------------------------------------------------------------------

/// Errors from running an external program.
#[derive(Debug, Error)]
pub enum ProcessError {
    /// The program could not be started (missing binary, permissions).
    #[error("failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// The program ran and exited unsuccessfully.
    #[error("`{command}` failed (exit {}): {}", display_code(.exit_code), .stderr.trim())]
    Failed {
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The program was killed after exceeding its deadline.
    #[error("`{command}` timed out after {after:?}")]
    TimedOut { command: String, after: Duration },
}

impl ProcessError {
    /// Whether this failure was caused by a deadline expiring.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }
}

fn display_code(code: &Option<i32>) -> String {
    match code {
        Some(c) => c.to_string(),
        None => "signal".into(),
    }
}

// ---------------------------------------------------------------------------
// Author mapping errors
// ---------------------------------------------------------------------------

/// Errors from building a repository's author mapping file.
#[derive(Debug, Error)]
pub enum MappingError {
    /// The author log query exceeded its deadline.
    #[error("author log query timed out after {0:?}")]
    Timeout(Duration),

    /// The author log query failed.
    #[error("author log query failed: {0}")]
    Query(#[source] ProcessError),

    /// Writing the mapping file failed.
    #[error("failed to write mapping file '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ---------------------------------------------------------------------------
// Repository conversion errors
// ---------------------------------------------------------------------------

/// Errors from converting a single repository. None of these are fatal to
/// the run; the walker logs them and moves on.
#[derive(Debug, Error)]
pub enum ConvertError {
    /// The repository path could not be resolved.
    #[error("cannot enter repository '{}': {source}", .path.display())]
    Enter {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stale converted state could not be removed.
    #[error("failed to reset git metadata in '{}': {source}", .path.display())]
    Reset {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `git init` failed.
    #[error("failed to initialize git repository in '{}': {source}", .path.display())]
    Init {
        path: PathBuf,
        #[source]
        source: ProcessError,
    },

    /// The author mapping could not be built.
    #[error("failed to build author mapping for '{}': {source}", .path.display())]
    Mapping {
        path: PathBuf,
        #[source]
        source: MappingError,
    },

    /// The external converter exited unsuccessfully.
    #[error("history conversion failed for '{}': {source}", .path.display())]
    Conversion {
        path: PathBuf,
        #[source]
        source: ProcessError,
    },

    /// Checking out the default branch failed.
    #[error("failed to check out '{branch}' in '{}': {source}", .path.display())]
    Finalize {
        path: PathBuf,
        branch: String,
        #[source]
        source: ProcessError,
    },
}

impl ConvertError {
    /// The repository this error belongs to.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Enter { path, .. }
            | Self::Reset { path, .. }
            | Self::Init { path, .. }
            | Self::Mapping { path, .. }
            | Self::Conversion { path, .. }
            | Self::Finalize { path, .. } => path,
        }
    }
}

// ---------------------------------------------------------------------------
// Walk errors
// ---------------------------------------------------------------------------

/// Errors from scanning the directory tree.
#[derive(Debug, Error)]
pub enum WalkError {
    /// A directory's entries could not be listed.
    #[error("cannot read directory '{}': {source}", .path.display())]
    DirectoryAccess {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_messages() {
        let err = ProcessError::Failed {
            command: "git init".into(),
            exit_code: Some(128),
            stderr: "fatal: not permitted\n".into(),
        };
        assert_eq!(err.to_string(), "`git init` failed (exit 128): fatal: not permitted");

        let err = ProcessError::Failed {
            command: "sh convert.sh".into(),
            exit_code: None,
            stderr: String::new(),
        };
        assert!(err.to_string().contains("exit signal"));

        let err = MappingError::Timeout(Duration::from_secs(10));
        assert_eq!(err.to_string(), "author log query timed out after 10s");

        let err = ConfigError::IdentityUnavailable {
            key: "user.email".into(),
            detail: "value is empty".into(),
        };
        assert!(err.to_string().contains("user.email"));
    }

    #[test]
    fn test_convert_error_path() {
        let err = ConvertError::Conversion {
            path: PathBuf::from("/srv/hg/a"),
            source: ProcessError::Failed {
                command: "sh".into(),
                exit_code: Some(1),
                stderr: String::new(),
            },
        };
        assert_eq!(err.path(), std::path::Path::new("/srv/hg/a"));
        assert!(err.to_string().contains("/srv/hg/a"));
    }

    #[test]
    fn test_core_error_from_subsystem() {
        let walk_err = WalkError::DirectoryAccess {
            path: PathBuf::from("/root"),
            source: std::io::Error::from(std::io::ErrorKind::PermissionDenied),
        };
        let core_err: CoreError = walk_err.into();
        assert!(matches!(core_err, CoreError::Walk(_)));

        let core_err: CoreError = ConfigError::Timeout(Duration::from_secs(60)).into();
        assert!(matches!(core_err, CoreError::Config(_)));
    }

    #[test]
    fn test_timeout_predicate() {
        let err = ProcessError::TimedOut {
            command: "hg log".into(),
            after: Duration::from_secs(10),
        };
        assert!(err.is_timeout());
    }
}
