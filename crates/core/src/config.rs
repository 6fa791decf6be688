//! TOML-based configuration for hg2git.
//!
//! Every field has a default, so an empty document (or no file at all) yields
//! the stock behaviour: `.hg` marker, `hg-fast-export.sh` under
//! `/tmp/fast-export`, `cp932` source encoding and a `main` default branch.

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::errors::ConfigError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration for a conversion run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConvertConfig {
    /// Source (Mercurial) settings.
    #[serde(default)]
    pub source: SourceConfig,

    /// Target (Git) settings.
    #[serde(default)]
    pub target: TargetConfig,

    /// External history converter settings.
    #[serde(default)]
    pub converter: ConverterConfig,

    /// Deadlines for bounded external invocations.
    #[serde(default)]
    pub timeouts: TimeoutConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

// ---------------------------------------------------------------------------
// Source
// ---------------------------------------------------------------------------

/// Mercurial-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Directory entry whose presence marks a repository root.
    #[serde(default = "default_marker")]
    pub marker: String,

    /// `hg` binary used for the author log query.
    #[serde(default = "default_hg_binary")]
    pub hg_binary: String,
}

fn default_marker() -> String {
    ".hg".into()
}
fn default_hg_binary() -> String {
    "hg".into()
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            marker: default_marker(),
            hg_binary: default_hg_binary(),
        }
    }
}

// ---------------------------------------------------------------------------
// Target
// ---------------------------------------------------------------------------

/// Git-side settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetConfig {
    /// `git` binary used for config, init and checkout.
    #[serde(default = "default_git_binary")]
    pub git_binary: String,

    /// Branch force-checked-out after a successful conversion.
    #[serde(default = "default_branch")]
    pub default_branch: String,
}

fn default_git_binary() -> String {
    "git".into()
}
fn default_branch() -> String {
    "main".into()
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self {
            git_binary: default_git_binary(),
            default_branch: default_branch(),
        }
    }
}

// ---------------------------------------------------------------------------
// Converter
// ---------------------------------------------------------------------------

/// How the external history converter is invoked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConverterConfig {
    /// Shell used to run the converter script.
    #[serde(default = "default_shell")]
    pub shell: String,

    /// Path to `hg-fast-export.sh`.
    #[serde(default = "default_script")]
    pub script: PathBuf,

    /// Source history encoding passed as `--fe`. Applied to every repository.
    #[serde(default = "default_encoding")]
    pub encoding: String,

    /// Directory for the transient authors files. `None` = system temp dir.
    #[serde(default)]
    pub authors_dir: Option<PathBuf>,
}

fn default_shell() -> String {
    "sh".into()
}
fn default_script() -> PathBuf {
    PathBuf::from("/tmp/fast-export/hg-fast-export.sh")
}
fn default_encoding() -> String {
    "cp932".into()
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            shell: default_shell(),
            script: default_script(),
            encoding: default_encoding(),
            authors_dir: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Deadlines for the two bounded phases. The history conversion itself is
/// never bounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeoutConfig {
    /// Total budget for global git settings plus identity queries.
    #[serde(default = "default_global_setup_secs")]
    pub global_setup_secs: u64,

    /// Budget for one repository's `hg log` author query.
    #[serde(default = "default_author_log_secs")]
    pub author_log_secs: u64,
}

fn default_global_setup_secs() -> u64 {
    60
}
fn default_author_log_secs() -> u64 {
    10
}

impl TimeoutConfig {
    pub fn global_setup(&self) -> Duration {
        Duration::from_secs(self.global_setup_secs)
    }

    pub fn author_log(&self) -> Duration {
        Duration::from_secs(self.author_log_secs)
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            global_setup_secs: default_global_setup_secs(),
            author_log_secs: default_author_log_secs(),
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Minimum tracing level: trace, debug, info, warn, error.
    /// `RUST_LOG` takes precedence when set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".into()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading & validation
// ---------------------------------------------------------------------------

impl ConvertConfig {
    /// Load a [`ConvertConfig`] from a TOML file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: ConvertConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty("source.marker", &self.source.marker)?;
        require_non_empty("source.hg_binary", &self.source.hg_binary)?;
        require_non_empty("target.git_binary", &self.target.git_binary)?;
        require_non_empty("target.default_branch", &self.target.default_branch)?;
        require_non_empty("converter.shell", &self.converter.shell)?;
        require_non_empty("converter.encoding", &self.converter.encoding)?;

        if self.converter.script.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "converter.script".into(),
                detail: "converter script path must not be empty".into(),
            });
        }

        // The marker is compared against single directory entry names.
        let mut components = Path::new(&self.source.marker).components();
        let single_normal = matches!(
            (components.next(), components.next()),
            (Some(Component::Normal(_)), None)
        );
        if !single_normal {
            return Err(ConfigError::InvalidValue {
                field: "source.marker".into(),
                detail: format!(
                    "marker must be a single directory entry name, got '{}'",
                    self.source.marker
                ),
            });
        }

        if self.timeouts.global_setup_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeouts.global_setup_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }
        if self.timeouts.author_log_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "timeouts.author_log_secs".into(),
                detail: "timeout must be > 0".into(),
            });
        }

        Ok(())
    }

    /// Convenience: load and validate in one call.
    pub fn load_and_validate<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config = Self::load_from_file(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Generate a commented TOML config template string.
    pub fn default_template() -> &'static str {
        r#"# hg2git configuration
# Every value below is the built-in default; delete what you don't change.

[source]
marker = ".hg"
hg_binary = "hg"

[target]
git_binary = "git"
default_branch = "main"

[converter]
shell = "sh"
script = "/tmp/fast-export/hg-fast-export.sh"
encoding = "cp932"
# authors_dir = "/var/tmp/hg2git"  # defaults to the system temp dir

[timeouts]
global_setup_secs = 60
author_log_secs = 10

[logging]
level = "info"
"#
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: field.into(),
            detail: "value must not be empty".into(),
        });
    }
    Ok(())
}
