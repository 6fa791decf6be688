//! Per-repository conversion.
//!
//! Linear state machine, aborting on the first failed step:
//! `Enter → Reset → Init → Map → Translate → Finalize`
//!
//! Every command runs with the repository root as an explicit working
//! directory, so the process-wide current directory is never changed and
//! needs no restoring. The transient authors file is an RAII temp file that
//! is removed on every exit path once it has been created.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, info, instrument, warn};

use crate::authors::AuthorMapper;
use crate::config::ConvertConfig;
use crate::errors::{ConvertError, MappingError};
use crate::identity::OperatorIdentity;
use crate::process::{CommandRunner, Invocation};

/// Name of the git metadata directory removed before re-initializing.
pub const GIT_DIR: &str = ".git";

/// Steps of a single repository conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversionStep {
    Enter,
    Reset,
    Init,
    Map,
    Translate,
    Finalize,
}

impl fmt::Display for ConversionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Enter => write!(f, "enter"),
            Self::Reset => write!(f, "reset"),
            Self::Init => write!(f, "init"),
            Self::Map => write!(f, "map"),
            Self::Translate => write!(f, "translate"),
            Self::Finalize => write!(f, "finalize"),
        }
    }
}

/// Resolved working context of the repository being converted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoContext {
    root: PathBuf,
}

impl RepoContext {
    /// Resolve `path` to an absolute, canonical repository root.
    pub fn enter(path: &Path) -> Result<Self, ConvertError> {
        let root = path.canonicalize().map_err(|source| ConvertError::Enter {
            path: path.to_path_buf(),
            source,
        })?;
        if !root.is_dir() {
            return Err(ConvertError::Enter {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "not a directory",
                ),
            });
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn git_dir(&self) -> PathBuf {
        self.root.join(GIT_DIR)
    }

    /// An invocation of `program` rooted in this repository.
    pub fn command(&self, program: &str) -> Invocation {
        Invocation::new(program).current_dir(&self.root)
    }
}

/// Converts one Mercurial repository to Git in place.
pub struct RepositoryConverter<R> {
    runner: Arc<R>,
    mapper: AuthorMapper<R>,
    identity: OperatorIdentity,
    config: ConvertConfig,
}

impl<R: CommandRunner> RepositoryConverter<R> {
    pub fn new(runner: Arc<R>, identity: OperatorIdentity, config: &ConvertConfig) -> Self {
        Self {
            mapper: AuthorMapper::new(Arc::clone(&runner), config),
            runner,
            identity,
            config: config.clone(),
        }
    }

    pub fn identity(&self) -> &OperatorIdentity {
        &self.identity
    }

    pub fn config(&self) -> &ConvertConfig {
        &self.config
    }

    /// Run the full conversion sequence for the repository at `repo`.
    #[instrument(skip(self), fields(repo = %repo.display()))]
    pub async fn convert(&self, repo: &Path) -> Result<(), ConvertError> {
        debug!(step = %ConversionStep::Enter, "resolving repository");
        let ctx = RepoContext::enter(repo)?;
        let path = ctx.root().to_path_buf();

        debug!(step = %ConversionStep::Reset, "removing previous git metadata");
        self.reset(&ctx).await?;

        debug!(step = %ConversionStep::Init, "initializing git repository");
        let init = ctx.command(&self.config.target.git_binary).arg("init");
        self.runner
            .run_checked(&init)
            .await
            .map_err(|source| ConvertError::Init {
                path: path.clone(),
                source,
            })?;

        debug!(step = %ConversionStep::Map, "building author mapping");
        let authors_file = self.authors_file(&path)?;
        let author_count = self
            .mapper
            .build_mapping(ctx.root(), authors_file.path(), &self.identity)
            .await
            .map_err(|source| ConvertError::Mapping {
                path: path.clone(),
                source,
            })?;

        info!(
            step = %ConversionStep::Translate,
            authors = author_count,
            "running history converter"
        );
        let translate = self.translate_command(&ctx, authors_file.path());
        let translated = self.runner.run_checked(&translate).await;

        // The mapping file is transient whatever the converter's outcome.
        let authors_path = authors_file.path().to_path_buf();
        if let Err(e) = authors_file.close() {
            warn!(file = %authors_path.display(), error = %e, "failed to remove authors file");
        }
        translated.map_err(|source| ConvertError::Conversion {
            path: path.clone(),
            source,
        })?;

        let branch = &self.config.target.default_branch;
        debug!(step = %ConversionStep::Finalize, branch = %branch, "checking out default branch");
        let checkout = ctx
            .command(&self.config.target.git_binary)
            .args(["checkout", branch.as_str(), "--force"]);
        self.runner
            .run_checked(&checkout)
            .await
            .map_err(|source| ConvertError::Finalize {
                path: path.clone(),
                branch: branch.clone(),
                source,
            })?;

        info!("repository converted");
        Ok(())
    }

    /// Remove any existing `.git` entry; absent is fine.
    async fn reset(&self, ctx: &RepoContext) -> Result<(), ConvertError> {
        let git_dir = ctx.git_dir();
        let removed = match tokio::fs::symlink_metadata(&git_dir).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&git_dir).await,
            Ok(_) => tokio::fs::remove_file(&git_dir).await,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => Err(e),
        };
        removed.map_err(|source| ConvertError::Reset {
            path: ctx.root().to_path_buf(),
            source,
        })
    }

    fn authors_file(&self, repo: &Path) -> Result<NamedTempFile, ConvertError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("authors-").suffix(".txt");
        let created = match &self.config.converter.authors_dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        };
        created.map_err(|source| ConvertError::Mapping {
            path: repo.to_path_buf(),
            source: MappingError::Io {
                path: self
                    .config
                    .converter
                    .authors_dir
                    .clone()
                    .unwrap_or_else(std::env::temp_dir),
                source,
            },
        })
    }

    /// `sh <script> -r . --force --fe <encoding> -A <authors>`
    fn translate_command(&self, ctx: &RepoContext, authors: &Path) -> Invocation {
        let converter = &self.config.converter;
        ctx.command(&converter.shell)
            .arg(&converter.script)
            .args(["-r", ".", "--force", "--fe", converter.encoding.as_str(), "-A"])
            .arg(authors)
            .inherit_output()
    }
}
