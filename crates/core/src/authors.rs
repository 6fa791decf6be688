//! Author mapping file generation.
//!
//! The converter's `-A` file maps every source author to the operator
//! identity, one line per distinct author:
//!
//! ```text
//! "jdoe"="Ann Example <ann@example.com>"
//! "Jane Doe <jane@example.org>"="Ann Example <ann@example.com>"
//! ```
//!
//! Author strings are kept as raw bytes: `hg log` prints them in the local
//! encoding and the converter matches them byte-for-byte.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use crate::config::ConvertConfig;
use crate::errors::{MappingError, ProcessError};
use crate::identity::OperatorIdentity;
use crate::process::{CommandRunner, Invocation};

/// Template asking `hg log` for one author line per changeset.
pub const AUTHOR_TEMPLATE: &str = "{author}\n";

/// Distinct author identities observed in one repository's history.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorSet {
    authors: BTreeSet<Vec<u8>>,
}

impl AuthorSet {
    /// Collect authors from `hg log` output: one per line, trimmed,
    /// duplicates collapsed.
    ///
    /// A blank line is a changeset with an empty author and maps as `""`.
    /// Only the empty remainder after the final newline is not a line.
    pub fn from_log(stdout: &[u8]) -> Self {
        if stdout.is_empty() {
            return Self::default();
        }
        let body = stdout.strip_suffix(b"\n").unwrap_or(stdout);
        let authors = body
            .split(|b| *b == b'\n')
            .map(<[u8]>::trim_ascii)
            .map(<[u8]>::to_vec)
            .collect();
        Self { authors }
    }

    pub fn len(&self) -> usize {
        self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }

    pub fn contains(&self, author: &str) -> bool {
        self.authors.contains(author.as_bytes())
    }

    /// Authors as lossy UTF-8, in sorted byte order.
    pub fn names(&self) -> Vec<String> {
        self.authors
            .iter()
            .map(|a| String::from_utf8_lossy(a).into_owned())
            .collect()
    }

    /// Render the mapping file contents for `identity`.
    pub fn render(&self, identity: &OperatorIdentity) -> Vec<u8> {
        let target = quote(identity.target_line().as_bytes());
        let mut out = Vec::new();
        for author in &self.authors {
            out.extend_from_slice(&quote(author));
            out.push(b'=');
            out.extend_from_slice(&target);
            out.push(b'\n');
        }
        out
    }
}

/// Wrap in double quotes, escaping `\` and `"`.
fn quote(raw: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(raw.len() + 2);
    out.push(b'"');
    for &b in raw {
        if b == b'"' || b == b'\\' {
            out.push(b'\\');
        }
        out.push(b);
    }
    out.push(b'"');
    out
}

/// Queries a repository's authors and writes its mapping file.
pub struct AuthorMapper<R> {
    runner: Arc<R>,
    hg: String,
    timeout: Duration,
}

impl<R: CommandRunner> AuthorMapper<R> {
    pub fn new(runner: Arc<R>, config: &ConvertConfig) -> Self {
        Self {
            runner,
            hg: config.source.hg_binary.clone(),
            timeout: config.timeouts.author_log(),
        }
    }

    /// Run `hg log -T "{author}\n"` in `repo` under the author-log deadline.
    pub async fn collect(&self, repo: &Path) -> Result<AuthorSet, MappingError> {
        let inv = Invocation::new(&self.hg)
            .args(["log", "-T", AUTHOR_TEMPLATE])
            .current_dir(repo)
            .timeout(self.timeout);

        let output = self.runner.run_checked(&inv).await.map_err(|e| match e {
            ProcessError::TimedOut { after, .. } => MappingError::Timeout(after),
            other => MappingError::Query(other),
        })?;

        let authors = AuthorSet::from_log(&output.stdout);
        debug!(repo = %repo.display(), count = authors.len(), "collected authors");
        Ok(authors)
    }

    /// Build the mapping file for `repo` at `output_file`, creating or
    /// truncating it. The file is written even when the history has no
    /// authors. Returns the number of distinct authors written.
    pub async fn build_mapping(
        &self,
        repo: &Path,
        output_file: &Path,
        identity: &OperatorIdentity,
    ) -> Result<usize, MappingError> {
        let authors = self.collect(repo).await?;
        write_mapping(output_file, &authors, identity).await?;
        info!(
            repo = %repo.display(),
            file = %output_file.display(),
            authors = authors.len(),
            "wrote author mapping"
        );
        Ok(authors.len())
    }
}

/// Write `authors` mapped to `identity` into `path`.
pub async fn write_mapping(
    path: &Path,
    authors: &AuthorSet,
    identity: &OperatorIdentity,
) -> Result<(), MappingError> {
    tokio::fs::write(path, authors.render(identity))
        .await
        .map_err(|source| MappingError::Io {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::testing::{RecordingRunner, Response};

    fn ann() -> OperatorIdentity {
        OperatorIdentity::new("Ann", "ann@x.com")
    }

    fn lines_of(path: &Path) -> HashSet<String> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect()
    }

    #[test]
    fn test_from_log_dedups_and_trims() {
        let set = AuthorSet::from_log(b"alice\n  bob \r\nalice\n");
        assert_eq!(set.len(), 2);
        assert!(set.contains("alice"));
        assert!(set.contains("bob"));
        assert_eq!(set.names(), vec!["alice", "bob"]);
    }

    #[test]
    fn test_from_log_keeps_blank_author() {
        let set = AuthorSet::from_log(b"alice\n\nbob\n");
        assert_eq!(set.len(), 3);
        assert!(set.contains(""));
        assert!(set.contains("alice"));
        assert!(set.contains("bob"));

        // Whitespace-only authors trim to the same empty identity.
        let set = AuthorSet::from_log(b"alice\n \t\n\n");
        assert_eq!(set.len(), 2);
        assert!(set.contains(""));

        assert_eq!(AuthorSet::from_log(b"alice\n").len(), 1);
        assert_eq!(AuthorSet::from_log(b"alice").len(), 1);
    }

    #[test]
    fn test_render_blank_author() {
        let set = AuthorSet::from_log(b"\nalice\n");
        let rendered = String::from_utf8(set.render(&ann())).unwrap();
        assert_eq!(
            rendered,
            "\"\"=\"Ann <ann@x.com>\"\n\"alice\"=\"Ann <ann@x.com>\"\n"
        );
    }

    #[test]
    fn test_from_empty_log() {
        assert!(AuthorSet::from_log(b"").is_empty());
        // One changeset whose author is empty.
        let set = AuthorSet::from_log(b"\n");
        assert_eq!(set.len(), 1);
        assert!(set.contains(""));
    }

    #[test]
    fn test_render_escapes_quotes() {
        let set = AuthorSet::from_log(b"say \"hi\" <a\\b@x>\n");
        let rendered = String::from_utf8(set.render(&ann())).unwrap();
        assert_eq!(rendered, "\"say \\\"hi\\\" <a\\\\b@x>\"=\"Ann <ann@x.com>\"\n");
    }

    #[test]
    fn test_render_keeps_non_utf8_bytes() {
        // "山田" in Shift_JIS.
        let sjis = [0x8e, 0x52, 0x93, 0x63];
        let mut log = sjis.to_vec();
        log.push(b'\n');
        let rendered = AuthorSet::from_log(&log).render(&ann());
        assert_eq!(&rendered[1..5], &sjis);
    }

    #[tokio::test]
    async fn test_build_mapping_two_authors() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("authors.txt");
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("hg", &["log"], Response::stdout("alice\nbob\nalice\n"));

        let mapper = AuthorMapper::new(runner.clone(), &ConvertConfig::default());
        let count = mapper.build_mapping(dir.path(), &out, &ann()).await.unwrap();

        assert_eq!(count, 2);
        let expected: HashSet<String> = [
            "\"alice\"=\"Ann <ann@x.com>\"".to_string(),
            "\"bob\"=\"Ann <ann@x.com>\"".to_string(),
        ]
        .into_iter()
        .collect();
        assert_eq!(lines_of(&out), expected);

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].args, vec!["log", "-T", "{author}\n"]);
        assert_eq!(calls[0].cwd.as_deref(), Some(dir.path()));
        assert_eq!(calls[0].timeout, Some(Duration::from_secs(10)));
    }

    #[tokio::test]
    async fn test_build_mapping_empty_history_still_creates_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("authors.txt");
        let runner = Arc::new(RecordingRunner::new());

        let mapper = AuthorMapper::new(runner, &ConvertConfig::default());
        let count = mapper.build_mapping(dir.path(), &out, &ann()).await.unwrap();

        assert_eq!(count, 0);
        assert!(out.exists());
        assert_eq!(std::fs::read(&out).unwrap(), Vec::<u8>::new());
    }

    #[tokio::test]
    async fn test_build_mapping_truncates_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("authors.txt");
        std::fs::write(&out, "\"stale\"=\"Old <old@x.com>\"\n").unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("hg", &["log"], Response::stdout("carol\n"));

        let mapper = AuthorMapper::new(runner, &ConvertConfig::default());
        mapper.build_mapping(dir.path(), &out, &ann()).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&out).unwrap(),
            "\"carol\"=\"Ann <ann@x.com>\"\n"
        );
    }

    #[tokio::test]
    async fn test_log_timeout_maps_to_timeout_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("authors.txt");
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("hg", &["log"], Response::Timeout);

        let mapper = AuthorMapper::new(runner, &ConvertConfig::default());
        let err = mapper.build_mapping(dir.path(), &out, &ann()).await.unwrap_err();

        assert!(matches!(err, MappingError::Timeout(d) if d == Duration::from_secs(10)));
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_log_failure_maps_to_query_error() {
        let dir = tempfile::tempdir().unwrap();
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("hg", &["log"], Response::fail(255, "abort: no repository found"));

        let mapper = AuthorMapper::new(runner, &ConvertConfig::default());
        let err = mapper.collect(dir.path()).await.unwrap_err();
        assert!(matches!(err, MappingError::Query(ProcessError::Failed { .. })));
    }

    #[tokio::test]
    async fn test_unwritable_output_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("missing-dir").join("authors.txt");
        let runner = Arc::new(RecordingRunner::new());

        let mapper = AuthorMapper::new(runner, &ConvertConfig::default());
        let err = mapper.build_mapping(dir.path(), &out, &ann()).await.unwrap_err();
        assert!(matches!(err, MappingError::Io { .. }));
    }
}
