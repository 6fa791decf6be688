//! hg2git command-line tool.
//!
//! Run with no arguments in a directory tree to convert every Mercurial
//! repository below it to Git in place. `scan` lists what would be converted
//! and `init` writes a configuration template.

mod style;

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, Subscriber};
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, reload, EnvFilter, Registry};

use hg2git_core::config::ConvertConfig;
use hg2git_core::walker::{discover, Discovery};
use hg2git_core::{IdentityProvider, ProcessRunner, RepositoryConverter, TreeWalker, WalkSummary};

// ---------------------------------------------------------------------------
// CLI argument definitions
// ---------------------------------------------------------------------------

/// Batch-convert Mercurial repositories to Git.
#[derive(Parser, Debug)]
#[command(
    name = "hg2git",
    version,
    about = "Convert every Mercurial repository below a directory to Git"
)]
struct Cli {
    /// Path to a TOML configuration file. Built-in defaults apply without one.
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Root of the directory tree to scan.
    #[arg(short, long, global = true, default_value = ".")]
    root: PathBuf,

    /// Print the result as JSON instead of a styled summary.
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert every repository found (the default).
    Convert,

    /// List the repositories that would be converted.
    Scan,

    /// Write a configuration template.
    Init {
        /// Output path for the generated config file.
        #[arg(short, long, default_value = "./hg2git.toml")]
        output: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{}", style::error(&format!("{:#}", e)));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    // Logging starts before the config is read so its loading is traced.
    let env_filter = EnvFilter::try_from_default_env().ok();
    let level_from_env = env_filter.is_some();
    let (subscriber, filter) = logging_subscriber(
        env_filter.unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_LEVEL)),
        std::io::stderr,
    );
    subscriber.init();

    if let Some(Commands::Init { output }) = &cli.command {
        return cmd_init(output);
    }

    let config = load_config(cli.config.as_deref())?;
    if !level_from_env {
        apply_log_level(&filter, &config.logging.level)?;
    }

    match cli.command {
        None | Some(Commands::Convert) => cmd_convert(&config, &cli.root, cli.json).await,
        Some(Commands::Scan) => cmd_scan(&config, &cli.root, cli.json),
        Some(Commands::Init { .. }) => unreachable!("handled above"),
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

/// Level used until the config's `logging.level` is known.
const DEFAULT_LOG_LEVEL: &str = "info";

type FilterHandle = reload::Handle<EnvFilter, Registry>;

/// Build the fmt subscriber with a reloadable filter.
///
/// `RUST_LOG` wins when set; otherwise the filter starts at
/// [`DEFAULT_LOG_LEVEL`] and is swapped for `logging.level` once the config
/// is loaded.
fn logging_subscriber<W>(
    filter: EnvFilter,
    writer: W,
) -> (impl Subscriber + Send + Sync + 'static, FilterHandle)
where
    W: for<'w> MakeWriter<'w> + Send + Sync + 'static,
{
    let (filter, handle) = reload::Layer::new(filter);
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(writer));
    (subscriber, handle)
}

fn apply_log_level(handle: &FilterHandle, level: &str) -> Result<()> {
    handle
        .reload(EnvFilter::new(level))
        .with_context(|| format!("failed to apply logging.level '{}'", level))
}

fn load_config(path: Option<&str>) -> Result<ConvertConfig> {
    let config = match path {
        Some(p) => {
            let p = expand_tilde(p);
            ConvertConfig::load_and_validate(&p)
                .with_context(|| format!("failed to load configuration file {}", p))?
        }
        None => ConvertConfig::default(),
    };
    Ok(config)
}

// ---------------------------------------------------------------------------
// Subcommand implementations
// ---------------------------------------------------------------------------

async fn cmd_convert(config: &ConvertConfig, root: &Path, json: bool) -> Result<()> {
    let runner = Arc::new(ProcessRunner);

    // Fatal: without a target identity no repository can be converted.
    let identity = IdentityProvider::bootstrap(Arc::clone(&runner), config)
        .await
        .context("failed to set up global git configuration")?;

    let converter = RepositoryConverter::new(runner, identity, config);
    let walker = TreeWalker::new(converter);
    let summary = walker
        .walk(root)
        .await
        .with_context(|| format!("failed to scan {}", root.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        print_summary(&summary);
    }
    // Per-repository failures are reported, not reflected in the exit code.
    Ok(())
}

fn cmd_scan(config: &ConvertConfig, root: &Path, json: bool) -> Result<()> {
    info!(root = %root.display(), "scanning without converting");
    let found = discover(root, &config.source.marker)
        .with_context(|| format!("failed to scan {}", root.display()))?;
    if json {
        println!("{}", serde_json::to_string_pretty(&found)?);
    } else {
        print_discovery(&found);
    }
    Ok(())
}

fn cmd_init(output: &Path) -> Result<()> {
    if output.exists() {
        anyhow::bail!(
            "file already exists: {}. Use a different path or remove the existing file.",
            output.display()
        );
    }

    std::fs::write(output, ConvertConfig::default_template())
        .context("failed to write config file")?;

    println!("Default configuration written to {}", output.display());
    println!();
    println!("Next steps:");
    println!("  1. Point converter.script at your hg-fast-export.sh");
    println!("  2. Adjust converter.encoding if your history is not cp932");
    println!("  3. Run: hg2git --config {}", output.display());
    Ok(())
}

// ---------------------------------------------------------------------------
// Output
// ---------------------------------------------------------------------------

fn print_summary(summary: &WalkSummary) {
    println!();
    println!("{}", style::header("Conversion summary"));
    for repo in &summary.converted {
        println!("  {}", style::success(&repo.display().to_string()));
    }
    for failed in &summary.failed {
        println!(
            "  {}",
            style::error(&format!("{}: {}", failed.path.display(), failed.error))
        );
    }
    for dir in &summary.unreadable {
        println!(
            "  {}",
            style::warn(&format!("{} (skipped): {}", dir.path.display(), dir.error))
        );
    }
    println!();
    println!(
        "{}",
        style::dim(&format!(
            "{} attempted: {} converted, {} failed; {} unreadable directories",
            summary.attempted(),
            summary.converted.len(),
            summary.failed.len(),
            summary.unreadable.len()
        ))
    );
}

fn print_discovery(found: &Discovery) {
    for repo in &found.repositories {
        println!("{}", repo.display());
    }
    for dir in &found.unreadable {
        eprintln!(
            "{}",
            style::warn(&format!("{} (skipped): {}", dir.path.display(), dir.error))
        );
    }
    eprintln!(
        "{}",
        style::dim(&format!("{} repositories found", found.repositories.len()))
    );
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Mutex;

    use super::*;

    /// Log sink shared between the subscriber and the test.
    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    #[test]
    fn test_config_loading_is_logged_before_level_applies() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("hg2git.toml");
        std::fs::write(&path, "[logging]\nlevel = \"warn\"\n").unwrap();

        let sink = Captured::default();
        let writer = sink.clone();
        let (subscriber, filter) =
            logging_subscriber(EnvFilter::new(DEFAULT_LOG_LEVEL), move || writer.clone());

        tracing::subscriber::with_default(subscriber, || {
            let config = load_config(path.to_str()).unwrap();
            assert_eq!(config.logging.level, "warn");
            apply_log_level(&filter, &config.logging.level).unwrap();
            info!("suppressed after reload");
            tracing::warn!("still shown after reload");
        });

        let logged = sink.text();
        assert!(logged.contains("loading configuration"), "{}", logged);
        assert!(!logged.contains("suppressed after reload"), "{}", logged);
        assert!(logged.contains("still shown after reload"), "{}", logged);
    }

    #[test]
    fn test_no_subcommand_means_convert() {
        let cli = Cli::parse_from(["hg2git"]);
        assert!(cli.command.is_none());
        assert_eq!(cli.root, PathBuf::from("."));
        assert!(cli.config.is_none());
        assert!(!cli.json);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["hg2git", "scan", "--root", "/srv/hg", "-c", "x.toml", "--json"]);
        assert!(matches!(cli.command, Some(Commands::Scan)));
        assert!(cli.json);
        assert_eq!(cli.root, PathBuf::from("/srv/hg"));
        assert_eq!(cli.config.as_deref(), Some("x.toml"));
    }

    #[test]
    fn test_expand_tilde_leaves_plain_paths() {
        assert_eq!(expand_tilde("/etc/hg2git.toml"), "/etc/hg2git.toml");
        assert_eq!(expand_tilde("relative.toml"), "relative.toml");
    }
}
