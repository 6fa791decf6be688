//! Operator identity bootstrap.
//!
//! Every historical author in every converted repository is rewritten to a
//! single operator identity, read once from the global git configuration.
//! The same bootstrap also forces the two global git settings the converter
//! relies on for path fidelity.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::config::ConvertConfig;
use crate::errors::ConfigError;
use crate::process::{CommandRunner, Invocation};

/// Global git settings applied before any repository-local command runs.
pub const GLOBAL_SETTINGS: [(&str, &str); 2] =
    [("core.ignoreCase", "false"), ("core.quotepath", "false")];

/// The `(name, email)` pair all source authors are mapped to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperatorIdentity {
    pub name: String,
    pub email: String,
}

impl OperatorIdentity {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }

    /// The target identity line, `name <email>`.
    pub fn target_line(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for OperatorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} <{}>", self.name, self.email)
    }
}

/// Applies global git settings and reads the operator identity.
pub struct IdentityProvider<R> {
    runner: Arc<R>,
    git: String,
}

impl<R: CommandRunner> IdentityProvider<R> {
    pub fn new(runner: Arc<R>, config: &ConvertConfig) -> Self {
        Self {
            runner,
            git: config.target.git_binary.clone(),
        }
    }

    /// Force the global settings, then load the operator identity, all within
    /// the `timeouts.global_setup_secs` budget.
    ///
    /// Any failure here is fatal to the run.
    pub async fn bootstrap(
        runner: Arc<R>,
        config: &ConvertConfig,
    ) -> Result<OperatorIdentity, ConfigError> {
        let provider = Self::new(runner, config);
        let budget = config.timeouts.global_setup();

        // Dropping the in-flight future on expiry kills its child process.
        match tokio::time::timeout(budget, async {
            provider.apply_global_settings().await?;
            provider.load().await
        })
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ConfigError::Timeout(budget)),
        }
    }

    /// Force `core.ignoreCase=false` and `core.quotepath=false` globally.
    #[instrument(skip(self))]
    pub async fn apply_global_settings(&self) -> Result<(), ConfigError> {
        for (key, value) in GLOBAL_SETTINGS {
            let inv = Invocation::new(&self.git).args(["config", "--global", key, value]);
            self.runner
                .run_checked(&inv)
                .await
                .map_err(|source| ConfigError::GlobalSetting {
                    key: key.to_string(),
                    source,
                })?;
            debug!(key, value, "applied global git setting");
        }
        Ok(())
    }

    /// Read `user.name` and `user.email` from the global git config.
    pub async fn load(&self) -> Result<OperatorIdentity, ConfigError> {
        let name = self.read_global("user.name").await?;
        let email = self.read_global("user.email").await?;
        let identity = OperatorIdentity { name, email };
        info!(identity = %identity, "loaded operator identity");
        Ok(identity)
    }

    async fn read_global(&self, key: &str) -> Result<String, ConfigError> {
        let inv = Invocation::new(&self.git).args(["config", "--global", key]);
        let output = self.runner.run_checked(&inv).await.map_err(|e| {
            ConfigError::IdentityUnavailable {
                key: key.to_string(),
                detail: e.to_string(),
            }
        })?;

        let value = String::from_utf8(output.stdout).map_err(|_| {
            ConfigError::IdentityUnavailable {
                key: key.to_string(),
                detail: "value is not valid UTF-8".into(),
            }
        })?;
        let value = value.trim();
        if value.is_empty() {
            return Err(ConfigError::IdentityUnavailable {
                key: key.to_string(),
                detail: "value is empty".into(),
            });
        }
        Ok(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{RecordingRunner, Response};

    fn runner_with_identity(name: &str, email: &str) -> Arc<RecordingRunner> {
        let runner = Arc::new(RecordingRunner::new());
        runner
            .respond("git", &["config", "--global", "user.name"], Response::stdout(name))
            .respond("git", &["config", "--global", "user.email"], Response::stdout(email));
        runner
    }

    #[tokio::test]
    async fn test_bootstrap_trims_and_applies_settings_first() {
        let runner = runner_with_identity("  Ann Example \n", "ann@x.com\n");
        let identity = IdentityProvider::bootstrap(runner.clone(), &ConvertConfig::default())
            .await
            .unwrap();

        assert_eq!(identity, OperatorIdentity::new("Ann Example", "ann@x.com"));
        assert_eq!(identity.target_line(), "Ann Example <ann@x.com>");
        assert_eq!(
            runner.command_lines(),
            vec![
                "git config --global core.ignoreCase false",
                "git config --global core.quotepath false",
                "git config --global user.name",
                "git config --global user.email",
            ]
        );
    }

    #[tokio::test]
    async fn test_name_query_failure_is_fatal() {
        let runner = Arc::new(RecordingRunner::new());
        runner.respond("git", &["config", "--global", "user.name"], Response::fail(1, ""));

        let err = IdentityProvider::bootstrap(runner.clone(), &ConvertConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::IdentityUnavailable { ref key, .. } if key == "user.name"
        ));
        // The email is never queried once the name is missing.
        assert_eq!(runner.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_empty_email_is_rejected() {
        let runner = runner_with_identity("Ann", "  \n");
        let err = IdentityProvider::bootstrap(runner, &ConvertConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::IdentityUnavailable { ref key, .. } if key == "user.email"
        ));
    }

    #[tokio::test]
    async fn test_global_setting_failure_stops_bootstrap() {
        let runner = runner_with_identity("Ann", "ann@x.com");
        runner.respond("git", &["config", "--global", "core.quotepath"], Response::SpawnError);

        let err = IdentityProvider::bootstrap(runner.clone(), &ConvertConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::GlobalSetting { ref key, .. } if key == "core.quotepath"
        ));
        assert_eq!(runner.calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bootstrap_deadline() {
        let runner = Arc::new(RecordingRunner::new());
        runner
            .respond("git", &["config", "--global", "user.name"], Response::stdout("Ann"))
            .respond("git", &["config", "--global", "user.email"], Response::Hang);

        let err = IdentityProvider::bootstrap(runner, &ConvertConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::Timeout(d) if d == Duration::from_secs(60)));
    }
}
