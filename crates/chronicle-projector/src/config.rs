//! Daemon configuration.
//!
//! Settings come from an optional YAML file named by `CHRONICLE_CONFIG`,
//! overridden key by key by environment variables. `DATABASE_URL` must be
//! set in one of the two.

use std::path::Path;
use std::time::Duration;

use chronicle_core::projection::ProjectionMode;
use chronicle_core::retry::RetryPolicy;
use chronicle_core::snapshot::SnapshotPolicy;
use serde::Deserialize;

use crate::error::AppError;

/// Environment variable naming the YAML configuration file.
pub const CONFIG_FILE_VAR: &str = "CHRONICLE_CONFIG";

/// Runtime settings of the projection daemon.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectorConfig {
    /// `PostgreSQL` connection string.
    pub database_url: String,
    /// Pool size.
    pub database_max_connections: u32,
    /// Interval between polling sweeps, in milliseconds.
    pub poll_interval_ms: u64,
    /// Handler retries before a stream is halted.
    pub max_retries: u32,
    /// Delay before the first handler retry, in milliseconds.
    pub initial_backoff_ms: u64,
    /// Cap on handler retry delays, in milliseconds.
    pub max_backoff_ms: u64,
    /// Whether commands also project inline.
    pub projection_mode: ProjectionMode,
    /// When commands snapshot their aggregate.
    pub snapshot_policy: SnapshotPolicy,
    /// Rebuild every read model before entering the loop.
    pub rebuild_on_start: bool,
}

/// Keys accepted in the YAML file. Every key is optional.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FileConfig {
    database_url: Option<String>,
    database_max_connections: Option<u32>,
    poll_interval_ms: Option<u64>,
    max_retries: Option<u32>,
    initial_backoff_ms: Option<u64>,
    max_backoff_ms: Option<u64>,
    projection_mode: Option<ProjectionMode>,
    snapshot_policy: Option<SnapshotPolicy>,
    rebuild_on_start: Option<bool>,
}

impl ProjectorConfig {
    /// Reads the configuration from the process environment.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or parsed, a
    /// variable does not parse, or no database URL is configured.
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Reads the configuration through `lookup`, which stands in for the
    /// environment.
    ///
    /// # Errors
    ///
    /// Same as [`ProjectorConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let file = match lookup(CONFIG_FILE_VAR) {
            Some(path) => load_file(Path::new(&path))?,
            None => FileConfig::default(),
        };
        let defaults = RetryPolicy::default();

        let database_url = lookup("DATABASE_URL")
            .or(file.database_url)
            .ok_or_else(|| AppError::Config("DATABASE_URL must be set".to_owned()))?;

        Ok(Self {
            database_url,
            database_max_connections: parse_var(&lookup, "DATABASE_MAX_CONNECTIONS")?
                .or(file.database_max_connections)
                .unwrap_or(10),
            poll_interval_ms: parse_var(&lookup, "POLL_INTERVAL_MS")?
                .or(file.poll_interval_ms)
                .unwrap_or(1000),
            max_retries: parse_var(&lookup, "PROJECTOR_MAX_RETRIES")?
                .or(file.max_retries)
                .unwrap_or(defaults.max_retries),
            initial_backoff_ms: parse_var(&lookup, "PROJECTOR_INITIAL_BACKOFF_MS")?
                .or(file.initial_backoff_ms)
                .unwrap_or(millis(defaults.initial_delay)),
            max_backoff_ms: parse_var(&lookup, "PROJECTOR_MAX_BACKOFF_MS")?
                .or(file.max_backoff_ms)
                .unwrap_or(millis(defaults.max_delay)),
            projection_mode: file.projection_mode.unwrap_or_default(),
            snapshot_policy: file.snapshot_policy.unwrap_or_default(),
            rebuild_on_start: parse_var(&lookup, "PROJECTOR_REBUILD_ON_START")?
                .or(file.rebuild_on_start)
                .unwrap_or(false),
        })
    }

    /// Interval between polling sweeps.
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Handler retry policy built from the backoff settings.
    #[must_use]
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_backoff_ms),
            max_delay: Duration::from_millis(self.max_backoff_ms),
            ..RetryPolicy::default()
        }
    }
}

fn load_file(path: &Path) -> Result<FileConfig, AppError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| AppError::Config(format!("cannot read {}: {e}", path.display())))?;
    serde_yaml::from_str(&raw)
        .map_err(|e| AppError::Config(format!("invalid {}: {e}", path.display())))
}

fn parse_var<F, T>(lookup: &F, key: &str) -> Result<Option<T>, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|e| AppError::Config(format!("{key} is invalid: {e}")))
        })
        .transpose()
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::io::Write;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults_apply_when_only_database_url_is_set() {
        let config =
            ProjectorConfig::from_lookup(lookup(&[("DATABASE_URL", "postgres://db")])).unwrap();

        assert_eq!(config.database_url, "postgres://db");
        assert_eq!(config.database_max_connections, 10);
        assert_eq!(config.poll_interval(), Duration::from_secs(1));
        assert_eq!(config.retry_policy(), RetryPolicy::default());
        assert_eq!(config.projection_mode, ProjectionMode::Asynchronous);
        assert_eq!(config.snapshot_policy, SnapshotPolicy::Never);
        assert!(!config.rebuild_on_start);
    }

    #[test]
    fn test_missing_database_url_is_a_config_error() {
        let result = ProjectorConfig::from_lookup(lookup(&[]));

        match result {
            Err(AppError::Config(msg)) => assert!(msg.contains("DATABASE_URL")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_unparseable_variable_names_the_key() {
        let result = ProjectorConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("POLL_INTERVAL_MS", "soon"),
        ]));

        match result {
            Err(AppError::Config(msg)) => assert!(msg.contains("POLL_INTERVAL_MS")),
            other => panic!("expected Config error, got {other:?}"),
        }
    }

    #[test]
    fn test_environment_overrides_yaml_file() {
        // Arrange
        let path = std::env::temp_dir().join(format!(
            "chronicle-config-{}.yaml",
            std::process::id()
        ));
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "database_url: postgres://from-file\n\
             poll_interval_ms: 250\n\
             max_retries: 7\n\
             projection_mode: synchronous\n\
             snapshot_policy:\n  every: 50"
        )
        .unwrap();
        let path_str = path.to_string_lossy().into_owned();

        // Act
        let config = ProjectorConfig::from_lookup(lookup(&[
            (CONFIG_FILE_VAR, path_str.as_str()),
            ("PROJECTOR_MAX_RETRIES", "2"),
        ]))
        .unwrap();
        std::fs::remove_file(&path).unwrap();

        // Assert
        assert_eq!(config.database_url, "postgres://from-file");
        assert_eq!(config.poll_interval_ms, 250);
        assert_eq!(config.max_retries, 2);
        assert_eq!(config.projection_mode, ProjectionMode::Synchronous);
        assert_eq!(config.snapshot_policy, SnapshotPolicy::Every(50));
    }

    #[test]
    fn test_unknown_yaml_key_is_rejected() {
        let path = std::env::temp_dir().join(format!(
            "chronicle-config-unknown-{}.yaml",
            std::process::id()
        ));
        std::fs::write(&path, "database_uri: postgres://typo\n").unwrap();
        let path_str = path.to_string_lossy().into_owned();

        let result = ProjectorConfig::from_lookup(lookup(&[(CONFIG_FILE_VAR, path_str.as_str())]));
        std::fs::remove_file(&path).unwrap();

        assert!(matches!(result, Err(AppError::Config(_))));
    }

    #[test]
    fn test_retry_policy_uses_backoff_settings() {
        let config = ProjectorConfig::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://db"),
            ("PROJECTOR_INITIAL_BACKOFF_MS", "20"),
            ("PROJECTOR_MAX_BACKOFF_MS", "500"),
        ]))
        .unwrap();

        let policy = config.retry_policy();

        assert_eq!(policy.initial_delay, Duration::from_millis(20));
        assert_eq!(policy.max_delay, Duration::from_millis(500));
    }
}
