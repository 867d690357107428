use crate::{
    cache::OptimisticPolicy,
    error::ConfigError,
    logging::LoggingConfig,
    notification::NotificationTimings,
    query::QueryKey,
};
use serde::{
    Deserialize,
    Serialize,
};
use std::{
    path::PathBuf,
    time::Duration,
};

/// Balance below which a fee-paying account is asked to top up, in wei.
pub const DEFAULT_FEE_CEILING: u128 = 1_000_000_000_000_000;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimisticKey {
    pub key: QueryKey,
    pub max_ignored_empty: u32,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub indexer_url: Option<String>,
    pub poll_interval_ms: u64,
    pub status_poll_interval_ms: u64,
    pub notification_ms: u64,
    pub error_notification_ms: u64,
    pub fee_ceiling: u128,
    pub optimistic_keys: Vec<OptimisticKey>,
    pub logging: LoggingConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            indexer_url: None,
            poll_interval_ms: 5000,
            status_poll_interval_ms: 2000,
            notification_ms: 2000,
            error_notification_ms: 5000,
            fee_ceiling: DEFAULT_FEE_CEILING,
            optimistic_keys: vec![
                OptimisticKey {
                    key: QueryKey::AdventurersByOwner,
                    max_ignored_empty: 3,
                },
                OptimisticKey {
                    key: QueryKey::ItemsByAdventurer,
                    max_ignored_empty: 3,
                },
            ],
            logging: LoggingConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Reads a JSON config file; `~` in the path is expanded.
    pub fn load(path: impl AsRef<str>) -> Result<Self, ConfigError> {
        let path = PathBuf::from(shellexpand::tilde(path.as_ref()).into_owned());
        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn status_poll_interval(&self) -> Duration {
        Duration::from_millis(self.status_poll_interval_ms)
    }

    pub fn timings(&self) -> NotificationTimings {
        NotificationTimings {
            standard: Duration::from_millis(self.notification_ms),
            error: Duration::from_millis(self.error_notification_ms),
        }
    }

    pub fn optimistic_policies(&self) -> impl Iterator<Item = (QueryKey, OptimisticPolicy)> + '_ {
        self.optimistic_keys.iter().map(|optimistic| {
            (
                optimistic.key,
                OptimisticPolicy {
                    max_ignored_empty: optimistic.max_ignored_empty,
                },
            )
        })
    }
}

#[cfg(test)]
mod tests {
    #![allow(non_snake_case)]
    use super::*;
    use std::io::Write;
    use tempdir::TempDir;

    #[test]
    fn load__fills_missing_fields_with_defaults() {
        // given
        let dir = TempDir::new("survivor-sync-config").unwrap();
        let path = dir.path().join("sync.json");
        let mut file = std::fs::File::create(&path).unwrap();
        write!(
            file,
            r#"{{"indexer_url": "http://localhost:8080", "poll_interval_ms": 1500, "optimistic_keys": []}}"#
        )
        .unwrap();

        // when
        let config = SyncConfig::load(path.to_string_lossy()).unwrap();

        // then
        assert_eq!(config.indexer_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.poll_interval(), Duration::from_millis(1500));
        assert_eq!(config.status_poll_interval(), Duration::from_millis(2000));
        assert_eq!(config.timings(), NotificationTimings::default());
        assert_eq!(config.optimistic_policies().count(), 0);
        assert_eq!(config.fee_ceiling, DEFAULT_FEE_CEILING);
    }

    #[test]
    fn load__reports_missing_file_with_path() {
        // given
        let dir = TempDir::new("survivor-sync-config").unwrap();
        let path = dir.path().join("missing.json");

        // when
        let result = SyncConfig::load(path.to_string_lossy());

        // then
        match result {
            Err(ConfigError::Io { path: reported, .. }) => assert_eq!(reported, path),
            other => panic!("expected io error, got {other:?}"),
        }
    }

    #[test]
    fn load__rejects_malformed_json() {
        // given
        let dir = TempDir::new("survivor-sync-config").unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        // when
        let result = SyncConfig::load(path.to_string_lossy());

        // then
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
