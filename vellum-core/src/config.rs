//! Engine settings.
//!
//! # Storage layout
//!
//! ```text
//! ~/.vellum/
//!   config.yaml     (optional: every key has a default)
//! ```
//!
//! Every key may be overridden by a `VELLUM_<KEY>` environment variable
//! (`VELLUM_REPOSITORY_URL`, `VELLUM_QUEUE_CAPACITY`, …). Overrides win over
//! the file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{io_err, CoreError};

/// Runtime configuration shared by the CLI, the daemon and the sync engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Base URL of the repository's REST API, e.g. `http://localhost:8080/fcrepo/rest`.
    pub repository_url: String,
    /// Root of the OCFL storage layer (`s3://bucket` or a local directory).
    pub storage_root: String,
    /// Default staging location prefix for deposits.
    pub staging_root: String,
    /// Bounded import queue capacity.
    pub queue_capacity: usize,
    /// Renew the transaction lease when fewer than this many seconds remain.
    pub lease_renew_margin_secs: i64,
    /// Deepest container nesting accepted while loading a tree.
    pub max_tree_depth: usize,
    /// Refuse to put a binary without a digest.
    pub require_digest: bool,
    /// Read names and content types from a metadata document in the staged location.
    pub enrich_from_metadata: bool,
    /// File name of that metadata document.
    pub metadata_file: String,
    /// Digest algorithm sent with every binary put.
    pub digest_algorithm: String,
    /// Directory holding one subdirectory per bucket for the filesystem
    /// object store; `None` means `<home>/.vellum/buckets`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object_store_root: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            repository_url: "http://localhost:8080/fcrepo/rest".to_string(),
            storage_root: "s3://preservation".to_string(),
            staging_root: "s3://staging".to_string(),
            queue_capacity: 10,
            lease_renew_margin_secs: 60,
            max_tree_depth: 64,
            require_digest: true,
            enrich_from_metadata: false,
            metadata_file: "vellum.json".to_string(),
            digest_algorithm: "sha-256".to_string(),
            object_store_root: None,
        }
    }
}

impl Settings {
    /// Apply `VELLUM_*` overrides taken from `lookup`.
    ///
    /// `lookup` is `std::env::var` in production; tests pass a closure.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("VELLUM_REPOSITORY_URL") {
            self.repository_url = v;
        }
        if let Some(v) = lookup("VELLUM_STORAGE_ROOT") {
            self.storage_root = v;
        }
        if let Some(v) = lookup("VELLUM_STAGING_ROOT") {
            self.staging_root = v;
        }
        if let Some(v) = lookup("VELLUM_QUEUE_CAPACITY") {
            self.queue_capacity = parse_setting("VELLUM_QUEUE_CAPACITY", &v)?;
        }
        if let Some(v) = lookup("VELLUM_LEASE_RENEW_MARGIN_SECS") {
            self.lease_renew_margin_secs = parse_setting("VELLUM_LEASE_RENEW_MARGIN_SECS", &v)?;
        }
        if let Some(v) = lookup("VELLUM_MAX_TREE_DEPTH") {
            self.max_tree_depth = parse_setting("VELLUM_MAX_TREE_DEPTH", &v)?;
        }
        if let Some(v) = lookup("VELLUM_REQUIRE_DIGEST") {
            self.require_digest = parse_setting("VELLUM_REQUIRE_DIGEST", &v)?;
        }
        if let Some(v) = lookup("VELLUM_ENRICH_FROM_METADATA") {
            self.enrich_from_metadata = parse_setting("VELLUM_ENRICH_FROM_METADATA", &v)?;
        }
        if let Some(v) = lookup("VELLUM_METADATA_FILE") {
            self.metadata_file = v;
        }
        if let Some(v) = lookup("VELLUM_DIGEST_ALGORITHM") {
            self.digest_algorithm = v;
        }
        if let Some(v) = lookup("VELLUM_OBJECT_STORE_ROOT") {
            self.object_store_root = Some(v);
        }
        if self.queue_capacity == 0 {
            return Err(CoreError::InvalidSetting {
                key: "queue_capacity".into(),
                value: "0".into(),
            });
        }
        Ok(())
    }
}

fn parse_setting<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CoreError> {
    value.trim().parse().map_err(|_| CoreError::InvalidSetting {
        key: key.to_string(),
        value: value.to_string(),
    })
}

/// `<home>/.vellum/config.yaml`; pure, no I/O.
pub fn settings_path_at(home: &Path) -> PathBuf {
    home.join(".vellum").join("config.yaml")
}

/// Read settings from the file only, without environment overrides.
///
/// A missing file yields the defaults.
pub fn read_settings_file_at(home: &Path) -> Result<Settings, CoreError> {
    let path = settings_path_at(home);
    if !path.exists() {
        return Ok(Settings::default());
    }
    let contents = std::fs::read_to_string(&path).map_err(|e| io_err(&path, e))?;
    if contents.trim().is_empty() {
        return Ok(Settings::default());
    }
    serde_yaml::from_str(&contents).map_err(|e| CoreError::Settings { path, source: e })
}

/// Load settings from `<home>/.vellum/config.yaml` and apply environment overrides.
pub fn load_settings_at(home: &Path) -> Result<Settings, CoreError> {
    let mut settings = read_settings_file_at(home)?;
    settings.apply_overrides(|key| std::env::var(key).ok())?;
    Ok(settings)
}

/// Directory backing the filesystem object store.
pub fn object_store_root_at(home: &Path, settings: &Settings) -> PathBuf {
    match &settings.object_store_root {
        Some(root) => PathBuf::from(root),
        None => home.join(".vellum").join("buckets"),
    }
}

/// `load_settings_at` convenience wrapper.
pub fn load_settings() -> Result<Settings, CoreError> {
    load_settings_at(&crate::home()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn missing_file_yields_defaults() {
        let home = TempDir::new().unwrap();
        let s = read_settings_file_at(home.path()).expect("read");
        assert_eq!(s, Settings::default());
        assert_eq!(s.queue_capacity, 10);
        assert!(s.require_digest);
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let home = TempDir::new().unwrap();
        std::fs::create_dir_all(home.path().join(".vellum")).unwrap();
        std::fs::write(
            settings_path_at(home.path()),
            "repository_url: http://repo.test/rest\nqueue_capacity: 3\n",
        )
        .unwrap();
        let s = read_settings_file_at(home.path()).expect("read");
        assert_eq!(s.repository_url, "http://repo.test/rest");
        assert_eq!(s.queue_capacity, 3);
        assert_eq!(s.max_tree_depth, 64);
    }

    #[test]
    fn malformed_file_reports_path() {
        let home = TempDir::new().unwrap();
        std::fs::create_dir_all(home.path().join(".vellum")).unwrap();
        std::fs::write(settings_path_at(home.path()), "queue_capacity: [nope\n").unwrap();
        let err = read_settings_file_at(home.path()).unwrap_err();
        assert!(matches!(err, CoreError::Settings { .. }));
        assert!(err.to_string().contains("config.yaml"));
    }

    #[test]
    fn overrides_win_over_file() {
        let env: HashMap<&str, &str> = [
            ("VELLUM_REPOSITORY_URL", "http://other/rest"),
            ("VELLUM_MAX_TREE_DEPTH", "8"),
            ("VELLUM_REQUIRE_DIGEST", "false"),
        ]
        .into_iter()
        .collect();
        let mut s = Settings::default();
        s.apply_overrides(|k| env.get(k).map(|v| v.to_string()))
            .expect("overrides");
        assert_eq!(s.repository_url, "http://other/rest");
        assert_eq!(s.max_tree_depth, 8);
        assert!(!s.require_digest);
    }

    #[test]
    fn object_store_root_defaults_under_home() {
        let home = TempDir::new().unwrap();
        let mut s = Settings::default();
        assert_eq!(
            object_store_root_at(home.path(), &s),
            home.path().join(".vellum").join("buckets")
        );
        s.object_store_root = Some("/srv/buckets".into());
        assert_eq!(object_store_root_at(home.path(), &s), PathBuf::from("/srv/buckets"));
    }

    #[test]
    fn unparsable_override_is_rejected() {
        let mut s = Settings::default();
        let err = s
            .apply_overrides(|k| (k == "VELLUM_QUEUE_CAPACITY").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidSetting { .. }));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let mut s = Settings::default();
        let err = s
            .apply_overrides(|k| (k == "VELLUM_QUEUE_CAPACITY").then(|| "0".to_string()))
            .unwrap_err();
        assert!(err.to_string().contains("queue_capacity"));
    }
}
