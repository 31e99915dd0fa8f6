use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use dor_cache::CacheLimits;
use dor_codec::ExternalQuery;

use crate::error::{RepositoryError, RepositoryResult};

/// Reader cache settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    pub capacity: usize,
    pub max_age_ms: u64,
    pub sweep_interval_ms: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            max_age_ms: 5_000,
            sweep_interval_ms: 1_000,
        }
    }
}

impl CacheConfig {
    pub fn limits(&self) -> CacheLimits {
        CacheLimits {
            capacity: self.capacity,
            max_age: Duration::from_millis(self.max_age_ms),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_millis(self.sweep_interval_ms)
    }
}

/// Repository-wide settings. Every field has a default, so an empty TOML
/// document is a valid configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Namespace for generated pids.
    pub pid_namespace: String,
    /// Namespaces whose supplied pids are kept on ingest.
    pub retain_namespaces: Vec<String>,
    /// Owner recorded for newly registered objects.
    pub default_owner: String,
    pub cache: CacheConfig,
    /// Skips re-validation of serialized objects during commit.
    pub production: bool,
    /// Whether ingest fetches external content to learn undeclared sizes.
    pub external_query: ExternalQuery,
    pub fetch_connect_timeout_secs: u64,
    /// URL under which internal datastreams are served to mechanisms.
    /// `(PID)` and `(DSID)` are replaced with the pid and datastream id.
    pub datastream_url_template: String,
    /// Root directory of the file-backed stores.
    pub storage_dir: Option<PathBuf>,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            pid_namespace: "changeme".into(),
            retain_namespaces: vec!["demo".into(), "test".into(), "fedora-system".into()],
            default_owner: "fedoraAdmin".into(),
            cache: CacheConfig::default(),
            production: false,
            external_query: ExternalQuery::Never,
            fetch_connect_timeout_secs: 10,
            datastream_url_template: "http://localhost:8080/fedora/get/(PID)/(DSID)".into(),
            storage_dir: None,
        }
    }
}

impl RepositoryConfig {
    pub fn from_toml_str(input: &str) -> RepositoryResult<Self> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> RepositoryResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| RepositoryError::general(&e))?;
        Self::from_toml_str(&text)
    }

    pub fn fetch_connect_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_connect_timeout_secs)
    }

    pub fn retains(&self, namespace: &str) -> bool {
        self.retain_namespaces.iter().any(|n| n == namespace)
    }

    /// URL of an internal datastream for a mechanism to fetch.
    pub fn datastream_url(&self, pid: &str, dsid: &str) -> String {
        self.datastream_url_template
            .replace("(PID)", pid)
            .replace("(DSID)", dsid)
    }
}
