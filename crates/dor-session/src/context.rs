use std::fmt;
use std::sync::Arc;

use dor_index::{
    FastStore, InMemoryFastStore, InMemoryResourceIndex, InMemorySearchIndex, ResourceIndex,
    SearchIndex,
};
use dor_registry::{InMemoryPidGenerator, InMemoryRegistry, PidGenerator, Registry};
use dor_replication::{InMemoryJobTable, JobTable};
use dor_store::{ContentFetcher, ContentStore, InMemoryContentFetcher, InMemoryContentStore};

use crate::config::RepositoryConfig;

/// Handles to every collaborator a repository session uses.
///
/// Built once at startup and shared; nothing in the session layer reaches
/// for global state.
#[derive(Clone)]
pub struct RepositoryContext {
    /// Serialized object documents, keyed by pid.
    pub objects: Arc<dyn ContentStore>,
    /// Managed datastream content, keyed by `pid+dsid+version`.
    pub datastreams: Arc<dyn ContentStore>,
    /// Uploaded content waiting for a commit.
    pub staging: Arc<dyn ContentStore>,
    pub registry: Arc<dyn Registry>,
    pub pid_generator: Arc<dyn PidGenerator>,
    pub fast: Arc<dyn FastStore>,
    pub search: Arc<dyn SearchIndex>,
    pub resource: Arc<dyn ResourceIndex>,
    pub jobs: Arc<dyn JobTable>,
    pub fetcher: Arc<dyn ContentFetcher>,
    pub config: RepositoryConfig,
}

impl RepositoryContext {
    /// A context whose stores all live in memory. External fetches go to an
    /// empty [`InMemoryContentFetcher`].
    pub fn in_memory(config: RepositoryConfig) -> Self {
        Self {
            objects: Arc::new(InMemoryContentStore::new()),
            datastreams: Arc::new(InMemoryContentStore::new()),
            staging: Arc::new(InMemoryContentStore::new()),
            registry: Arc::new(InMemoryRegistry::new()),
            pid_generator: Arc::new(InMemoryPidGenerator::new()),
            fast: Arc::new(InMemoryFastStore::new()),
            search: Arc::new(InMemorySearchIndex::new()),
            resource: Arc::new(InMemoryResourceIndex::new()),
            jobs: Arc::new(InMemoryJobTable::new()),
            fetcher: Arc::new(InMemoryContentFetcher::new()),
            config,
        }
    }

    pub fn with_fetcher(mut self, fetcher: Arc<dyn ContentFetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }
}

impl fmt::Debug for RepositoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RepositoryContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
