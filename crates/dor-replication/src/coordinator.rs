use std::sync::Arc;

use tracing::{debug, info, warn};

use dor_index::{FastStore, IndexError, SearchIndex};
use dor_types::{DigitalObject, Pid};

use crate::error::Result;
use crate::job::{JobAction, JobTable, ReplicationJob};

/// Where the coordinator re-reads an object before pushing it.
pub trait AuthoritativeSource: Send + Sync {
    fn load(&self, pid: &Pid) -> Result<DigitalObject>;
}

/// Outcome of [`ReplicationCoordinator::recover`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub replayed: Vec<ReplicationJob>,
    pub failed: Vec<(ReplicationJob, String)>,
}

/// Propagates committed changes to the fast store and search index.
///
/// A job row is written before any propagation and removed only once both
/// targets have accepted the change, so a crash in between leaves a row
/// that [`ReplicationCoordinator::recover`] can replay.
pub struct ReplicationCoordinator {
    jobs: Arc<dyn JobTable>,
    fast: Arc<dyn FastStore>,
    search: Arc<dyn SearchIndex>,
}

impl ReplicationCoordinator {
    pub fn new(
        jobs: Arc<dyn JobTable>,
        fast: Arc<dyn FastStore>,
        search: Arc<dyn SearchIndex>,
    ) -> Self {
        Self { jobs, fast, search }
    }

    pub fn jobs(&self) -> &Arc<dyn JobTable> {
        &self.jobs
    }

    /// Record a modify job, re-read `pid` from `source` and push it.
    pub fn modify(&self, pid: &Pid, source: &dyn AuthoritativeSource) -> Result<()> {
        self.jobs
            .upsert(&ReplicationJob::new(pid.clone(), JobAction::Modify))?;
        self.push_modify(pid, source)
    }

    /// Record a delete job and remove `pid` from both targets.
    pub fn delete(&self, pid: &Pid) -> Result<()> {
        self.jobs
            .upsert(&ReplicationJob::new(pid.clone(), JobAction::Delete))?;
        self.push_delete(pid)
    }

    /// Replay every job still in the table.
    pub fn recover(&self, source: &dyn AuthoritativeSource) -> Result<RecoveryReport> {
        let pending = self.jobs.pending()?;
        info!(pending = pending.len(), "replaying replication jobs");
        let mut report = RecoveryReport::default();
        for job in pending {
            let outcome = match job.action {
                JobAction::Modify => self.push_modify(&job.pid, source),
                JobAction::Delete => self.push_delete(&job.pid),
            };
            match outcome {
                Ok(()) => report.replayed.push(job),
                Err(e) => {
                    warn!(pid = %job.pid, action = %job.action, error = %e, "replication job failed again");
                    report.failed.push((job, e.to_string()));
                }
            }
        }
        Ok(report)
    }

    fn push_modify(&self, pid: &Pid, source: &dyn AuthoritativeSource) -> Result<()> {
        let object = source.load(pid)?;
        self.fast.replicate(&object)?;
        self.search.update(&object)?;
        self.jobs.remove(pid)?;
        debug!(%pid, "replicated modify");
        Ok(())
    }

    fn push_delete(&self, pid: &Pid) -> Result<()> {
        absent_ok(self.fast.delete(pid))?;
        absent_ok(self.search.delete(pid))?;
        self.jobs.remove(pid)?;
        debug!(%pid, "replicated delete");
        Ok(())
    }
}

/// A target that never saw the object has nothing to delete.
fn absent_ok(result: std::result::Result<(), IndexError>) -> std::result::Result<(), IndexError> {
    match result {
        Err(IndexError::NotFound(_)) => Ok(()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReplicationError;
    use crate::job::InMemoryJobTable;
    use dor_index::{FieldQuery, FindObjectsResult, InMemoryFastStore, InMemorySearchIndex, IndexResult};
    use dor_types::ObjectKind;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct Source {
        objects: Mutex<HashMap<Pid, DigitalObject>>,
    }

    impl Source {
        fn put(&self, pid: &str) -> Pid {
            let pid = Pid::parse(pid).unwrap();
            let mut obj = DigitalObject::new(pid.clone(), ObjectKind::DataObject);
            obj.label = "replicated".into();
            self.objects.lock().unwrap().insert(pid.clone(), obj);
            pid
        }
    }

    impl AuthoritativeSource for Source {
        fn load(&self, pid: &Pid) -> Result<DigitalObject> {
            self.objects
                .lock()
                .unwrap()
                .get(pid)
                .cloned()
                .ok_or_else(|| ReplicationError::Source {
                    pid: pid.clone(),
                    reason: "missing".into(),
                })
        }
    }

    /// Search index that can be told to fail updates.
    #[derive(Default)]
    struct FlakySearch {
        inner: InMemorySearchIndex,
        failing: AtomicBool,
    }

    impl SearchIndex for FlakySearch {
        fn update(&self, object: &DigitalObject) -> IndexResult<()> {
            if self.failing.load(Ordering::SeqCst) {
                return Err(IndexError::Backend("search offline".into()));
            }
            self.inner.update(object)
        }
        fn delete(&self, pid: &Pid) -> IndexResult<()> {
            self.inner.delete(pid)
        }
        fn find_objects(&self, f: &[String], n: usize, q: &FieldQuery) -> IndexResult<FindObjectsResult> {
            self.inner.find_objects(f, n, q)
        }
        fn resume_find_objects(&self, token: &str) -> IndexResult<FindObjectsResult> {
            self.inner.resume_find_objects(token)
        }
    }

    fn setup() -> (ReplicationCoordinator, Arc<InMemoryFastStore>, Arc<FlakySearch>, Arc<InMemoryJobTable>) {
        let jobs = Arc::new(InMemoryJobTable::new());
        let fast = Arc::new(InMemoryFastStore::new());
        let search = Arc::new(FlakySearch::default());
        let coordinator = ReplicationCoordinator::new(jobs.clone(), fast.clone(), search.clone());
        (coordinator, fast, search, jobs)
    }

    #[test]
    fn modify_reaches_both_targets_and_clears_job() {
        let (coordinator, fast, search, jobs) = setup();
        let source = Source::default();
        let pid = source.put("demo:1");
        coordinator.modify(&pid, &source).unwrap();
        assert!(fast.contains(&pid).unwrap());
        assert!(search.inner.contains(&pid));
        assert!(jobs.pending().unwrap().is_empty());
    }

    #[test]
    fn failed_push_leaves_job_for_recovery() {
        let (coordinator, _fast, search, jobs) = setup();
        let source = Source::default();
        let pid = source.put("demo:1");
        search.failing.store(true, Ordering::SeqCst);
        assert!(coordinator.modify(&pid, &source).is_err());
        assert_eq!(jobs.pending().unwrap(), vec![ReplicationJob::new(pid.clone(), JobAction::Modify)]);

        let report = coordinator.recover(&source).unwrap();
        assert!(report.replayed.is_empty());
        assert_eq!(report.failed.len(), 1);

        search.failing.store(false, Ordering::SeqCst);
        let report = coordinator.recover(&source).unwrap();
        assert_eq!(report.replayed.len(), 1);
        assert!(jobs.pending().unwrap().is_empty());
        assert!(search.inner.contains(&pid));
    }

    #[test]
    fn delete_tolerates_missing_entries() {
        let (coordinator, fast, _search, jobs) = setup();
        let source = Source::default();
        let pid = source.put("demo:1");
        coordinator.modify(&pid, &source).unwrap();
        coordinator.delete(&pid).unwrap();
        assert!(!fast.contains(&pid).unwrap());
        coordinator.delete(&pid).unwrap();
        assert!(jobs.pending().unwrap().is_empty());
    }
}
