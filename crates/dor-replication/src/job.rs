use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use dor_types::Pid;

use crate::error::{poisoned, Result};

/// What a pending job must do to the derived stores.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobAction {
    /// Re-read the object and push it (code `M`).
    Modify,
    /// Remove the object (code `D`).
    Delete,
}

impl JobAction {
    pub fn code(&self) -> char {
        match self {
            Self::Modify => 'M',
            Self::Delete => 'D',
        }
    }

    pub fn from_code(code: char) -> Option<Self> {
        match code {
            'M' => Some(Self::Modify),
            'D' => Some(Self::Delete),
            _ => None,
        }
    }
}

impl fmt::Display for JobAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// A durable row: `pid` still needs `action` applied downstream.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationJob {
    pub pid: Pid,
    pub action: JobAction,
}

impl ReplicationJob {
    pub fn new(pid: Pid, action: JobAction) -> Self {
        Self { pid, action }
    }
}

/// Durable set of pending jobs, at most one per pid.
pub trait JobTable: Send + Sync {
    /// Record `job`, replacing any pending job for the same pid.
    fn upsert(&self, job: &ReplicationJob) -> Result<()>;

    /// Forget the pending job for `pid`. Removing an absent job is not an error.
    fn remove(&self, pid: &Pid) -> Result<()>;

    /// Pending jobs in pid order.
    fn pending(&self) -> Result<Vec<ReplicationJob>>;
}

/// A [`JobTable`] that lives only as long as the process.
#[derive(Debug, Default)]
pub struct InMemoryJobTable {
    jobs: Mutex<BTreeMap<Pid, JobAction>>,
}

impl InMemoryJobTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl JobTable for InMemoryJobTable {
    fn upsert(&self, job: &ReplicationJob) -> Result<()> {
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        jobs.insert(job.pid.clone(), job.action);
        Ok(())
    }

    fn remove(&self, pid: &Pid) -> Result<()> {
        let mut jobs = self.jobs.lock().map_err(poisoned)?;
        jobs.remove(pid);
        Ok(())
    }

    fn pending(&self) -> Result<Vec<ReplicationJob>> {
        let jobs = self.jobs.lock().map_err(poisoned)?;
        Ok(jobs
            .iter()
            .map(|(pid, action)| ReplicationJob::new(pid.clone(), *action))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pid(s: &str) -> Pid {
        Pid::parse(s).unwrap()
    }

    #[test]
    fn action_codes() {
        assert_eq!(JobAction::Modify.code(), 'M');
        assert_eq!(JobAction::from_code('D'), Some(JobAction::Delete));
        assert_eq!(JobAction::from_code('X'), None);
    }

    #[test]
    fn upsert_replaces_pending_action() {
        let table = InMemoryJobTable::new();
        table.upsert(&ReplicationJob::new(pid("demo:1"), JobAction::Modify)).unwrap();
        table.upsert(&ReplicationJob::new(pid("demo:1"), JobAction::Delete)).unwrap();
        table.upsert(&ReplicationJob::new(pid("demo:2"), JobAction::Modify)).unwrap();
        let pending = table.pending().unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0], ReplicationJob::new(pid("demo:1"), JobAction::Delete));

        table.remove(&pid("demo:1")).unwrap();
        table.remove(&pid("demo:1")).unwrap();
        assert_eq!(table.pending().unwrap().len(), 1);
    }
}
