use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use dor_types::Pid;

use crate::error::{poisoned, ReplicationError, Result};
use crate::job::{JobAction, JobTable, ReplicationJob};

/// One change to the job table as written to the log.
///
/// On-disk frame:
/// ```text
/// [4 bytes: payload length (little-endian u32)]
/// [4 bytes: CRC32 of payload (little-endian u32)]
/// [N bytes: payload (bincode-serialized JobRecord)]
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
enum JobRecord {
    Upsert(ReplicationJob),
    Remove(Pid),
}

const HEADER_SIZE: usize = 8;

struct LogState {
    writer: BufWriter<File>,
    jobs: BTreeMap<Pid, JobAction>,
}

/// A [`JobTable`] persisted as an append-only, CRC-framed log.
///
/// The log is replayed on open. Frames that fail their CRC are skipped and
/// a torn frame at the tail ends the replay. Whenever the table becomes
/// empty the log is truncated; on open it is rewritten to hold only the
/// surviving jobs.
pub struct WalJobTable {
    path: PathBuf,
    state: Mutex<LogState>,
}

impl WalJobTable {
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let jobs = if path.exists() {
            replay(path)?
        } else {
            BTreeMap::new()
        };

        let writer = rewrite(path, &jobs)?;
        debug!(path = %path.display(), pending = jobs.len(), "opened replication job log");
        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(LogState { writer, jobs }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Size of the log file in bytes.
    pub fn log_len(&self) -> Result<u64> {
        Ok(fs::metadata(&self.path)?.len())
    }

    fn append(&self, state: &mut LogState, record: &JobRecord) -> Result<()> {
        let frame = encode(record)?;
        state.writer.write_all(&frame)?;
        state.writer.flush()?;
        state.writer.get_ref().sync_data()?;
        Ok(())
    }
}

impl JobTable for WalJobTable {
    fn upsert(&self, job: &ReplicationJob) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        self.append(&mut state, &JobRecord::Upsert(job.clone()))?;
        state.jobs.insert(job.pid.clone(), job.action);
        debug!(pid = %job.pid, action = %job.action, "job recorded");
        Ok(())
    }

    fn remove(&self, pid: &Pid) -> Result<()> {
        let mut state = self.state.lock().map_err(poisoned)?;
        if state.jobs.remove(pid).is_none() {
            return Ok(());
        }
        if state.jobs.is_empty() {
            state.writer = rewrite(&self.path, &state.jobs)?;
            debug!("job log compacted");
        } else {
            self.append(&mut state, &JobRecord::Remove(pid.clone()))?;
        }
        Ok(())
    }

    fn pending(&self) -> Result<Vec<ReplicationJob>> {
        let state = self.state.lock().map_err(poisoned)?;
        Ok(state
            .jobs
            .iter()
            .map(|(pid, action)| ReplicationJob::new(pid.clone(), *action))
            .collect())
    }
}

impl std::fmt::Debug for WalJobTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalJobTable").field("path", &self.path).finish()
    }
}

fn encode(record: &JobRecord) -> Result<Vec<u8>> {
    let payload =
        bincode::serialize(record).map_err(|e| ReplicationError::Serialization(e.to_string()))?;
    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

fn replay(path: &Path) -> Result<BTreeMap<Pid, JobAction>> {
    let file = File::open(path)?;
    let file_len = file.metadata()?.len();
    let mut reader = BufReader::new(file);
    let mut jobs = BTreeMap::new();
    let mut offset: u64 = 0;
    loop {
        let mut header = [0u8; HEADER_SIZE];
        match reader.read_exact(&mut header) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(e.into()),
        }
        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected_crc = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if length == 0 || offset + HEADER_SIZE as u64 + length as u64 > file_len {
            warn!(offset, length, file_len, "invalid job frame length; stopping replay");
            break;
        }

        let mut payload = vec![0u8; length as usize];
        match reader.read_exact(&mut payload) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => {
                warn!(offset, "truncated job frame; stopping replay");
                break;
            }
            Err(e) => return Err(e.into()),
        }
        offset += HEADER_SIZE as u64 + length as u64;

        let actual_crc = crc32fast::hash(&payload);
        if actual_crc != expected_crc {
            warn!(offset, expected = expected_crc, actual = actual_crc, "CRC mismatch; skipping job frame");
            continue;
        }
        match bincode::deserialize::<JobRecord>(&payload) {
            Ok(JobRecord::Upsert(job)) => {
                jobs.insert(job.pid, job.action);
            }
            Ok(JobRecord::Remove(pid)) => {
                jobs.remove(&pid);
            }
            Err(e) => warn!(offset, error = %e, "undecodable job frame; skipping"),
        }
    }
    debug!(recovered = jobs.len(), "job log replay complete");
    Ok(jobs)
}

/// Replace the log with one upsert frame per job and return an appending
/// writer positioned at its end.
fn rewrite(path: &Path, jobs: &BTreeMap<Pid, JobAction>) -> Result<BufWriter<File>> {
    let tmp = path.with_extension("compact");
    {
        let mut out = BufWriter::new(File::create(&tmp)?);
        for (pid, action) in jobs {
            out.write_all(&encode(&JobRecord::Upsert(ReplicationJob::new(pid.clone(), *action)))?)?;
        }
        out.flush()?;
        out.get_ref().sync_all()?;
    }
    fs::rename(&tmp, path)?;
    let file = OpenOptions::new().append(true).open(path)?;
    Ok(BufWriter::new(file))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pid(s: &str) -> Pid {
        Pid::parse(s).unwrap()
    }

    fn job(p: &str, action: JobAction) -> ReplicationJob {
        ReplicationJob::new(pid(p), action)
    }

    #[test]
    fn jobs_survive_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.log");
        {
            let table = WalJobTable::open(&path).unwrap();
            table.upsert(&job("demo:1", JobAction::Modify)).unwrap();
            table.upsert(&job("demo:2", JobAction::Delete)).unwrap();
            table.upsert(&job("demo:3", JobAction::Modify)).unwrap();
            table.remove(&pid("demo:3")).unwrap();
        }
        let table = WalJobTable::open(&path).unwrap();
        assert_eq!(
            table.pending().unwrap(),
            vec![job("demo:1", JobAction::Modify), job("demo:2", JobAction::Delete)]
        );
    }

    #[test]
    fn log_is_compacted_when_empty() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.log");
        let table = WalJobTable::open(&path).unwrap();
        table.upsert(&job("demo:1", JobAction::Modify)).unwrap();
        assert!(table.log_len().unwrap() > 0);
        table.remove(&pid("demo:1")).unwrap();
        assert_eq!(table.log_len().unwrap(), 0);

        table.upsert(&job("demo:2", JobAction::Modify)).unwrap();
        drop(table);
        let reopened = WalJobTable::open(&path).unwrap();
        assert_eq!(reopened.pending().unwrap(), vec![job("demo:2", JobAction::Modify)]);
    }

    #[test]
    fn torn_tail_is_ignored() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.log");
        {
            let table = WalJobTable::open(&path).unwrap();
            table.upsert(&job("demo:1", JobAction::Modify)).unwrap();
        }
        let mut f = OpenOptions::new().append(true).open(&path).unwrap();
        f.write_all(&[40, 0, 0, 0, 1, 2, 3, 4, 9]).unwrap();
        drop(f);

        let table = WalJobTable::open(&path).unwrap();
        assert_eq!(table.pending().unwrap(), vec![job("demo:1", JobAction::Modify)]);
    }

    #[test]
    fn oversized_length_header_stops_replay() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.log");
        let good = encode(&JobRecord::Upsert(job("demo:1", JobAction::Modify))).unwrap();
        let mut corrupt = u32::MAX.to_le_bytes().to_vec();
        corrupt.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef, 1, 2, 3]);
        fs::write(&path, [good, corrupt].concat()).unwrap();

        let table = WalJobTable::open(&path).unwrap();
        assert_eq!(table.pending().unwrap(), vec![job("demo:1", JobAction::Modify)]);
        table.upsert(&job("demo:2", JobAction::Delete)).unwrap();
        drop(table);
        let reopened = WalJobTable::open(&path).unwrap();
        assert_eq!(
            reopened.pending().unwrap(),
            vec![job("demo:1", JobAction::Modify), job("demo:2", JobAction::Delete)]
        );
    }

    #[test]
    fn corrupt_frame_is_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.log");
        let mut bad = encode(&JobRecord::Upsert(job("demo:1", JobAction::Modify))).unwrap();
        let last = bad.len() - 1;
        bad[last] ^= 0xff;
        let good = encode(&JobRecord::Upsert(job("demo:2", JobAction::Delete))).unwrap();
        fs::write(&path, [bad, good].concat()).unwrap();

        let table = WalJobTable::open(&path).unwrap();
        assert_eq!(table.pending().unwrap(), vec![job("demo:2", JobAction::Delete)]);
    }

    #[test]
    fn removing_unknown_pid_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("jobs.log");
        let table = WalJobTable::open(&path).unwrap();
        table.upsert(&job("demo:1", JobAction::Modify)).unwrap();
        let before = table.log_len().unwrap();
        table.remove(&pid("demo:9")).unwrap();
        assert_eq!(table.log_len().unwrap(), before);
    }
}
