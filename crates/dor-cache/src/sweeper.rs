use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info};

use crate::cache::ReaderCache;

/// Background task that sweeps a [`ReaderCache`] at a fixed interval.
///
/// Stops when [`Sweeper::stop`] is called or the sweeper is dropped.
pub struct Sweeper {
    shutdown: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl Sweeper {
    pub fn spawn<V>(cache: Arc<ReaderCache<V>>, interval: Duration) -> Self
    where
        V: Clone + Send + 'static,
    {
        let (shutdown, rx) = mpsc::channel::<()>();
        let handle = thread::spawn(move || {
            info!(interval_ms = interval.as_millis() as u64, "reader cache sweeper started");
            loop {
                match rx.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => {
                        cache.sweep();
                    }
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            debug!("reader cache sweeper stopped");
        });
        Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Sweeper {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CacheLimits;
    use dor_types::Pid;
    use std::time::Instant;

    #[test]
    fn background_sweep_expires_entries() {
        let cache = Arc::new(ReaderCache::new(CacheLimits {
            capacity: 10,
            max_age: Duration::from_millis(10),
        }));
        cache.put(Pid::parse("test:1").unwrap(), 1u32);
        let mut sweeper = Sweeper::spawn(cache.clone(), Duration::from_millis(5));

        let deadline = Instant::now() + Duration::from_secs(5);
        while !cache.is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        sweeper.stop();
        assert!(cache.is_empty());
    }

    #[test]
    fn stop_is_idempotent() {
        let cache = Arc::new(ReaderCache::<u32>::new(CacheLimits::default()));
        let mut sweeper = Sweeper::spawn(cache, Duration::from_secs(60));
        sweeper.stop();
        sweeper.stop();
    }
}
