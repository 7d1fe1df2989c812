//! # Concurrent Fetch Engine
//!
//! Downloads a batch of artifacts from the remote repository into the local repository.
//!
//! A fixed pool of worker threads drains a shared task list guarded by a single mutex and
//! condition variable. Workers prefer tasks whose size is already known so the progress
//! estimate settles early. Each download streams into a temporary file next to its final
//! location while hashing, is checked against the declared size, the announced content
//! length and the declared checksum, and is then renamed into place.
//!
//! The calling thread coordinates: it waits briefly for sizes to become known, then
//! reports aggregate progress at least once per poll interval until no work remains.
//!
//! Once any task fails no new task is claimed, but transfers already underway run to
//! completion and are published. The first failure observed is returned.
mod progress;
pub mod transport;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use thiserror::Error;

pub use self::progress::{Estimator, GUESSED_SIZE, TOTAL, TaskState};
pub use self::transport::{Download, FileTransport, HttpTransport, Transport};
use crate::coord::Dependency;
use crate::log::Progress;
use crate::script::Checksum;

const BUFFER_SIZE: usize = 8 * 1024;

//================================================================================================
// Types
//================================================================================================

/// Errors that fail a single download.
#[derive(Error, Debug)]
pub enum Error {
    /// The repository does not have the artifact.
    #[error("not found: {0}")]
    NotFound(String),
    /// The announced length contradicts the declared size.
    #[error("error fetching {dep}: unexpected Content-Length: {actual}, expected {expected}")]
    ContentLength {
        /// The coordinate being fetched.
        dep: String,
        /// The declared size.
        expected: u64,
        /// The announced length.
        actual: u64,
    },
    /// The number of bytes received is wrong.
    #[error("error fetching {dep}: received {actual} byte(s), expected {expected} byte(s)")]
    Size {
        /// The coordinate being fetched.
        dep: String,
        /// The declared size or announced length.
        expected: u64,
        /// Bytes actually received.
        actual: u64,
    },
    /// The digest of the received bytes differs from the declared one.
    #[error("unexpected {actual} for {dep}")]
    Checksum {
        /// The coordinate being fetched.
        dep: String,
        /// Digest of the bytes received.
        actual: Checksum,
    },
    /// The repository url has a scheme no transport handles.
    #[error("unsupported repository url: {0}")]
    UnsupportedUrl(String),
    /// The HTTP transport failed.
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    /// Local I/O failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Tunables of a fetch batch.
#[derive(Debug, Clone, Copy)]
pub struct Options {
    /// Number of worker threads.
    pub workers: usize,
    /// How long to wait for sizes before estimating progress.
    pub settle: Duration,
    /// Upper bound between two progress updates.
    pub poll: Duration,
}

/// Downloads batches of artifacts through a [`Transport`].
pub struct Fetcher<'a> {
    transport: &'a dyn Transport,
    options: Options,
}

struct Task {
    dep: Dependency,
    target: PathBuf,
}

struct Shared {
    states: Vec<TaskState>,
    failures: Vec<(usize, Error)>,
    workers: usize,
}

/// Decrements the live worker count even when a worker unwinds.
struct WorkerGuard<'a> {
    shared: &'a Mutex<Shared>,
    cond: &'a Condvar,
}

//================================================================================================
// Impls
//================================================================================================

impl Default for Options {
    fn default() -> Self {
        Options {
            workers: 4,
            settle: Duration::from_millis(800),
            poll: Duration::from_secs(1),
        }
    }
}

impl Shared {
    fn failed(&self) -> bool {
        !self.failures.is_empty()
    }

    /// Whether the coordinator must keep waiting.
    fn in_progress(&self) -> bool {
        if self.workers == 0 {
            return false;
        }
        if self.failed() {
            self.states.iter().any(|t| t.started && !t.completed)
        } else {
            self.states.iter().any(|t| !t.completed)
        }
    }

    /// Claims the next task, preferring ones with a known size.
    fn claim(&mut self) -> Option<usize> {
        if self.failed() {
            return None;
        }
        let pending = || self.states.iter().enumerate().filter(|(_, t)| !t.started);
        let (idx, _) = pending()
            .find(|(_, t)| t.known_size().is_some())
            .or_else(|| pending().next())?;
        self.states[idx].started = true;
        Some(idx)
    }
}

impl Drop for WorkerGuard<'_> {
    fn drop(&mut self) {
        lock(self.shared).workers -= 1;
        self.cond.notify_all();
    }
}

impl<'a> Fetcher<'a> {
    /// A fetcher with default tunables.
    pub fn new(transport: &'a dyn Transport) -> Self {
        Fetcher {
            transport,
            options: Options::default(),
        }
    }

    /// Replaces the tunables.
    pub fn with_options(mut self, options: Options) -> Self {
        self.options = options;
        self
    }

    /// Fetches every dependency into `local`, returning where each one was published.
    ///
    /// Blocks until all claimed transfers are done. On failure the first observed error is
    /// returned; artifacts that finished successfully stay published.
    pub fn fetch(
        &self,
        local: &Path,
        deps: Vec<Dependency>,
        progress: &dyn Progress,
    ) -> Result<Vec<(Dependency, PathBuf)>, Error> {
        if deps.is_empty() {
            return Ok(Vec::new());
        }
        let tasks: Vec<Task> = deps
            .into_iter()
            .map(|dep| Task {
                target: local.join(dep.sub_path()),
                dep,
            })
            .collect();
        let workers = self.options.workers.clamp(1, tasks.len());
        let shared = Mutex::new(Shared {
            states: tasks.iter().map(|t| TaskState::new(t.dep.size)).collect(),
            failures: Vec::new(),
            workers,
        });
        let cond = Condvar::new();

        thread::scope(|s| -> io::Result<()> {
            for i in 0..workers {
                let spawned = thread::Builder::new()
                    .name(format!("fetch{i}"))
                    .spawn_scoped(s, || self.work(&tasks, &shared, &cond));
                if let Err(e) = spawned {
                    // workers that were never spawned
                    lock(&shared).workers -= workers - i;
                    cond.notify_all();
                    return Err(e);
                }
            }
            self.coordinate(&shared, &cond, progress);
            Ok(())
        })?;

        let Shared { failures, .. } = shared.into_inner().unwrap_or_else(PoisonError::into_inner);
        let mut failures = failures.into_iter();
        if let Some((idx, first)) = failures.next() {
            for (idx, e) in failures {
                tracing::warn!(dep = %tasks[idx].dep, error = %e, "additional fetch failure");
            }
            tracing::debug!(dep = %tasks[idx].dep, "fetch failed");
            return Err(first);
        }
        Ok(tasks.into_iter().map(|t| (t.dep, t.target)).collect())
    }

    fn work(&self, tasks: &[Task], shared: &Mutex<Shared>, cond: &Condvar) {
        let _guard = WorkerGuard { shared, cond };
        loop {
            // the claim guard must be released before downloading
            let claimed = lock(shared).claim();
            let Some(idx) = claimed else {
                break;
            };
            let task = &tasks[idx];
            let result = self.download(idx, task, shared, cond);
            let mut guard = lock(shared);
            guard.states[idx].completed = true;
            match result {
                Ok(()) => {
                    tracing::trace!(path = %task.target.display(), "published");
                },
                Err(e) => {
                    guard.states[idx].failed = true;
                    guard.failures.push((idx, e));
                },
            }
            cond.notify_all();
        }
    }

    fn download(
        &self,
        idx: usize,
        task: &Task,
        shared: &Mutex<Shared>,
        cond: &Condvar,
    ) -> Result<(), Error> {
        let dep = &task.dep;
        let sub_path = dep.sub_path();
        let dir = task.target.parent().unwrap_or(Path::new("."));
        std::fs::create_dir_all(dir)?;

        let Download {
            content_length,
            mut reader,
        } = self.transport.open(&sub_path)?;
        if let Some(len) = content_length {
            if let Some(expected) = dep.size.filter(|s| *s != len) {
                return Err(Error::ContentLength {
                    dep: dep.to_spec(),
                    expected,
                    actual: len,
                });
            }
            lock(shared).states[idx].detected_size = Some(len);
            cond.notify_all();
        }

        let mut tmp = tempfile::Builder::new()
            .prefix(&format!("{}~", dep.file_name()))
            .tempfile_in(dir)?;
        let mut hasher = Sha256::new();
        let mut buf = [0u8; BUFFER_SIZE];
        let mut transferred = 0u64;
        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            hasher.update(&buf[..n]);
            tmp.write_all(&buf[..n])?;
            transferred += n as u64;
            lock(shared).states[idx].transferred = transferred;
            cond.notify_all();
        }

        for expected in [dep.size, content_length].into_iter().flatten() {
            if expected != transferred {
                return Err(Error::Size {
                    dep: dep.to_spec(),
                    expected,
                    actual: transferred,
                });
            }
        }
        let actual = Checksum::finish(hasher);
        if let Some(expected) = &dep.sha256 {
            if !actual.matches_hex(expected) {
                return Err(Error::Checksum {
                    dep: dep.to_spec(),
                    actual,
                });
            }
        }

        tmp.as_file_mut().flush()?;
        tmp.persist(&task.target).map_err(|e| e.error)?;
        Ok(())
    }

    fn coordinate(&self, shared: &Mutex<Shared>, cond: &Condvar, progress: &dyn Progress) {
        let mut estimator = Estimator::new(TOTAL);
        progress.set_length(estimator.total());

        let start = Instant::now();
        let mut guard = lock(shared);
        while guard.in_progress() && guard.states.iter().any(|t| t.known_size().is_none()) {
            let Some(left) = self.options.settle.checked_sub(start.elapsed()) else {
                break;
            };
            guard = cond
                .wait_timeout(guard, left)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }

        loop {
            let completed = estimator.update(&mut guard.states);
            if !guard.in_progress() {
                break;
            }
            drop(guard);
            progress.set_position(completed);
            guard = lock(shared);
            if guard.in_progress() {
                guard = cond
                    .wait_timeout(guard, self.options.poll)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
        }
        drop(guard);
        progress.set_position(estimator.finish());
    }
}

//================================================================================================
// Functions
//================================================================================================

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}
