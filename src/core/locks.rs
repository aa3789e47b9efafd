//! Advisory locks on directory trees.
//!
//! A lock on a path covers everything below it: two paths conflict when one
//! is an ancestor of (or equal to) the other. The backup worker locks a job's
//! server root and destination; plugin installs and toggles lock the plugin
//! folders they write. A caller acquires all of its paths at once, so two
//! operations can never deadlock waiting on each other's paths.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use tracing::debug;

#[derive(Default)]
struct LockState {
    held: Mutex<Vec<PathBuf>>,
    released: Notify,
}

#[derive(Clone, Default)]
pub struct PathLocks {
    state: Arc<LockState>,
}

/// Held paths are released when the guard is dropped.
pub struct PathGuard {
    state: Arc<LockState>,
    paths: Vec<PathBuf>,
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until none of `paths` overlaps a held path, then hold them all.
    pub async fn acquire<I, P>(&self, paths: I) -> PathGuard
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let mut wanted: Vec<PathBuf> = paths.into_iter().map(|p| lock_key(p.as_ref())).collect();
        wanted.sort();
        wanted.dedup();

        loop {
            let released = self.state.released.notified();
            tokio::pin!(released);
            // Register before checking so a release in between is not missed.
            released.as_mut().enable();

            if self.try_hold(&wanted) {
                debug!(paths = ?wanted, "Acquired path locks");
                return PathGuard {
                    state: self.state.clone(),
                    paths: wanted,
                };
            }

            released.await;
        }
    }

    /// Hold `paths` without waiting. Returns None on conflict.
    pub fn try_acquire<I, P>(&self, paths: I) -> Option<PathGuard>
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        let wanted: Vec<PathBuf> = paths.into_iter().map(|p| lock_key(p.as_ref())).collect();
        self.try_hold(&wanted).then(|| PathGuard {
            state: self.state.clone(),
            paths: wanted,
        })
    }

    #[cfg(test)]
    fn is_locked(&self, path: &Path) -> bool {
        let key = lock_key(path);
        let held = self.state.held.lock().unwrap_or_else(|e| e.into_inner());
        held.iter().any(|h| overlaps(h, &key))
    }

    fn try_hold(&self, wanted: &[PathBuf]) -> bool {
        let mut held = self.state.held.lock().unwrap_or_else(|e| e.into_inner());
        if wanted.iter().any(|w| held.iter().any(|h| overlaps(h, w))) {
            return false;
        }
        held.extend(wanted.iter().cloned());
        true
    }
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        {
            let mut held = self.state.held.lock().unwrap_or_else(|e| e.into_inner());
            for path in &self.paths {
                if let Some(pos) = held.iter().position(|h| h == path) {
                    held.swap_remove(pos);
                }
            }
        }
        self.state.released.notify_waiters();
    }
}

fn overlaps(a: &Path, b: &Path) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Canonical form of a path used as lock key. Paths that do not exist yet
/// are made absolute without resolving symlinks.
fn lock_key(path: &Path) -> PathBuf {
    path.canonicalize()
        .or_else(|_| std::path::absolute(path))
        .unwrap_or_else(|_| path.to_path_buf())
}
