//! In-process mutual exclusion per backup directory.
//!
//! Every load→mutate→persist of a directory's index, and every sequence
//! allocation inside it, runs while holding that directory's lock, so two
//! backups into the same directory cannot interleave.  Locks for different
//! directories are independent.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

type LockTable = Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>;

static LOCKS: LazyLock<LockTable> = LazyLock::new(|| Mutex::new(HashMap::new()));

/// The shared lock for backup directory `dir`.
///
/// Callers hold the returned handle and lock it for the duration of their
/// critical section:
///
/// ```
/// let lock = dotsafe::safety::lock::for_directory(std::path::Path::new("/tmp/b"));
/// let _held = dotsafe::safety::lock::hold(&lock);
/// ```
#[must_use]
pub fn for_directory(dir: &Path) -> Arc<Mutex<()>> {
    let mut table = LOCKS.lock().unwrap_or_else(PoisonError::into_inner);
    Arc::clone(table.entry(dir.to_path_buf()).or_default())
}

/// Lock `lock`, recovering from poison (the guarded data is `()`, so a
/// panicked holder leaves nothing inconsistent behind).
pub fn hold(lock: &Mutex<()>) -> MutexGuard<'_, ()> {
    lock.lock().unwrap_or_else(PoisonError::into_inner)
}
