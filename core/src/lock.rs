//! Advisory `flock(2)` locks scoped to a guard
//!
//! The lock is the only mutual exclusion between concurrent tool invocations.
//! [`LockMode::Blocking`] waits forever: a process that never releases the lock
//! wedges every later invocation on the same file.

use std::fs::File;
use std::io;
use std::thread;
use std::time::{Duration, Instant};

// std::fs::File has inherent methods with the same names, call these fully qualified
use fs2::FileExt;
use log::{debug, warn};

/// How long to wait for a contended lock
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LockMode {
    /// Block until the lock is granted
    #[default]
    Blocking,

    /// Give up with `ErrorKind::WouldBlock` once the duration has elapsed
    Bounded(Duration),
}

/// Held lock, released on drop
#[derive(Debug)]
pub struct FileLock<'a> {
    file: &'a File,
}

impl<'a> FileLock<'a> {
    const POLL_INTERVAL: Duration = Duration::from_millis(10);

    pub fn exclusive(file: &'a File, mode: LockMode) -> io::Result<FileLock<'a>> {
        match mode {
            LockMode::Blocking => retry_interrupted(|| FileExt::lock_exclusive(file))?,
            LockMode::Bounded(timeout) => {
                Self::poll(file, timeout, |f: &File| FileExt::try_lock_exclusive(f))?
            }
        }

        Ok(FileLock { file })
    }

    pub fn shared(file: &'a File, mode: LockMode) -> io::Result<FileLock<'a>> {
        match mode {
            LockMode::Blocking => retry_interrupted(|| FileExt::lock_shared(file))?,
            LockMode::Bounded(timeout) => {
                Self::poll(file, timeout, |f: &File| FileExt::try_lock_shared(f))?
            }
        }

        Ok(FileLock { file })
    }

    fn poll(
        file: &File,
        timeout: Duration,
        try_lock: impl Fn(&File) -> io::Result<()>,
    ) -> io::Result<()> {
        let deadline = Instant::now() + timeout;

        loop {
            match retry_interrupted(|| try_lock(file)) {
                Ok(()) => return Ok(()),
                Err(e) if is_contended(&e) => {
                    if Instant::now() >= deadline {
                        warn!("gave up waiting for file lock after {timeout:?}");
                        return Err(io::Error::new(
                            io::ErrorKind::WouldBlock,
                            "timed out waiting for file lock",
                        ));
                    }
                    thread::sleep(Self::POLL_INTERVAL);
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Release explicitly to observe the error, drop ignores it
    pub fn unlock(self) -> io::Result<()> {
        let file = self.file;
        std::mem::forget(self);
        retry_interrupted(|| FileExt::unlock(file))
    }
}

impl Drop for FileLock<'_> {
    fn drop(&mut self) {
        if let Err(e) = retry_interrupted(|| FileExt::unlock(self.file)) {
            debug!("failed to release file lock: {e}");
        }
    }
}

/// Repeat a syscall wrapper until it isn't interrupted by a signal
pub(crate) fn retry_interrupted<T>(mut f: impl FnMut() -> io::Result<T>) -> io::Result<T> {
    loop {
        match f() {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

#[inline]
fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}
