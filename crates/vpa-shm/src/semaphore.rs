//! Cross-process mutex.
//!
//! `NamedSemaphore` is a POSIX named semaphore opened with an initial
//! count of 1. Every process that opens the same name shares it, which is
//! what serialises access to the segment across the server, inetd workers
//! and CGI clients. `LocalLock` is an in-process stand-in for tests.
//!
//! # Usage
//!
//! ```ignore
//! let sem = NamedSemaphore::open("/fw_shmem_mutex")?;
//! {
//!     let _guard = sem.lock()?;
//!     // ... touch the segment ...
//! } // released here
//! ```

#[cfg(unix)]
use std::ffi::CString;
use std::sync::{Condvar, Mutex};

#[cfg(unix)]
use nix::errno::Errno;

use crate::error::{Result, ShmError};

/// Default semaphore name.
pub const DEFAULT_MUTEX_NAME: &str = "/fw_shmem_mutex";

/// A lock that can be shared by independent processes (or, for the fake,
/// threads).
pub trait ProcessLock: Send + Sync {
    /// Block until the lock is held.
    fn acquire(&self) -> Result<()>;

    /// Release a held lock.
    fn release(&self) -> Result<()>;

    /// Acquire and return a guard that releases on drop.
    fn lock(&self) -> Result<LockGuard<'_, Self>>
    where
        Self: Sized,
    {
        self.acquire()?;
        Ok(LockGuard { lock: self })
    }
}

#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct LockGuard<'a, L: ProcessLock> {
    lock: &'a L,
}

impl<L: ProcessLock> Drop for LockGuard<'_, L> {
    fn drop(&mut self) {
        if let Err(e) = self.lock.release() {
            // Releasing a lock we hold cannot fail unless the handle is broken
            tracing::error!(error = %e, "mutex release failed");
            debug_assert!(false, "mutex release failed: {e}");
        }
    }
}

// ── Named POSIX semaphore ──

#[cfg(unix)]
pub struct NamedSemaphore {
    sem: *mut libc::sem_t,
    name: CString,
}

// Safety: sem_t handles from sem_open are usable from any thread; the
// semaphore operations themselves provide the synchronisation.
#[cfg(unix)]
unsafe impl Send for NamedSemaphore {}
#[cfg(unix)]
unsafe impl Sync for NamedSemaphore {}

#[cfg(unix)]
impl NamedSemaphore {
    /// Open `name`, creating it with count 1 if it does not exist.
    pub fn open(name: &str) -> Result<Self> {
        let cname = sem_name(name)?;
        let sem = unsafe {
            libc::sem_open(
                cname.as_ptr(),
                libc::O_CREAT,
                0o644 as libc::c_uint,
                1 as libc::c_uint,
            )
        };
        if sem == libc::SEM_FAILED {
            return Err(ShmError::last_os("sem_open"));
        }
        tracing::trace!(name, "semaphore opened");
        Ok(Self { sem, name: cname })
    }

    /// Remove `name` from the system. Processes that already have it open
    /// keep working; the next `open` creates a fresh semaphore.
    pub fn unlink(name: &str) -> Result<()> {
        let cname = sem_name(name)?;
        if unsafe { libc::sem_unlink(cname.as_ptr()) } != 0 {
            return Err(ShmError::last_os("sem_unlink"));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        self.name.to_str().unwrap_or("")
    }

    /// Current count, for diagnostics only (racy by nature).
    pub fn value(&self) -> Result<i32> {
        let mut v: libc::c_int = 0;
        if unsafe { libc::sem_getvalue(self.sem, &mut v) } != 0 {
            return Err(ShmError::last_os("sem_getvalue"));
        }
        Ok(v)
    }
}

#[cfg(unix)]
impl ProcessLock for NamedSemaphore {
    fn acquire(&self) -> Result<()> {
        loop {
            if unsafe { libc::sem_wait(self.sem) } == 0 {
                return Ok(());
            }
            match Errno::last() {
                Errno::EINTR => continue,
                errno => return Err(ShmError::Os { op: "sem_wait", errno }),
            }
        }
    }

    fn release(&self) -> Result<()> {
        if unsafe { libc::sem_post(self.sem) } != 0 {
            return Err(ShmError::last_os("sem_post"));
        }
        Ok(())
    }
}

#[cfg(unix)]
impl Drop for NamedSemaphore {
    fn drop(&mut self) {
        // Close only; the name outlives this process
        unsafe {
            libc::sem_close(self.sem);
        }
    }
}

#[cfg(unix)]
fn sem_name(name: &str) -> Result<CString> {
    if !name.starts_with('/') || name.len() < 2 || name[1..].contains('/') {
        return Err(ShmError::InvalidName(name.to_string()));
    }
    CString::new(name).map_err(|_| ShmError::InvalidName(name.to_string()))
}

// ── In-process fake ──

/// Binary lock with the same contract as `NamedSemaphore`, for tests
/// that do not want to touch system IPC.
#[derive(Default)]
pub struct LocalLock {
    held: Mutex<bool>,
    cv: Condvar,
}

impl LocalLock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_held(&self) -> bool {
        self.held.lock().map(|h| *h).unwrap_or(true)
    }
}

impl ProcessLock for LocalLock {
    fn acquire(&self) -> Result<()> {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        while *held {
            held = self.cv.wait(held).unwrap_or_else(|p| p.into_inner());
        }
        *held = true;
        Ok(())
    }

    fn release(&self) -> Result<()> {
        let mut held = self.held.lock().unwrap_or_else(|p| p.into_inner());
        if !*held {
            return Err(ShmError::NotHeld);
        }
        *held = false;
        self.cv.notify_one();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::thread;

    #[cfg(unix)]
    fn unique_name(tag: &str) -> String {
        format!("/vpa_test_{}_{}", tag, std::process::id())
    }

    #[cfg(unix)]
    #[test]
    fn test_name_validation() {
        assert!(matches!(sem_name("nolead"), Err(ShmError::InvalidName(_))));
        assert!(matches!(sem_name("/"), Err(ShmError::InvalidName(_))));
        assert!(matches!(sem_name("/a/b"), Err(ShmError::InvalidName(_))));
        assert!(matches!(sem_name("/a\0b"), Err(ShmError::InvalidName(_))));
        assert!(sem_name(DEFAULT_MUTEX_NAME).is_ok());
    }

    #[test]
    fn test_local_lock_guard_releases() {
        let lock = LocalLock::new();
        {
            let _g = lock.lock().unwrap();
            assert!(lock.is_held());
        }
        assert!(!lock.is_held());
        assert!(matches!(lock.release(), Err(ShmError::NotHeld)));
    }

    #[test]
    fn test_local_lock_excludes_threads() {
        let lock = Arc::new(LocalLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let mut handles = Vec::new();

        for _ in 0..4 {
            let lock = Arc::clone(&lock);
            let inside = Arc::clone(&inside);
            handles.push(thread::spawn(move || {
                for _ in 0..200 {
                    let _g = lock.lock().unwrap();
                    assert_eq!(inside.fetch_add(1, Ordering::SeqCst), 0);
                    inside.fetch_sub(1, Ordering::SeqCst);
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
    }

    #[cfg(unix)]
    #[test]
    fn test_named_semaphore_open_lock_unlink() {
        let name = unique_name("basic");
        let sem = NamedSemaphore::open(&name).unwrap();
        assert_eq!(sem.name(), name);
        assert_eq!(sem.value().unwrap(), 1);
        {
            let _g = sem.lock().unwrap();
            assert_eq!(sem.value().unwrap(), 0);
        }
        assert_eq!(sem.value().unwrap(), 1);

        // A second handle to the same name sees the same count
        let other = NamedSemaphore::open(&name).unwrap();
        let _g = other.lock().unwrap();
        assert_eq!(sem.value().unwrap(), 0);
        drop(_g);

        NamedSemaphore::unlink(&name).unwrap();
        assert!(NamedSemaphore::unlink(&name).is_err());
    }
}
