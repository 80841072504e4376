//! SysV shared memory backend.

use std::ptr::NonNull;

use nix::errno::Errno;
use uuid::Uuid;

use super::SegmentMemory;
use crate::error::{Result, ShmError};
use crate::layout::ShmLayout;
use crate::semaphore::ProcessLock;

pub struct SysvSegment {
    key: i32,
    id: libc::c_int,
    ptr: NonNull<ShmLayout>,
    created: bool,
}

// Safety: the mapping is process-wide; access is serialised by the lock
// held in SharedStore.
unsafe impl Send for SysvSegment {}
unsafe impl Sync for SysvSegment {}

impl SysvSegment {
    /// Attach to the segment at `key`, creating it if absent.
    ///
    /// Runs entirely under `lock`, so of two processes racing to start
    /// first exactly one creates and initialises the segment; the other
    /// attaches after the header and token are in place. An existing
    /// segment whose header does not match this build is refused.
    pub fn attach_or_create<L: ProcessLock>(key: i32, lock: &L) -> Result<Self> {
        let _guard = lock.lock()?;
        let size = ShmLayout::SIZE;

        let id = unsafe { libc::shmget(key, size, libc::IPC_CREAT | libc::IPC_EXCL | 0o666) };
        if id >= 0 {
            let ptr = match attach(id) {
                Ok(ptr) => ptr,
                Err(e) => {
                    // Do not leave an uninitialised segment behind
                    unsafe { libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut()) };
                    return Err(e);
                }
            };
            let mut seg = Self {
                key,
                id,
                ptr,
                created: true,
            };
            let token = Uuid::new_v4().to_string();
            // SAFETY: freshly created, zero-filled, we hold the lock
            unsafe { seg.ptr.as_mut() }.initialize(&token);
            tracing::info!(key = %format!("{key:#x}"), size, "shared segment created");
            return Ok(seg);
        }

        match Errno::last() {
            Errno::EEXIST => {}
            errno => return Err(ShmError::Os { op: "shmget", errno }),
        }

        let id = unsafe { libc::shmget(key, 0, 0) };
        if id < 0 {
            return Err(ShmError::last_os("shmget"));
        }
        let actual = segment_size(id)?;
        if actual < size {
            return Err(ShmError::TooSmall {
                actual,
                needed: size,
            });
        }

        let seg = Self {
            key,
            id,
            ptr: attach(id)?,
            created: false,
        };
        // SAFETY: mapping is at least ShmLayout::SIZE bytes, we hold the lock
        unsafe { seg.ptr.as_ref() }.validate()?;
        tracing::debug!(key = %format!("{key:#x}"), "shared segment attached");
        Ok(seg)
    }

    /// Mark the segment at `key` for removal. It disappears once the last
    /// process detaches. Returns `false` if no segment exists.
    pub fn remove(key: i32) -> Result<bool> {
        let id = unsafe { libc::shmget(key, 0, 0) };
        if id < 0 {
            return match Errno::last() {
                Errno::ENOENT => Ok(false),
                errno => Err(ShmError::Os { op: "shmget", errno }),
            };
        }
        if unsafe { libc::shmctl(id, libc::IPC_RMID, std::ptr::null_mut()) } != 0 {
            return Err(ShmError::last_os("shmctl(IPC_RMID)"));
        }
        tracing::info!(key = %format!("{key:#x}"), "shared segment removed");
        Ok(true)
    }

    pub fn key(&self) -> i32 {
        self.key
    }

    pub fn id(&self) -> libc::c_int {
        self.id
    }

    /// Number of processes currently attached.
    pub fn attach_count(&self) -> Result<u64> {
        let ds = stat(self.id)?;
        Ok(ds.shm_nattch as u64)
    }
}

impl SegmentMemory for SysvSegment {
    fn layout_ptr(&self) -> NonNull<ShmLayout> {
        self.ptr
    }

    fn created(&self) -> bool {
        self.created
    }
}

impl Drop for SysvSegment {
    fn drop(&mut self) {
        // Detach only; the segment persists for other processes
        unsafe {
            libc::shmdt(self.ptr.as_ptr() as *const libc::c_void);
        }
    }
}

fn attach(id: libc::c_int) -> Result<NonNull<ShmLayout>> {
    let p = unsafe { libc::shmat(id, std::ptr::null(), 0) };
    if p as isize == -1 {
        return Err(ShmError::last_os("shmat"));
    }
    NonNull::new(p as *mut ShmLayout).ok_or(ShmError::Os {
        op: "shmat",
        errno: Errno::EFAULT,
    })
}

fn stat(id: libc::c_int) -> Result<libc::shmid_ds> {
    // SAFETY: shmid_ds is plain data, filled in by the kernel
    let mut ds: libc::shmid_ds = unsafe { std::mem::zeroed() };
    if unsafe { libc::shmctl(id, libc::IPC_STAT, &mut ds) } != 0 {
        return Err(ShmError::last_os("shmctl(IPC_STAT)"));
    }
    Ok(ds)
}

fn segment_size(id: libc::c_int) -> Result<usize> {
    Ok(stat(id)?.shm_segsz as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::semaphore::LocalLock;

    // Keys well away from the default so tests never touch a live segment
    fn test_key(tag: i32) -> i32 {
        0x7650_0000 | ((std::process::id() as i32 & 0xfff) << 4) | tag
    }

    #[test]
    fn test_create_then_attach_shares_memory() {
        let key = test_key(1);
        let _ = SysvSegment::remove(key);
        let lock = LocalLock::new();

        let first = SysvSegment::attach_or_create(key, &lock).unwrap();
        assert!(first.created());
        let second = SysvSegment::attach_or_create(key, &lock).unwrap();
        assert!(!second.created());

        let (t1, t2) = unsafe {
            (
                first.layout_ptr().as_ref().token(),
                second.layout_ptr().as_ref().token(),
            )
        };
        assert_eq!(t1.len(), 36);
        assert_eq!(t1, t2);

        unsafe { (*first.layout_ptr().as_ptr()).counters.requests = 41 };
        assert_eq!(unsafe { second.layout_ptr().as_ref().counters.requests }, 41);
        assert!(second.attach_count().unwrap() >= 2);

        drop(first);
        drop(second);
        assert!(SysvSegment::remove(key).unwrap());
        assert!(!SysvSegment::remove(key).unwrap());
    }

    #[test]
    fn test_stale_header_is_refused() {
        let key = test_key(2);
        let _ = SysvSegment::remove(key);
        let lock = LocalLock::new();

        let seg = SysvSegment::attach_or_create(key, &lock).unwrap();
        unsafe { (*seg.layout_ptr().as_ptr()).header.version += 1 };

        assert!(matches!(
            SysvSegment::attach_or_create(key, &lock),
            Err(ShmError::StaleSegment { .. })
        ));

        drop(seg);
        SysvSegment::remove(key).unwrap();
    }

    #[test]
    fn test_undersized_segment_is_refused() {
        let key = test_key(3);
        let _ = SysvSegment::remove(key);
        let id = unsafe { libc::shmget(key, 64, libc::IPC_CREAT | 0o600) };
        assert!(id >= 0);

        let lock = LocalLock::new();
        assert!(matches!(
            SysvSegment::attach_or_create(key, &lock),
            Err(ShmError::TooSmall { actual: 64, .. })
        ));
        SysvSegment::remove(key).unwrap();
    }
}
