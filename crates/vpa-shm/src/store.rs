//! Locked access to the shared segment.

use crate::error::Result;
use crate::layout::ShmLayout;
use crate::segment::{HeapSegment, SegmentMemory};
use crate::semaphore::{LocalLock, ProcessLock};

/// A segment mapping paired with the lock that guards it.
pub struct SharedStore<M: SegmentMemory, L: ProcessLock> {
    mem: M,
    lock: L,
}

/// Process-private pairing for tests.
pub type MemoryStore = SharedStore<HeapSegment, LocalLock>;

impl<M: SegmentMemory, L: ProcessLock> SharedStore<M, L> {
    pub fn new(mem: M, lock: L) -> Self {
        Self { mem, lock }
    }

    /// Run `f` with exclusive access to the layout.
    ///
    /// The lock is not reentrant: calling `with_locked` again from inside
    /// `f` deadlocks.
    pub fn with_locked<R>(&self, f: impl FnOnce(&mut ShmLayout) -> R) -> Result<R> {
        let _guard = self.lock.lock()?;
        // SAFETY: the pointer is valid for the life of `mem`, and the guard
        // gives us exclusive access for the duration of `f`.
        let layout = unsafe { &mut *self.mem.layout_ptr().as_ptr() };
        Ok(f(layout))
    }

    /// Copy of the whole layout, taken under the lock.
    pub fn snapshot(&self) -> Result<Box<ShmLayout>> {
        let mut copy = ShmLayout::new_boxed();
        self.with_locked(|layout| *copy = *layout)?;
        Ok(copy)
    }

    /// Session token.
    pub fn token(&self) -> Result<String> {
        self.with_locked(|layout| layout.token())
    }

    /// Whether this process created the segment.
    pub fn created(&self) -> bool {
        self.mem.created()
    }

    pub fn memory(&self) -> &M {
        &self.mem
    }

    pub fn lock(&self) -> &L {
        &self.lock
    }
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use crate::segment::SysvSegment;
        use crate::semaphore::NamedSemaphore;

        /// The production pairing: SysV segment guarded by a named semaphore.
        pub type SystemStore = SharedStore<SysvSegment, NamedSemaphore>;

        impl SystemStore {
            /// Open the named semaphore, then attach to (or create) the
            /// segment at `key` under it.
            pub fn open(key: i32, mutex_name: &str) -> Result<Self> {
                let lock = NamedSemaphore::open(mutex_name)?;
                let mem = SysvSegment::attach_or_create(key, &lock)?;
                Ok(Self::new(mem, lock))
            }
        }
    }
}

impl MemoryStore {
    pub fn in_memory() -> Self {
        Self::new(HeapSegment::new(), LocalLock::new())
    }

    pub fn in_memory_with_token(token: &str) -> Self {
        Self::new(HeapSegment::with_token(token), LocalLock::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layout::Credential;
    use std::sync::Arc;
    use std::thread;
    use vpa_core::FuncCode;

    #[test]
    fn test_memory_store_basics() {
        let store = MemoryStore::in_memory_with_token("tok");
        assert_eq!(store.token().unwrap(), "tok");
        assert!(store.created());

        store
            .with_locked(|l| {
                l.slot_mut(3).unwrap().write(
                    3,
                    &Credential {
                        username: "doug".into(),
                        ..Default::default()
                    },
                )
            })
            .unwrap();

        let snap = store.snapshot().unwrap();
        assert_eq!(snap.active_slot(3).unwrap().read().username, "doug");
        assert!(!store.lock().is_held());
    }

    #[test]
    fn test_memory_store_counts_exactly_under_contention() {
        let store = Arc::new(MemoryStore::in_memory());
        let workers = 8;
        let per_worker = 500;

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..per_worker {
                        store
                            .with_locked(|l| l.counters.record(FuncCode::Version))
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let total = store.with_locked(|l| l.counters.requests).unwrap();
        assert_eq!(total, (workers * per_worker) as u64);
    }

    /// Each worker opens its own semaphore handle and its own attachment,
    /// as separate processes would. Non-atomic read-modify-write of the
    /// counter only adds up if the named semaphore excludes them.
    #[cfg(unix)]
    #[test]
    fn test_named_semaphore_guards_sysv_segment() {
        let key = 0x7651_0000 | (std::process::id() as i32 & 0xffff);
        let name = format!("/vpa_test_store_{}", std::process::id());
        let _ = SysvSegment::remove(key);
        let _ = NamedSemaphore::unlink(&name);

        let workers = 6;
        let per_worker = 300;

        let handles: Vec<_> = (0..workers)
            .map(|_| {
                let name = name.clone();
                thread::spawn(move || {
                    let store = SystemStore::open(key, &name).unwrap();
                    for _ in 0..per_worker {
                        store
                            .with_locked(|l| {
                                let v = l.counters.auth_failures;
                                thread::yield_now();
                                l.counters.auth_failures = v + 1;
                            })
                            .unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let store = SystemStore::open(key, &name).unwrap();
        let total = store.with_locked(|l| l.counters.auth_failures).unwrap();
        assert_eq!(total, (workers * per_worker) as u64);

        // Exactly one opener created the segment, so everyone saw one token
        assert!(!store.created());
        assert_eq!(store.token().unwrap().len(), 36);

        drop(store);
        SysvSegment::remove(key).unwrap();
        NamedSemaphore::unlink(&name).unwrap();
    }
}
