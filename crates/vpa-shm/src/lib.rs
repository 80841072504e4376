//! # vpa-shm
//!
//! The shared segment every VPA process attaches to, and the named
//! semaphore that serialises access to it.
//!
//! ## Modules
//!
//! - `layout` - `repr(C)` segment schema (header, token, environment,
//!   credential table, counters, self-test block)
//! - `segment` - Memory backends (`SysvSegment`, `HeapSegment`)
//! - `semaphore` - Cross-process lock (`NamedSemaphore`, `LocalLock`)
//! - `store` - `SharedStore`, the only way to read or write the layout
//!
//! ## Usage
//!
//! ```ignore
//! use vpa_shm::{SystemStore, DEFAULT_MUTEX_NAME, DEFAULT_SHM_KEY};
//!
//! let store = SystemStore::open(DEFAULT_SHM_KEY, DEFAULT_MUTEX_NAME)?;
//! let token = store.with_locked(|shm| shm.token())?;
//! ```

pub mod error;
pub mod layout;
pub mod segment;
pub mod semaphore;
pub mod store;

pub use error::{Result, ShmError};
pub use layout::{
    Counters, CredSlot, Credential, EnvBlock, Environment, SelfTest, ShmHeader, ShmLayout,
    TestOutcome, SHM_LAYOUT_VERSION, SHM_SIGNATURE,
};
pub use segment::{HeapSegment, SegmentMemory, DEFAULT_SHM_KEY};
pub use semaphore::{LocalLock, LockGuard, ProcessLock, DEFAULT_MUTEX_NAME};
pub use store::{MemoryStore, SharedStore};

#[cfg(unix)]
pub use segment::SysvSegment;
#[cfg(unix)]
pub use semaphore::NamedSemaphore;
#[cfg(unix)]
pub use store::SystemStore;
