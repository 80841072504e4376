//! Shared segment and mutex errors.

use nix::errno::Errno;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShmError {
    /// A system call failed.
    #[error("{op} failed: {errno}")]
    Os { op: &'static str, errno: Errno },

    /// The segment at this key was created by a build with a different
    /// layout. It has to be removed (`ipcrm`) before it can be reused.
    #[error(
        "stale segment: signature {signature:#x} version {version} size {size} \
         (this build: signature {expected_signature:#x} version {expected_version} size {expected_size})"
    )]
    StaleSegment {
        signature: u32,
        version: u32,
        size: u64,
        expected_signature: u32,
        expected_version: u32,
        expected_size: u64,
    },

    /// Existing segment is smaller than the compiled layout.
    #[error("segment too small: {actual} bytes, layout needs {needed}")]
    TooSmall { actual: usize, needed: usize },

    /// Semaphore names must start with '/' and contain no NUL.
    #[error("invalid semaphore name {0:?}")]
    InvalidName(String),

    /// Release called on a lock that is not held.
    #[error("lock released while not held")]
    NotHeld,
}

impl ShmError {
    /// Capture `errno` for a failed call.
    pub(crate) fn last_os(op: &'static str) -> Self {
        ShmError::Os {
            op,
            errno: Errno::last(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ShmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_error_display() {
        let e = ShmError::Os {
            op: "shmget",
            errno: Errno::EACCES,
        };
        let text = e.to_string();
        assert!(text.starts_with("shmget failed:"), "{text}");
    }

    #[test]
    fn test_stale_display_shows_both_sides() {
        let e = ShmError::StaleSegment {
            signature: 0,
            version: 1,
            size: 10,
            expected_signature: 0x5650_4131,
            expected_version: 1,
            expected_size: 20,
        };
        let text = e.to_string();
        assert!(text.contains("0x56504131"));
        assert!(text.contains("size 20"));
    }
}
