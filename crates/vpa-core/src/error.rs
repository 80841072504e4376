//! Error types for the wire contract

use crate::wire::FuncCode;
use thiserror::Error;

/// Result type for wire operations
pub type WireResult<T> = Result<T, WireError>;

/// Reasons a byte buffer is not a valid message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WireError {
    /// Fewer bytes than the header (or the declared size) requires
    #[error("truncated message: need {needed} bytes, got {got}")]
    Truncated { needed: usize, got: usize },

    /// Header version is not one this build speaks
    #[error("unsupported protocol version {0}")]
    UnsupportedVersion(u32),

    /// Function code has no message shape
    #[error("unknown function code {0}")]
    UnknownFunction(u32),

    /// Declared size does not match the concrete struct for the function
    #[error("size mismatch for {func:?}: declared {declared}, expected {expected}")]
    SizeMismatch {
        func: FuncCode,
        declared: u32,
        expected: usize,
    },

    /// Buffer length differs from the declared size
    #[error("length mismatch: declared {declared}, buffer holds {actual}")]
    LengthMismatch { declared: u32, actual: usize },

    /// Declared size exceeds the transport limit
    #[error("declared size {0} exceeds maximum message size")]
    Oversized(u32),

    /// A reply came back carrying a different function code
    #[error("expected {expected:?} reply, got {got:?}")]
    UnexpectedFunction { expected: FuncCode, got: FuncCode },
}

impl WireError {
    /// Whether the sender asked for a function this build does not know.
    /// Such frames are answered with `UNKNOWN_REQUEST` rather than
    /// `PROTOCOL_ERROR`.
    pub fn is_unknown_request(&self) -> bool {
        matches!(self, WireError::UnknownFunction(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = WireError::Truncated { needed: 12, got: 3 };
        assert_eq!(format!("{}", e), "truncated message: need 12 bytes, got 3");

        let e = WireError::SizeMismatch {
            func: FuncCode::GetAuth,
            declared: 10,
            expected: 117,
        };
        assert_eq!(
            format!("{}", e),
            "size mismatch for GetAuth: declared 10, expected 117"
        );
    }

    #[test]
    fn test_unknown_request_classification() {
        assert!(WireError::UnknownFunction(99).is_unknown_request());
        assert!(!WireError::Oversized(100_000).is_unknown_request());
    }
}
