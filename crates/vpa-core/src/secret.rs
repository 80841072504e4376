//! Constant-time comparison of secret fields.

use crate::wire::codec::write_cstr;
use subtle::ConstantTimeEq;

/// Compare two secrets the way they would appear in a `cap`-byte wire
/// field, in time independent of where they differ.
///
/// An empty `expected` never matches: an uninitialised secret must not
/// admit a client that also sent nothing.
pub fn fields_match(expected: &str, candidate: &str, cap: usize) -> bool {
    if expected.is_empty() {
        return false;
    }
    let mut a = vec![0u8; cap];
    let mut b = vec![0u8; cap];
    write_cstr(&mut a, expected);
    write_cstr(&mut b, candidate);
    a.ct_eq(&b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::limits::{PSK_SIZE, UUID_SIZE};

    #[test]
    fn test_equal_and_unequal() {
        assert!(fields_match("X", "X", PSK_SIZE));
        assert!(!fields_match("X", "Y", PSK_SIZE));
        assert!(!fields_match("X", "XX", PSK_SIZE));
        assert!(!fields_match("X", "", PSK_SIZE));
    }

    #[test]
    fn test_empty_expected_never_matches() {
        assert!(!fields_match("", "", UUID_SIZE));
    }

    #[test]
    fn test_compares_at_field_width() {
        // Only the first cap-1 bytes survive the wire
        assert!(fields_match("abcdef", "abcxyz", 4));
    }
}
