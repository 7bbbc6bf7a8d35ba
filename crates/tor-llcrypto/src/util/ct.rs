//! Constant-time comparison helpers.

use subtle::ConstantTimeEq;

/// Compare two byte slices for equality in constant time with respect to
/// their *contents* (not their lengths).
///
/// Used to compare the AUTH tag produced by an ntor handshake against the
/// value the peer sent, so that a timing side-channel can't be used to guess
/// the tag one byte at a time.
pub fn ct_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}
