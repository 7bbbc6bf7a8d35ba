//! A [`Writer`] that zeroizes its contents on drop.

use crate::Writer;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// An accumulator for secret key material being built up incrementally (for
/// example, the `secret_input` fed to the ntor KDF).
///
/// Unlike a plain `Vec<u8>`, this type is zeroized whenever it's dropped or
/// reallocated, so intermediate copies of key material don't linger in freed
/// memory.
#[derive(Zeroize, ZeroizeOnDrop, Clone)]
pub struct SecretBuf(Vec<u8>);

/// Default capacity, sized for a typical ntor `secret_input`.
const DEFAULT_CAPACITY: usize = 128;

impl SecretBuf {
    /// Construct an empty buffer.
    pub fn new() -> Self {
        Self(Vec::with_capacity(DEFAULT_CAPACITY))
    }

    /// Consume `self` and return the underlying bytes.
    ///
    /// The caller takes over responsibility for zeroizing the result.
    pub fn into_vec(self) -> Vec<u8> {
        // `ZeroizeOnDrop` would wipe the buffer on drop; take it out first.
        let mut this = std::mem::ManuallyDrop::new(self);
        std::mem::take(&mut this.0)
    }
}

impl Default for SecretBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl Writer for SecretBuf {
    fn write_all(&mut self, bytes: &[u8]) {
        self.0.extend_from_slice(bytes);
    }
}

impl AsRef<[u8]> for SecretBuf {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}
