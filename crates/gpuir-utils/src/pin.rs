//! Scoped acquisition of a pinned byte buffer.
//!
//! `createObjectValue`'s padding reads and `createArrayValue`'s managed-array
//! copy need to read raw bytes out of a caller-owned buffer whose lifetime
//! the core does not control. `PinGuard` is the guard object: it borrows the
//! bytes for its lifetime and runs an optional release callback on drop,
//! including on an unwinding panic.

pub struct PinGuard<'a> {
    bytes: &'a [u8],
    release: Option<Box<dyn FnOnce() + 'a>>,
}

impl<'a> PinGuard<'a> {
    /// Pins `bytes` with no release action (the common case: the buffer
    /// outlives the guard on its own, e.g. it is borrowed from a `Vec` the
    /// caller already owns).
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            release: None,
        }
    }

    /// Pins `bytes`, running `release` exactly once when the guard is
    /// dropped (e.g. to unpin a GC-managed array or free a native handle).
    pub fn with_release(bytes: &'a [u8], release: impl FnOnce() + 'a) -> Self {
        Self {
            bytes,
            release: Some(Box::new(release)),
        }
    }

    pub fn bytes(&self) -> &'a [u8] {
        self.bytes
    }
}

impl Drop for PinGuard<'_> {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}
