use crate::result::*;

/// Checked conversion from the format's 64-bit offsets and sizes
/// to something we can index buffers with.
///
/// Only 32-bit (and smaller) targets can actually fail here.
pub fn usize<I: Into<u64>>(i: I) -> ZipResult<usize> {
    usize::try_from(i.into()).map_err(|_| ZipError::InsufficientAddressSpace)
}
