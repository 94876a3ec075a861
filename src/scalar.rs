//! Fixed-width scalar encoding/decoding in the current byte order.

use crate::address::ByteOrderKind;
use crate::error::{MemoryMapError, Result};

/// "Use the scalar's natural size" sentinel for `write_scalar`.
pub const USE_NATURAL_SIZE: u64 = u32::MAX as u64;

/// Encodes `value` into the low `size` bytes of a fixed 32-byte buffer
/// using `order`. `size` must be one of {1, 2, 4, 8}.
pub fn encode_scalar(value: u64, size: u64, order: ByteOrderKind) -> Result<[u8; 32]> {
    let width = scalar_width(size)?;
    let mut buf = [0u8; 32];
    let bytes = match order {
        ByteOrderKind::Little | ByteOrderKind::Invalid => value.to_le_bytes(),
        ByteOrderKind::Big => value.to_be_bytes(),
    };
    match order {
        ByteOrderKind::Big => buf[..width].copy_from_slice(&bytes[8 - width..]),
        _ => buf[..width].copy_from_slice(&bytes[..width]),
    }
    Ok(buf)
}

/// Decodes an unsigned integer of `size` bytes from `raw` using
/// `order`. `size` must be one of {1, 2, 4, 8}.
pub fn decode_scalar(raw: &[u8], order: ByteOrderKind) -> Result<u64> {
    let width = scalar_width(raw.len() as u64)?;
    let mut bytes = [0u8; 8];
    match order {
        ByteOrderKind::Big => {
            bytes[8 - width..].copy_from_slice(&raw[..width]);
            Ok(u64::from_be_bytes(bytes))
        }
        ByteOrderKind::Little | ByteOrderKind::Invalid => {
            bytes[..width].copy_from_slice(&raw[..width]);
            Ok(u64::from_le_bytes(bytes))
        }
    }
}

/// Validates a scalar width, returning it as a `usize` for slicing.
pub fn scalar_width(size: u64) -> Result<usize> {
    match size {
        1 | 2 | 4 | 8 => Ok(size as usize),
        _ => Err(MemoryMapError::UnsupportedSize { size }),
    }
}
