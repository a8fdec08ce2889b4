//! Little-endian primitives for reading and writing metadata structures.
//!
//! Every multi-byte value in CLI metadata is little-endian. The helpers here read from
//! byte slices with bounds checking and append to growable output buffers. The `_dyn`
//! variants handle the 2-or-4 byte indices whose width is decided per module.
//!
//! Compressed integers (ECMA-335 II.23.2) are written here and read by
//! [`crate::file::parser::Parser`].

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive types that can be converted from and to little-endian bytes.
pub trait CilIO: Sized + Copy {
    /// The fixed-size byte array type for this primitive
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Build a value from its little-endian byte representation
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Produce the little-endian byte representation of this value
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cil_io {
    ($($ty:ty => $len:expr),* $(,)?) => {
        $(
            impl CilIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_cil_io! {
    u8 => 1, i8 => 1,
    u16 => 2, i16 => 2,
    u32 => 4, i32 => 4,
    u64 => 8, i64 => 8,
    f32 => 4, f64 => 8,
}

/// Read a value from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Read a value at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit in `data`.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let size = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(size) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(bytes) = T::Bytes::try_from(&data[*offset..end]) else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(bytes))
}

/// Read a 2-byte or 4-byte index, depending on `is_large`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit in `data`.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    if is_large {
        read_le_at::<u32>(data, offset)
    } else {
        Ok(u32::from(read_le_at::<u16>(data, offset)?))
    }
}

/// Write a value into `data` at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit in `data`.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let Some(end) = offset.checked_add(bytes.len()) else {
        return Err(OutOfBounds);
    };
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;
    Ok(())
}

/// Append a value to `out`.
pub fn push_le<T: CilIO>(out: &mut Vec<u8>, value: T) {
    out.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Append a 2-byte or 4-byte index to `out`.
///
/// # Errors
/// Returns an error if `value` does not fit into 2 bytes while `is_large` is false.
pub fn push_le_dyn(out: &mut Vec<u8>, value: u32, is_large: bool) -> Result<()> {
    if is_large {
        push_le(out, value);
    } else {
        let Ok(small) = u16::try_from(value) else {
            return Err(malformed_error!(
                "Value 0x{:x} does not fit into a 2-byte index",
                value
            ));
        };
        push_le(out, small);
    }
    Ok(())
}

/// Append an ECMA-335 compressed unsigned integer.
///
/// # Errors
/// Returns an error for values above `0x1FFF_FFFF`, which have no compressed form.
pub fn write_compressed_uint(out: &mut Vec<u8>, value: u32) -> Result<()> {
    if value < 0x80 {
        out.push(value as u8);
    } else if value < 0x4000 {
        out.push(0x80 | (value >> 8) as u8);
        out.push(value as u8);
    } else if value < 0x2000_0000 {
        out.push(0xC0 | (value >> 24) as u8);
        out.push((value >> 16) as u8);
        out.push((value >> 8) as u8);
        out.push(value as u8);
    } else {
        return Err(malformed_error!(
            "Value 0x{:x} is too large for a compressed integer",
            value
        ));
    }
    Ok(())
}

/// Append an ECMA-335 compressed signed integer (rotated sign bit).
///
/// # Errors
/// Returns an error for values outside of `-2^28 .. 2^28`.
pub fn write_compressed_int(out: &mut Vec<u8>, value: i32) -> Result<()> {
    let sign = u32::from(value < 0);
    let shifted = (value << 1) as u32;

    if (-0x40..0x40).contains(&value) {
        out.push(((shifted & 0x7F) | sign) as u8);
    } else if (-0x2000..0x2000).contains(&value) {
        let rotated = (shifted & 0x3FFF) | sign;
        out.push(0x80 | (rotated >> 8) as u8);
        out.push(rotated as u8);
    } else if (-0x1000_0000..0x1000_0000).contains(&value) {
        let rotated = (shifted & 0x1FFF_FFFF) | sign;
        out.push(0xC0 | (rotated >> 24) as u8);
        out.push((rotated >> 16) as u8);
        out.push((rotated >> 8) as u8);
        out.push(rotated as u8);
    } else {
        return Err(malformed_error!(
            "Value {} is out of range for a compressed signed integer",
            value
        ));
    }
    Ok(())
}

/// Write a `SerString`: compressed length followed by UTF-8, `None` as `0xFF`.
///
/// # Errors
/// Returns an error if the string is too long for a compressed length
pub fn write_ser_string(out: &mut Vec<u8>, value: Option<&str>) -> Result<()> {
    match value {
        None => out.push(0xFF),
        Some(value) => {
            let length = u32::try_from(value.len())
                .map_err(|_| malformed_error!("String of {} bytes is too long", value.len()))?;
            write_compressed_uint(out, length)?;
            out.extend_from_slice(value.as_bytes());
        }
    }
    Ok(())
}

/// Pad `out` with zeroes until its length is a multiple of `alignment`.
pub fn align_to(out: &mut Vec<u8>, alignment: usize) {
    let padding = (alignment - (out.len() % alignment)) % alignment;
    out.resize(out.len() + padding, 0);
}
