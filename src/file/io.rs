//! Bounds-checked little-endian reading and writing of primitive values.
//!
//! Every structure this crate touches (PE headers, metadata streams, method bodies,
//! Portable PDB tables) is little-endian. Reads go through [`read_le_at`] which advances
//! an offset and fails with [`crate::Error::OutOfBounds`] instead of panicking. Writes
//! come in two flavours: patching a fixed buffer in place ([`write_le_at`]) and
//! appending to a growing `Vec<u8>` ([`push_le`]), which is what the serializers use.
//!
//! ECMA-335 II.23.2 compressed integers are encoded here as well, the decoding side lives
//! on [`crate::file::parser::Parser`].

use crate::{Error::OutOfBounds, Result};

/// Trait for primitive values that can be converted from and to little-endian bytes.
pub trait CilIO: Sized + Copy {
    /// The fixed-size byte array representation of this type.
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Read T from a byte buffer in little-endian
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Write T to a byte buffer in little-endian
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_cilio {
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

impl_cilio!(
    u8 => 1, i8 => 1, u16 => 2, i16 => 2, u32 => 4, i32 => 4, u64 => 8, i64 => 8, f32 => 4, f64 => 8,
);

/// Reads a value of type `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is too short.
pub fn read_le<T: CilIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Reads a value of type `T` at `offset` and advances the offset by its size.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at<T: CilIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let end = offset.checked_add(type_len).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(OutOfBounds);
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Reads either a 2-byte or a 4-byte index, promoting the result to `u32`.
///
/// Heap and table indices in the `#~` stream use this encoding depending on heap sizes
/// and row counts.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if there are insufficient bytes.
pub fn read_le_at_dyn(data: &[u8], offset: &mut usize, is_large: bool) -> Result<u32> {
    if is_large {
        read_le_at::<u32>(data, offset)
    } else {
        Ok(u32::from(read_le_at::<u16>(data, offset)?))
    }
}

/// Writes `value` at `offset` into a fixed buffer and advances the offset.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
pub fn write_le_at<T: CilIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let bytes = value.to_le_bytes();
    let bytes = bytes.as_ref();
    let end = offset.checked_add(bytes.len()).ok_or(OutOfBounds)?;
    if end > data.len() {
        return Err(OutOfBounds);
    }

    data[*offset..end].copy_from_slice(bytes);
    *offset = end;
    Ok(())
}

/// Writes `value` at the fixed position `offset`, without an offset cursor.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the value does not fit.
pub fn write_le_to<T: CilIO>(data: &mut [u8], offset: usize, value: T) -> Result<()> {
    let mut cursor = offset;
    write_le_at(data, &mut cursor, value)
}

/// Appends `value` to `buffer` in little-endian order.
pub fn push_le<T: CilIO>(buffer: &mut Vec<u8>, value: T) {
    buffer.extend_from_slice(value.to_le_bytes().as_ref());
}

/// Appends a 2-byte or 4-byte index.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if a small index does not fit into 16 bits.
pub fn push_le_dyn(buffer: &mut Vec<u8>, value: u32, is_large: bool) -> Result<()> {
    if is_large {
        push_le(buffer, value);
    } else {
        let Ok(small) = u16::try_from(value) else {
            return Err(OutOfBounds);
        };
        push_le(buffer, small);
    }
    Ok(())
}

/// Appends an ECMA-335 compressed unsigned integer (II.23.2).
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for values above `0x1FFF_FFFF`.
pub fn push_compressed_uint(buffer: &mut Vec<u8>, value: u32) -> Result<()> {
    match value {
        0..=0x7F => buffer.push(value as u8),
        0x80..=0x3FFF => {
            buffer.push(((value >> 8) as u8) | 0x80);
            buffer.push(value as u8);
        }
        0x4000..=0x1FFF_FFFF => {
            buffer.push(((value >> 24) as u8) | 0xC0);
            buffer.push((value >> 16) as u8);
            buffer.push((value >> 8) as u8);
            buffer.push(value as u8);
        }
        _ => return Err(OutOfBounds),
    }
    Ok(())
}

/// Appends an ECMA-335 compressed signed integer (II.23.2).
///
/// The value is rotated so the sign bit ends up in the least significant position of the
/// chosen width.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] for values outside `-2^28..2^28`.
pub fn push_compressed_int(buffer: &mut Vec<u8>, value: i32) -> Result<()> {
    let rotate = |value: i32, bits: u32| -> u32 {
        let mask = (1_u32 << bits) - 1;
        let unsigned = (value as u32) & mask;
        ((unsigned << 1) | u32::from(value < 0)) & mask
    };

    if (-0x40..0x40).contains(&value) {
        buffer.push(rotate(value, 7) as u8);
        Ok(())
    } else if (-0x2000..0x2000).contains(&value) {
        let rotated = rotate(value, 14);
        buffer.push(((rotated >> 8) as u8) | 0x80);
        buffer.push(rotated as u8);
        Ok(())
    } else if (-0x1000_0000..0x1000_0000).contains(&value) {
        let rotated = rotate(value, 29);
        buffer.push(((rotated >> 24) as u8) | 0xC0);
        buffer.push((rotated >> 16) as u8);
        buffer.push((rotated >> 8) as u8);
        buffer.push(rotated as u8);
        Ok(())
    } else {
        Err(OutOfBounds)
    }
}

/// Pads `buffer` with zeros until its length is a multiple of `alignment`.
pub fn pad_to(buffer: &mut Vec<u8>, alignment: usize) {
    let aligned = align_up(buffer.len(), alignment);
    buffer.resize(aligned, 0);
}

/// Rounds `value` up to the next multiple of `alignment`. An alignment of zero is a no-op.
#[must_use]
pub fn align_up(value: usize, alignment: usize) -> usize {
    if alignment == 0 {
        return value;
    }
    value.div_ceil(alignment) * alignment
}
