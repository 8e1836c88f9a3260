//! Reading and writing of dex containers.
//!
//! [`ClassContainer`] is the decoded, immutable model of one dex file. It is
//! produced by [`ClassContainer::from_bytes`] and turned back into a dex file by
//! [`ClassContainer::to_bytes`].

#[macro_use]
pub mod error;

pub(crate) mod leb;
pub mod encoded_values;
pub mod annotations;
pub mod container;
pub(crate) mod writer;

pub use container::{
    read_class_names, ClassContainer, ClassDefinition, CodeItem, FieldDefinition, IdPools, MethodDefinition,
};
pub use error::DexError;

use crate::dex::leb::{decode_sleb128, decode_uleb128, encode_uleb128};

// Basic type reading and writing
pub(crate) fn read_u1(bytes: &[u8], ix: &mut usize) -> Result<u8, DexError>
{
    if bytes.len() < *ix + 1
    {
        fail!("Unexpected end of stream reading u1 at index {}", *ix);
    }
    let result = bytes[*ix];
    *ix += 1;
    Ok(result)
}

pub(crate) fn read_u2(bytes: &[u8], ix: &mut usize) -> Result<u16, DexError>
{
    if bytes.len() < *ix + 2
    {
        fail!("Unexpected end of stream reading u2 at index {}", *ix);
    }
    let result = u16::from_le_bytes([bytes[*ix], bytes[*ix + 1]]);
    *ix += 2;
    Ok(result)
}

pub(crate) fn read_u4(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    if bytes.len() < *ix + 4
    {
        fail!("Unexpected end of stream reading u4 at index {}", *ix);
    }
    let result = u32::from_le_bytes([bytes[*ix], bytes[*ix + 1], bytes[*ix + 2], bytes[*ix + 3]]);
    *ix += 4;
    Ok(result)
}

pub(crate) fn read_uleb128(bytes: &[u8], ix: &mut usize) -> Result<u32, DexError>
{
    let rest = bytes.get(*ix..).unwrap_or_default();
    match decode_uleb128(rest)
    {
        Some((val, size)) => {
            *ix += size;
            Ok(val)
        }
        None => fail!("Unexpected end of stream reading uleb128 at index {}", *ix),
    }
}

pub(crate) fn read_sleb128(bytes: &[u8], ix: &mut usize) -> Result<i32, DexError>
{
    let rest = bytes.get(*ix..).unwrap_or_default();
    match decode_sleb128(rest)
    {
        Some((val, size)) => {
            *ix += size;
            Ok(val)
        }
        None => fail!("Unexpected end of stream reading sleb128 at index {}", *ix),
    }
}

pub(crate) fn read_x(bytes: &[u8], ix: &mut usize, length: usize) -> Result<Vec<u8>, DexError>
{
    match bytes.get(*ix..).filter(|rest| rest.len() >= length)
    {
        Some(rest) => {
            let v = rest[..length].to_vec();
            *ix += length;
            Ok(v)
        }
        None => Err(DexError::new(format!("buffer too short for {} byte read at index {}", length, *ix))),
    }
}

pub(crate) fn write_u1(buffer: &mut Vec<u8>, val: u8) -> usize
{
    buffer.push(val);
    1
}

pub(crate) fn write_u2(buffer: &mut Vec<u8>, val: u16) -> usize
{
    buffer.extend_from_slice(&val.to_le_bytes());
    2
}

pub(crate) fn write_u4(buffer: &mut Vec<u8>, val: u32) -> usize
{
    buffer.extend_from_slice(&val.to_le_bytes());
    4
}

pub(crate) fn write_uleb128(buffer: &mut Vec<u8>, val: u32) -> usize
{
    let encoded = encode_uleb128(val);
    let c = encoded.len();
    buffer.extend(encoded);
    c
}

pub(crate) fn write_x(buffer: &mut Vec<u8>, val: &[u8]) -> usize
{
    buffer.extend_from_slice(val);
    val.len()
}

/// Overwrites four little-endian bytes at `position`, used to patch offsets once known.
pub(crate) fn patch_u4(buffer: &mut [u8], position: usize, val: u32)
{
    buffer[position..position + 4].copy_from_slice(&val.to_le_bytes());
}
