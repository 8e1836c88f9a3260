//! `encoded_value`, `encoded_array` and `encoded_annotation`.
//!
//! https://source.android.com/docs/core/runtime/dex-format#encoding
//!
//! Signed integral values are sign-extended, `char` and index values are
//! zero-extended, and floating point values are zero-extended to the right
//! (only the high-order bytes are stored). Writers always pick the minimal width.

use crate::dex::error::DexError;
use crate::dex::{read_u1, read_uleb128, write_u1, write_uleb128, write_x};

const VALUE_BYTE: u8 = 0x00;
const VALUE_SHORT: u8 = 0x02;
const VALUE_CHAR: u8 = 0x03;
const VALUE_INT: u8 = 0x04;
const VALUE_LONG: u8 = 0x06;
const VALUE_FLOAT: u8 = 0x10;
const VALUE_DOUBLE: u8 = 0x11;
const VALUE_METHOD_TYPE: u8 = 0x15;
const VALUE_METHOD_HANDLE: u8 = 0x16;
const VALUE_STRING: u8 = 0x17;
const VALUE_TYPE: u8 = 0x18;
const VALUE_FIELD: u8 = 0x19;
const VALUE_METHOD: u8 = 0x1a;
const VALUE_ENUM: u8 = 0x1b;
const VALUE_ARRAY: u8 = 0x1c;
const VALUE_ANNOTATION: u8 = 0x1d;
const VALUE_NULL: u8 = 0x1e;
const VALUE_BOOLEAN: u8 = 0x1f;

/// Arrays and annotations may nest; anything deeper than this is treated as corrupt.
const MAX_NESTING: usize = 64;

#[derive(Debug, PartialEq, Clone)]
pub struct EncodedAnnotation {
    pub type_idx: u32,
    pub elements: Vec<AnnotationElement>,
}

impl EncodedAnnotation {
    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedAnnotation, DexError> {
        Self::read_nested(bytes, ix, 0)
    }

    fn read_nested(bytes: &[u8], ix: &mut usize, depth: usize) -> Result<EncodedAnnotation, DexError> {
        let type_idx = read_uleb128(bytes, ix)?;
        let size = read_uleb128(bytes, ix)? as usize;
        let mut elements = Vec::with_capacity(size.min(256));

        for _ in 0..size {
            let name_idx = read_uleb128(bytes, ix)?;
            let value = EncodedValue::read_nested(bytes, ix, depth + 1)?;
            elements.push(AnnotationElement { name_idx, value });
        }

        Ok(EncodedAnnotation { type_idx, elements })
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize {
        let mut c = 0;
        c += write_uleb128(bytes, self.type_idx);
        c += write_uleb128(bytes, self.elements.len() as u32);
        for element in &self.elements {
            c += write_uleb128(bytes, element.name_idx);
            c += element.value.write(bytes);
        }
        c
    }

    /// The element whose name is the string at `name_idx`.
    pub fn element(&self, name_idx: u32) -> Option<&AnnotationElement> {
        self.elements.iter().find(|e| e.name_idx == name_idx)
    }
}


#[derive(Debug, PartialEq, Clone)]
pub struct AnnotationElement {
    pub name_idx: u32,
    pub value: EncodedValue,
}


#[derive(Debug, PartialEq, Clone)]
pub enum EncodedValue {
    Byte(i8),
    Short(i16),
    Char(u16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    MethodType(u32),
    MethodHandle(u32),
    String(u32),
    Type(u32),
    Field(u32),
    Method(u32),
    Enum(u32),
    Array(Vec<EncodedValue>),
    Annotation(EncodedAnnotation),
    Null,
    Boolean(bool),
}

impl EncodedValue
{
    #[inline]
    pub fn as_int(&self) -> Option<i32> {
        match self {
            EncodedValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn read(bytes: &[u8], ix: &mut usize) -> Result<EncodedValue, DexError> {
        Self::read_nested(bytes, ix, 0)
    }

    fn read_nested(bytes: &[u8], ix: &mut usize, depth: usize) -> Result<EncodedValue, DexError> {
        if depth > MAX_NESTING {
            fail!("encoded value nesting exceeds {} at index {}", MAX_NESTING, *ix);
        }
        let header_byte = read_u1(bytes, ix)?;
        let value_arg = header_byte >> 5;
        let value_type = header_byte & 0x1F;
        let size = (value_arg + 1) as usize;

        let value = match value_type {
            VALUE_BYTE => EncodedValue::Byte(read_signed(bytes, ix, size, 1)? as i8),
            VALUE_SHORT => EncodedValue::Short(read_signed(bytes, ix, size, 2)? as i16),
            VALUE_CHAR => EncodedValue::Char(read_unsigned(bytes, ix, size, 2)? as u16),
            VALUE_INT => EncodedValue::Int(read_signed(bytes, ix, size, 4)? as i32),
            VALUE_LONG => EncodedValue::Long(read_signed(bytes, ix, size, 8)?),
            VALUE_FLOAT => {
                let raw = read_right_extended(bytes, ix, size, 4)? as u32;
                EncodedValue::Float(f32::from_bits(raw))
            }
            VALUE_DOUBLE => EncodedValue::Double(f64::from_bits(read_right_extended(bytes, ix, size, 8)?)),
            VALUE_METHOD_TYPE => EncodedValue::MethodType(read_index(bytes, ix, size)?),
            VALUE_METHOD_HANDLE => EncodedValue::MethodHandle(read_index(bytes, ix, size)?),
            VALUE_STRING => EncodedValue::String(read_index(bytes, ix, size)?),
            VALUE_TYPE => EncodedValue::Type(read_index(bytes, ix, size)?),
            VALUE_FIELD => EncodedValue::Field(read_index(bytes, ix, size)?),
            VALUE_METHOD => EncodedValue::Method(read_index(bytes, ix, size)?),
            VALUE_ENUM => EncodedValue::Enum(read_index(bytes, ix, size)?),
            VALUE_ARRAY => EncodedValue::Array(read_array_nested(bytes, ix, depth + 1)?),
            VALUE_ANNOTATION => EncodedValue::Annotation(EncodedAnnotation::read_nested(bytes, ix, depth + 1)?),
            VALUE_NULL => EncodedValue::Null,
            VALUE_BOOLEAN => EncodedValue::Boolean(value_arg != 0),
            other => fail!("Unknown EncodedValue type 0x{:02x} at index {}", other, *ix - 1),
        };
        Ok(value)
    }

    pub fn write(&self, bytes: &mut Vec<u8>) -> usize
    {
        match self {
            EncodedValue::Byte(v) => write_signed(bytes, VALUE_BYTE, *v as i64),
            EncodedValue::Short(v) => write_signed(bytes, VALUE_SHORT, *v as i64),
            EncodedValue::Char(v) => write_unsigned(bytes, VALUE_CHAR, *v as u64),
            EncodedValue::Int(v) => write_signed(bytes, VALUE_INT, *v as i64),
            EncodedValue::Long(v) => write_signed(bytes, VALUE_LONG, *v),
            EncodedValue::Float(v) => write_right_extended(bytes, VALUE_FLOAT, v.to_bits() as u64, 4),
            EncodedValue::Double(v) => write_right_extended(bytes, VALUE_DOUBLE, v.to_bits(), 8),
            EncodedValue::MethodType(v) => write_unsigned(bytes, VALUE_METHOD_TYPE, *v as u64),
            EncodedValue::MethodHandle(v) => write_unsigned(bytes, VALUE_METHOD_HANDLE, *v as u64),
            EncodedValue::String(v) => write_unsigned(bytes, VALUE_STRING, *v as u64),
            EncodedValue::Type(v) => write_unsigned(bytes, VALUE_TYPE, *v as u64),
            EncodedValue::Field(v) => write_unsigned(bytes, VALUE_FIELD, *v as u64),
            EncodedValue::Method(v) => write_unsigned(bytes, VALUE_METHOD, *v as u64),
            EncodedValue::Enum(v) => write_unsigned(bytes, VALUE_ENUM, *v as u64),
            EncodedValue::Array(values) => write_u1(bytes, VALUE_ARRAY) + write_encoded_array(values, bytes),
            EncodedValue::Annotation(annotation) => write_u1(bytes, VALUE_ANNOTATION) + annotation.write(bytes),
            EncodedValue::Null => write_u1(bytes, VALUE_NULL),
            EncodedValue::Boolean(v) => write_u1(bytes, VALUE_BOOLEAN | ((*v as u8) << 5)),
        }
    }
}

fn read_le(bytes: &[u8], ix: &mut usize, size: usize, max: usize) -> Result<u64, DexError> {
    if size > max {
        fail!("encoded value width {} exceeds {} at index {}", size, max, *ix);
    }
    let mut result = 0u64;
    for i in 0..size {
        result |= (read_u1(bytes, ix)? as u64) << (8 * i);
    }
    Ok(result)
}

fn read_signed(bytes: &[u8], ix: &mut usize, size: usize, max: usize) -> Result<i64, DexError> {
    let raw = read_le(bytes, ix, size, max)?;
    let shift = 64 - 8 * size as u32;
    Ok(((raw << shift) as i64) >> shift)
}

fn read_unsigned(bytes: &[u8], ix: &mut usize, size: usize, max: usize) -> Result<u64, DexError> {
    read_le(bytes, ix, size, max)
}

fn read_index(bytes: &[u8], ix: &mut usize, size: usize) -> Result<u32, DexError> {
    Ok(read_le(bytes, ix, size, 4)? as u32)
}

fn read_right_extended(bytes: &[u8], ix: &mut usize, size: usize, max: usize) -> Result<u64, DexError> {
    let raw = read_le(bytes, ix, size, max)?;
    Ok(raw << (8 * (max - size)))
}

fn write_header_and_payload(bytes: &mut Vec<u8>, value_type: u8, payload: &[u8]) -> usize {
    let mut c = write_u1(bytes, (((payload.len() - 1) as u8) << 5) | value_type);
    c += write_x(bytes, payload);
    c
}

fn write_signed(bytes: &mut Vec<u8>, value_type: u8, value: i64) -> usize {
    // smallest width whose sign extension reproduces the value
    let mut width = 8;
    while width > 1 {
        let shift = 64 - 8 * (width - 1) as u32;
        if (value << shift) >> shift != value {
            break;
        }
        width -= 1;
    }
    write_header_and_payload(bytes, value_type, &value.to_le_bytes()[..width])
}

fn write_unsigned(bytes: &mut Vec<u8>, value_type: u8, value: u64) -> usize {
    let width = ((64 - value.leading_zeros() as usize) + 7) / 8;
    write_header_and_payload(bytes, value_type, &value.to_le_bytes()[..width.max(1)])
}

fn write_right_extended(bytes: &mut Vec<u8>, value_type: u8, bits: u64, max: usize) -> usize {
    let le = bits.to_le_bytes();
    let significant = &le[..max];
    let skip = significant.iter().take_while(|b| **b == 0).count().min(max - 1);
    write_header_and_payload(bytes, value_type, &significant[skip..])
}

pub fn write_encoded_array(encoded_array: &[EncodedValue], bytes: &mut Vec<u8>) -> usize
{
    let mut c = write_uleb128(bytes, encoded_array.len() as u32);
    for value in encoded_array {
        c += value.write(bytes);
    }
    c
}

pub fn read_encoded_array(bytes: &[u8], ix: &mut usize) -> Result<Vec<EncodedValue>, DexError>
{
    read_array_nested(bytes, ix, 0)
}

fn read_array_nested(bytes: &[u8], ix: &mut usize, depth: usize) -> Result<Vec<EncodedValue>, DexError>
{
    let size = read_uleb128(bytes, ix)? as usize;
    let mut values = Vec::with_capacity(size.min(1024));
    for _ in 0..size
    {
        values.push(EncodedValue::read_nested(bytes, ix, depth + 1)?);
    }
    Ok(values)
}
