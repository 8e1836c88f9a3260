//! LEB128 variable-length integers as used throughout the dex format.
//!
//! Dex values are 32-bit, so a valid encoding never exceeds five bytes. The
//! decoders return `None` when the input ends in the middle of a value.

const MAX_LEB128_LEN: usize = 5;

pub(crate) fn encode_uleb128(value: u32) -> Vec<u8> {
    let mut result = Vec::with_capacity(MAX_LEB128_LEN);
    let mut remaining = value;

    loop {
        let mut byte = (remaining & 0x7F) as u8;
        remaining >>= 7;
        if remaining != 0 {
            byte |= 0x80;
        }
        result.push(byte);
        if remaining == 0 {
            break;
        }
    }

    result
}

pub(crate) fn decode_uleb128(encoded: &[u8]) -> Option<(u32, usize)> {
    let mut value: u32 = 0;

    for (count, &byte) in encoded.iter().take(MAX_LEB128_LEN).enumerate() {
        // the fifth byte only contributes its low four bits
        value |= ((byte & 0x7F) as u32).wrapping_shl(7 * count as u32);
        if byte & 0x80 == 0 || count + 1 == MAX_LEB128_LEN {
            return Some((value, count + 1));
        }
    }

    None
}

pub(crate) fn decode_sleb128(encoded: &[u8]) -> Option<(i32, usize)> {
    let mut value: i32 = 0;

    for (count, &byte) in encoded.iter().take(MAX_LEB128_LEN).enumerate() {
        let shift = 7 * count as u32;
        value |= ((byte & 0x7F) as i32).wrapping_shl(shift);

        if byte & 0x80 == 0 || count + 1 == MAX_LEB128_LEN {
            let used = shift + 7;
            if used < 32 && (byte & 0x40) != 0 {
                value |= (-1i32).wrapping_shl(used);
            }
            return Some((value, count + 1));
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_uleb128() {
        let cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (16256, vec![0x80, 0x7F]),
            (624485, vec![0xE5, 0x8E, 0x26]),
            (u32::MAX, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];

        for (value, expected) in cases {
            assert_eq!(encode_uleb128(value), expected);
        }
    }

    #[test]
    fn test_decode_uleb128() {
        let cases = vec![
            (vec![0x00], 0, 1),
            (vec![0x7F], 127, 1),
            (vec![0x80, 0x7F], 16256, 2),
            (vec![0xE5, 0x8E, 0x26, 0xAA], 624485, 3),
            (vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F], u32::MAX, 5),
        ];

        for (encoded, expected, used) in cases {
            assert_eq!(decode_uleb128(&encoded), Some((expected, used)));
        }
    }

    #[test]
    fn truncated_values_are_rejected() {
        assert_eq!(decode_uleb128(&[]), None);
        assert_eq!(decode_uleb128(&[0x80, 0x80]), None);
        assert_eq!(decode_sleb128(&[0xC0]), None);
    }

    #[test]
    fn test_decode_sleb128() {
        let cases = vec![
            (vec![0x00], 0),
            (vec![0x01], 1),
            (vec![0x7F], -1),
            (vec![0xFF, 0x00], 127),
            (vec![0x80, 0x7F], -128),
            (vec![0xC0, 0xBB, 0x78], -123456),
        ];

        for (encoded, expected) in cases {
            let (v, used) = decode_sleb128(&encoded).expect("complete value");
            assert_eq!(v, expected);
            assert_eq!(used, encoded.len());
        }
    }
}
