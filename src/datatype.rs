//! The closed set of ~22 binary datatype codes: width table and the
//! datatype interpreter (decode/encode).

use crate::error::WpuError;

/// Number of bytes a datatype code consumes from a payload.
pub fn width(dt: u8) -> Option<usize> {
    match dt {
        0x00 | 0x01 | 0x02 | 0x0C | 0x0F | 0x6C | 0x80 | 0x81 | 0x82 | 0x8F => Some(1),
        0x10 | 0x11 | 0x12 | 0x13 | 0x14 | 0x51 | 0x90 | 0x91 | 0x92 => Some(2),
        0x20 | 0x21 | 0x22 | 0x23 | 0x24 | 0x25 | 0xA0 | 0xA1 | 0xA2 | 0xA3 | 0xA4 | 0xA5 => {
            Some(4)
        }
        _ => None,
    }
}

/// A decoded measurement value with its decimal scale already applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Decoded {
    pub value: f64,
    pub decimals: u32,
}

impl Decoded {
    fn new(value: f64, decimals: u32) -> Self {
        Decoded { value, decimals }
    }
}

/// Decodes `bytes` (big-endian, exactly `width(dt)` long) per datatype `dt`.
///
/// The `0x12` legacy division-precedence bug (`(msb<<8) + lsb/100` in
/// historical revisions of the source) is *not* reproduced here; this
/// implements the mathematically sensible reading (`value / 100` applied to
/// the whole 16-bit value).
pub fn decode(dt: u8, bytes: &[u8]) -> Result<Decoded, WpuError> {
    match dt {
        0x00 | 0x0C => Ok(Decoded::new(bytes[0] as f64, 0)),
        0x01 => Ok(Decoded::new(bytes[0] as f64 / 10.0, 1)),
        0x02 => Ok(Decoded::new(bytes[0] as f64 / 100.0, 2)),
        0x10 => Ok(Decoded::new(u16::from_be_bytes([bytes[0], bytes[1]]) as f64, 0)),
        0x12 => Ok(Decoded::new(
            u16::from_be_bytes([bytes[0], bytes[1]]) as f64 / 100.0,
            2,
        )),
        0x13 => Ok(Decoded::new(
            u16::from_be_bytes([bytes[0], bytes[1]]) as f64 / 1000.0,
            3,
        )),
        0x14 => Ok(Decoded::new(
            u16::from_be_bytes([bytes[0], bytes[1]]) as f64 / 10000.0,
            4,
        )),
        0x80 => Ok(Decoded::new(bytes[0] as i8 as f64, 0)),
        0x81 => Ok(Decoded::new(bytes[0] as i8 as f64 / 10.0, 1)),
        0x82 => Ok(Decoded::new(bytes[0] as i8 as f64 / 100.0, 2)),
        0x8F => Ok(Decoded::new(bytes[0] as i8 as f64 / 1000.0, 3)),
        0x90 => Ok(Decoded::new(
            i16::from_be_bytes([bytes[0], bytes[1]]) as f64,
            0,
        )),
        0x91 => Ok(Decoded::new(
            i16::from_be_bytes([bytes[0], bytes[1]]) as f64 / 10.0,
            1,
        )),
        0x92 => Ok(Decoded::new(
            i16::from_be_bytes([bytes[0], bytes[1]]) as f64 / 100.0,
            2,
        )),
        0x20 => Ok(Decoded::new(
            u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64,
            0,
        )),
        other => Err(WpuError::UnknownDatatype(other)),
    }
}

/// Scale factor (10^decimals) applied between the user-facing decimal and
/// the wire-level integer for a writeable datatype. Used by the CLI
/// boundary to normalize a typed decimal (e.g. `3.14`) into the integer the
/// codec expects (e.g. `314` for a `0x12`-typed setting).
pub fn scale_factor(dt: u8) -> Result<u32, WpuError> {
    match dt {
        0x00 | 0x0C | 0x10 | 0x20 | 0x80 | 0x90 => Ok(1),
        0x01 | 0x81 | 0x91 => Ok(10),
        0x02 | 0x12 | 0x82 | 0x92 => Ok(100),
        0x13 => Ok(1_000),
        0x8F => Ok(1_000),
        0x14 => Ok(10_000),
        other => Err(WpuError::UnknownDatatype(other)),
    }
}

/// Encodes a nonnegative, already-normalized integer as big-endian bytes of
/// the given width. Negative values are unsupported.
pub fn encode_unsigned(value: u32, width: usize) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    bytes[4 - width..].to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_table_matches_spec() {
        assert_eq!(width(0x00), Some(1));
        assert_eq!(width(0x0F), Some(1));
        assert_eq!(width(0x6C), Some(1));
        assert_eq!(width(0x8F), Some(1));
        assert_eq!(width(0x10), Some(2));
        assert_eq!(width(0x51), Some(2));
        assert_eq!(width(0x92), Some(2));
        assert_eq!(width(0x20), Some(4));
        assert_eq!(width(0xA5), Some(4));
        assert_eq!(width(0xFF), None);
    }

    #[test]
    fn s4_datalog_sign_reconstruction() {
        let d = decode(0x92, &[0xFF, 0x38]).unwrap();
        assert_eq!(d.value, -2.00);
    }

    #[test]
    fn sign_reconstruction_8bit() {
        let d = decode(0x81, &[0xFF]).unwrap();
        assert_eq!(d.value, -0.1);
    }

    #[test]
    fn sign_reconstruction_16bit_minus_one() {
        let d = decode(0x90, &[0xFF, 0xFF]).unwrap();
        assert_eq!(d.value, -1.0);
    }

    #[test]
    fn unknown_datatype_is_an_error_not_a_panic() {
        assert!(matches!(decode(0xFF, &[0x00]), Err(WpuError::UnknownDatatype(0xFF))));
    }

    #[test]
    fn datatype_round_trip_unsigned_widths() {
        for (dt, width_bytes) in [(0x10u8, 2usize), (0x20, 4)] {
            let v = 12345u32 & if width_bytes == 2 { 0xFFFF } else { 0xFFFF_FFFF };
            let bytes = encode_unsigned(v, width_bytes);
            let decoded = decode(dt, &bytes).unwrap();
            assert_eq!(decoded.value, v as f64);
        }
    }
}
