use super::error::{Error, Result};
use byteorder::{ByteOrder, LE};

/// Sign flag of the sign-magnitude integer encoding.
const SIGN: u64 = 0x8000000000000000;

/// Size of an encoded control instruction.
pub const CONTROL_SIZE: usize = 24;

/// Single bsdiff control instruction.
///
/// Adds `add` bytes of delta to the source, copies `copy` bytes of extra data,
/// then moves the source cursor by `seek`.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Control {
    pub add: u64,
    pub copy: u64,
    pub seek: i64,
}

impl Control {
    /// Encodes the control as three sign-magnitude integers.
    ///
    /// `add` and `copy` must not exceed `i64::MAX`, the format has no room for
    /// larger lengths.
    pub fn encode(&self) -> [u8; CONTROL_SIZE] {
        debug_assert!(self.add <= i64::MAX as u64 && self.copy <= i64::MAX as u64);
        let mut buf = [0; CONTROL_SIZE];
        encode_int(self.add as i64, &mut buf[0..8]);
        encode_int(self.copy as i64, &mut buf[8..16]);
        encode_int(self.seek, &mut buf[16..24]);
        buf
    }

    /// Decodes a control, rejecting negative lengths.
    pub fn decode(buf: &[u8; CONTROL_SIZE]) -> Result<Self> {
        let add = decode_int(&buf[0..8]);
        let copy = decode_int(&buf[8..16]);
        let seek = decode_int(&buf[16..24]);
        if add < 0 || copy < 0 {
            return Err(Error::Corrupt("negative length in control"));
        }
        Ok(Control {
            add: add as u64,
            copy: copy as u64,
            seek,
        })
    }
}

/// Decodes a sign-magnitude little-endian integer from the first 8 bytes.
///
/// The low 63 bits hold the magnitude and the top bit is the sign, so a set
/// sign flag with zero magnitude decodes to zero.
#[inline]
pub fn decode_int(b: &[u8]) -> i64 {
    let x = LE::read_u64(b);
    let magnitude = (x & !SIGN) as i64;
    if x & SIGN == 0 {
        magnitude
    } else {
        -magnitude
    }
}

/// Encodes a sign-magnitude little-endian integer into the first 8 bytes.
///
/// `i64::MIN` has no representation and is written as `-i64::MAX`.
#[inline]
pub fn encode_int(x: i64, b: &mut [u8]) {
    if x < 0 {
        let magnitude = x.checked_neg().unwrap_or(i64::MAX) as u64;
        LE::write_u64(b, magnitude | SIGN);
    } else {
        LE::write_u64(b, x as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(x: i64) -> [u8; 8] {
        let mut b = [0; 8];
        encode_int(x, &mut b);
        b
    }

    #[test]
    fn positive_is_plain_little_endian() {
        assert_eq!(encoded(0), [0; 8]);
        assert_eq!(encoded(1), [1, 0, 0, 0, 0, 0, 0, 0]);
        assert_eq!(encoded(0x0102), [2, 1, 0, 0, 0, 0, 0, 0]);
        assert_eq!(encoded(i64::MAX), [0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x7f]);
    }

    #[test]
    fn negative_sets_sign_bit() {
        assert_eq!(encoded(-1), [1, 0, 0, 0, 0, 0, 0, 0x80]);
        assert_eq!(encoded(-0x0102), [2, 1, 0, 0, 0, 0, 0, 0x80]);
        assert_ne!(encoded(-1), (-1i64).to_le_bytes());
    }

    #[test]
    fn decode_inverts_encode() {
        for &x in [0, 1, -1, 255, -256, 1 << 40, -(1 << 40), i64::MAX, -i64::MAX].iter() {
            assert_eq!(decode_int(&encoded(x)), x);
        }
    }

    #[test]
    fn negative_zero_decodes_to_zero() {
        assert_eq!(decode_int(&[0, 0, 0, 0, 0, 0, 0, 0x80]), 0);
    }

    #[test]
    fn min_saturates() {
        assert_eq!(decode_int(&encoded(i64::MIN)), -i64::MAX);
    }

    #[test]
    fn control_lengths_up_to_max() {
        let ctl = Control {
            add: i64::MAX as u64,
            copy: i64::MAX as u64,
            seek: -i64::MAX,
        };
        assert_eq!(Control::decode(&ctl.encode()).unwrap(), ctl);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn control_length_overflow() {
        let ctl = Control {
            add: 1 << 63,
            copy: 0,
            seek: 0,
        };
        let _ = ctl.encode();
    }

    #[test]
    fn control_rejects_negative_lengths() {
        let ctl = Control { add: 3, copy: 5, seek: -7 };
        let buf = ctl.encode();
        assert_eq!(Control::decode(&buf).unwrap(), ctl);

        let mut bad = buf;
        bad[7] |= 0x80;
        assert!(Control::decode(&bad).unwrap_err().is_corrupt());

        let mut bad = buf;
        bad[15] |= 0x80;
        assert!(Control::decode(&bad).unwrap_err().is_corrupt());
    }
}
