//! Bit-aligned reads over an RBSP buffer, MSB-first, with exp-Golomb helpers.
//!
//! Builds on `bitstream_io` the way the teacher's `base.rs`/`vps.rs` already
//! do, but packages it as a single owned reader so `bits_remaining()` and
//! `show_bits()` (peek) are available without threading a separate byte
//! count through every caller. Bit position is tracked locally rather than
//! derived from the inner reader's byte offset, since the latter is only
//! meaningful at byte boundaries.

use std::io::{self, Cursor, SeekFrom};

use bitstream_io::BitRead as _;
use bitstream_io::{BigEndian, BitReader as RawBitReader};

use crate::base::{read_exp_golomb_se, read_exp_golomb_ue};

/// Reads an RBSP byte buffer bit-by-bit, MSB-first within each byte.
pub struct BitReader<'a> {
    inner: RawBitReader<Cursor<&'a [u8]>, BigEndian>,
    total_bits: u64,
    bits_consumed: u64,
}

impl<'a> BitReader<'a> {
    pub fn new(rbsp: &'a [u8]) -> Self {
        Self {
            inner: RawBitReader::endian(Cursor::new(rbsp), BigEndian),
            total_bits: rbsp.len() as u64 * 8,
            bits_consumed: 0,
        }
    }

    /// Reads `n` bits (1 <= n <= 32) into an unsigned integer.
    pub fn read_bits(&mut self, n: u32) -> io::Result<u32> {
        if n == 0 || n > 32 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "read_bits: n must be in 1..=32",
            ));
        }
        let value = self.inner.read(n)?;
        self.bits_consumed += n as u64;
        Ok(value)
    }

    pub fn read_bit(&mut self) -> io::Result<bool> {
        let bit = self.inner.read_bit()?;
        self.bits_consumed += 1;
        Ok(bit)
    }

    /// Unsigned 0-th order exp-Golomb (spec §4.1: <= 32 leading zeros).
    pub fn read_ue(&mut self) -> io::Result<u32> {
        let mut bit_count = 0u32;
        let value = crate::base::read_exp_golomb_ue_count_bits(&mut self.inner, &mut bit_count)?;
        self.bits_consumed += bit_count as u64;
        Ok(value)
    }

    /// Signed 0-th order exp-Golomb.
    pub fn read_se(&mut self) -> io::Result<i32> {
        let mut bit_count = 0u32;
        let code_num =
            crate::base::read_exp_golomb_ue_count_bits(&mut self.inner, &mut bit_count)?;
        self.bits_consumed += bit_count as u64;
        Ok(if code_num & 1 != 0 {
            ((code_num >> 1) + 1) as i32
        } else {
            -((code_num >> 1) as i32)
        })
    }

    /// Number of bits consumed so far.
    pub fn bits_read(&self) -> u64 {
        self.bits_consumed
    }

    /// Bits remaining in the buffer.
    pub fn bits_remaining(&self) -> u64 {
        self.total_bits.saturating_sub(self.bits_consumed)
    }

    /// Peeks `n` bits without consuming them.
    pub fn show_bits(&mut self, n: u32) -> io::Result<u32> {
        let value = self.read_bits(n)?;
        self.inner.seek_bits(SeekFrom::Current(-(n as i64)))?;
        self.bits_consumed -= n as u64;
        Ok(value)
    }

    pub fn align_to_byte(&mut self) {
        let pad = (8 - (self.bits_consumed % 8)) % 8;
        self.inner.byte_align();
        self.bits_consumed += pad;
    }

    /// `more_rbsp_data()`: remaining bits aren't exactly the RBSP trailing
    /// stop bit (a single `1`) followed by zero padding to the next byte.
    pub fn more_rbsp_data(&mut self) -> io::Result<bool> {
        let remaining = self.bits_remaining();
        if remaining == 0 {
            return Ok(false);
        }

        let mut saw_one = false;
        let mut only_trailing = true;
        let mut scanned = 0u64;
        for _ in 0..remaining {
            let bit = self.read_bit()?;
            scanned += 1;
            if !saw_one {
                if bit {
                    saw_one = true;
                } else {
                    only_trailing = false;
                    break;
                }
            } else if bit {
                only_trailing = false;
                break;
            }
        }
        self.inner.seek_bits(SeekFrom::Current(-(scanned as i64)))?;
        self.bits_consumed -= scanned;

        Ok(!(saw_one && only_trailing))
    }

    pub fn into_reader(self) -> RawBitReader<Cursor<&'a [u8]>, BigEndian> {
        self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fixed_width_fields() {
        let bytes = [0b1010_1100u8, 0b1111_0000];
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_bits(4).unwrap(), 0b1010);
        assert_eq!(r.read_bits(4).unwrap(), 0b1100);
        assert_eq!(r.read_bits(8).unwrap(), 0b1111_0000);
        assert_eq!(r.bits_read(), 16);
    }

    #[test]
    fn show_bits_does_not_consume() {
        let bytes = [0b1100_0000u8];
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.show_bits(2).unwrap(), 0b11);
        assert_eq!(r.read_bits(2).unwrap(), 0b11);
        assert_eq!(r.bits_read(), 2);
    }

    #[test]
    fn more_rbsp_data_detects_trailing_bits() {
        // 0b1_0000000: a lone stop bit followed by zero padding.
        let bytes = [0b1000_0000u8];
        let mut r = BitReader::new(&bytes);
        assert!(!r.more_rbsp_data().unwrap());
        // The peek must not have consumed anything.
        assert_eq!(r.bits_read(), 0);
    }

    #[test]
    fn more_rbsp_data_true_when_payload_remains() {
        let bytes = [0b0101_0000u8, 0b1000_0000];
        let mut r = BitReader::new(&bytes);
        assert!(r.more_rbsp_data().unwrap());
    }

    #[test]
    fn exp_golomb_round_trips_small_values() {
        // ue(0) = '1'
        let bytes = [0b1000_0000u8];
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.read_ue().unwrap(), 0);
    }

    #[test]
    fn bits_remaining_tracks_consumption() {
        let bytes = [0u8; 4];
        let mut r = BitReader::new(&bytes);
        assert_eq!(r.bits_remaining(), 32);
        r.read_bits(10).unwrap();
        assert_eq!(r.bits_remaining(), 22);
    }

    /// Encodes `value` as a 0-th order Exp-Golomb code (§9.2), left-aligned
    /// at the start of the returned buffer, with zero padding after it.
    fn encode_ue(value: u32) -> Vec<u8> {
        use bitstream_io::{BitWrite as _, BitWriter};

        let code_num_plus1 = value + 1;
        let num_bits = 32 - code_num_plus1.leading_zeros();
        let leading_zeros = num_bits - 1;
        let total_bits = leading_zeros + num_bits;
        let byte_len = (total_bits as usize).div_ceil(8) + 1;
        let mut bytes = vec![0u8; byte_len];
        {
            let mut writer = BitWriter::endian(&mut bytes[..], BigEndian);
            for _ in 0..leading_zeros {
                writer.write_bit(false).unwrap();
            }
            writer.write(num_bits, code_num_plus1).unwrap();
        }
        bytes
    }

    fn encode_se(value: i32) -> Vec<u8> {
        let code_num = if value > 0 {
            2 * value as u32 - 1
        } else {
            (-2i64 * value as i64) as u32
        };
        encode_ue(code_num)
    }

    proptest::proptest! {
        #[test]
        fn ue_round_trips(value in 0u32..200_000) {
            let bytes = encode_ue(value);
            let mut r = BitReader::new(&bytes);
            proptest::prop_assert_eq!(r.read_ue().unwrap(), value);
        }

        #[test]
        fn se_round_trips(value in -100_000i32..100_000) {
            let bytes = encode_se(value);
            let mut r = BitReader::new(&bytes);
            proptest::prop_assert_eq!(r.read_se().unwrap(), value);
        }
    }
}
