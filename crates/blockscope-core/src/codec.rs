//! Low-level byte codec shared by the wire, undo, and block decoders.
//!
//! Two distinct variable-length integer encodings live side by side in
//! Bitcoin's disk formats: CompactSize (consensus wire format) and the
//! undo file's CVarInt. They are kept as separate functions on purpose;
//! confusing one for the other decodes to plausible-looking but wrong
//! numbers rather than an error.

use bitcoin::hashes::{sha256d, Hash};

use crate::error::CoreError;

// ==============================================================================
// ByteReader
// ==============================================================================

/// A positioned reader over an in-memory byte slice.
///
/// All reads fail with a `TRUNCATED` error when the slice ends mid-value.
/// The `label` names the stream being decoded so truncation errors say
/// what was being read, not just where.
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
    label: &'static str,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8], label: &'static str) -> Self {
        Self {
            data,
            pos: 0,
            label,
        }
    }

    /// Current offset from the start of the underlying slice.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn truncated(&self) -> CoreError {
        CoreError::Truncated(self.label)
    }

    /// Read exactly `n` bytes, advancing the position.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8], CoreError> {
        if self.remaining() < n {
            return Err(self.truncated());
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    pub fn read_u8(&mut self) -> Result<u8, CoreError> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_u16_le(&mut self) -> Result<u16, CoreError> {
        let b = self.read_bytes(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, CoreError> {
        let b = self.read_bytes(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32_le(&mut self) -> Result<i32, CoreError> {
        Ok(self.read_u32_le()? as i32)
    }

    pub fn read_u64_le(&mut self) -> Result<u64, CoreError> {
        let b = self.read_bytes(8)?;
        let mut arr = [0u8; 8];
        arr.copy_from_slice(b);
        Ok(u64::from_le_bytes(arr))
    }

    /// Read a 32-byte hash field in its on-wire (internal) byte order.
    pub fn read_array_32(&mut self) -> Result<[u8; 32], CoreError> {
        let b = self.read_bytes(32)?;
        let mut arr = [0u8; 32];
        arr.copy_from_slice(b);
        Ok(arr)
    }

    /// Decode a CompactSize length prefix (wire format).
    ///
    /// One discriminator byte, then 0, 2, 4, or 8 little-endian bytes.
    pub fn read_compact_size(&mut self) -> Result<u64, CoreError> {
        match self.read_u8()? {
            n @ 0x00..=0xFC => Ok(u64::from(n)),
            0xFD => Ok(u64::from(self.read_u16_le()?)),
            0xFE => Ok(u64::from(self.read_u32_le()?)),
            0xFF => self.read_u64_le(),
        }
    }

    /// Decode a CVarInt (Bitcoin Core's on-disk variable integer, used in
    /// undo data). Base-128 with a continuation bit, plus an off-by-one
    /// accumulation on every continuation byte. NOT CompactSize.
    pub fn read_cvarint(&mut self) -> Result<u64, CoreError> {
        let mut n: u64 = 0;
        loop {
            let byte = self.read_u8()?;
            n = (n << 7) | u64::from(byte & 0x7F);
            if byte & 0x80 == 0 {
                return Ok(n);
            }
            n += 1;
        }
    }
}

// ==============================================================================
// Hashing
// ==============================================================================

/// Double SHA-256 in internal (non-reversed) byte order.
pub fn double_sha256(data: &[u8]) -> [u8; 32] {
    sha256d::Hash::hash(data).to_byte_array()
}

// ==============================================================================
// XOR de-obfuscation
// ==============================================================================

/// Undo Bitcoin Core's on-disk XOR obfuscation.
///
/// An empty or all-zero key is a no-op; otherwise each byte is XORed with
/// the key byte at its offset modulo the key length.
pub fn xor_decode(data: &[u8], key: &[u8]) -> Vec<u8> {
    if key.is_empty() || key.iter().all(|&b| b == 0) {
        return data.to_vec();
    }
    data.iter()
        .enumerate()
        .map(|(i, &b)| b ^ key[i % key.len()])
        .collect()
}

// ==============================================================================
// Amount decompression
// ==============================================================================

/// Decompress a satoshi amount from Bitcoin Core's undo/UTXO encoding.
///
/// Must stay bit-exact with Core's `DecompressAmount`; any deviation here
/// corrupts every reconstructed prevout and cascades into wrong fees.
pub fn decompress_amount(compressed: u64) -> u64 {
    if compressed == 0 {
        return 0;
    }
    let mut x = compressed - 1;
    // x = 10*(9*n + d - 1) + e, or 10*(n - 1) + 9 when e is 9.
    let e = x % 10;
    x /= 10;
    let mut n = if e < 9 {
        let d = (x % 9) + 1;
        x /= 9;
        x * 10 + d
    } else {
        x + 1
    };
    for _ in 0..e {
        n = n.saturating_mul(10);
    }
    n
}

// ==============================================================================
// Tests
// ==============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    // -- ByteReader tests -----------------------------------------------------

    #[test]
    fn read_bytes_and_position() {
        let mut r = ByteReader::new(&[1, 2, 3, 4], "test");
        assert_eq!(r.read_bytes(2).unwrap(), &[1, 2]);
        assert_eq!(r.position(), 2);
        assert_eq!(r.remaining(), 2);
    }

    #[test]
    fn read_past_end_is_truncated() {
        let mut r = ByteReader::new(&[1, 2], "test");
        let err = r.read_u32_le().unwrap_err();
        assert_eq!(err.code(), "TRUNCATED");
        // Position is unchanged after a failed read.
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn little_endian_reads() {
        let mut r = ByteReader::new(&[0x01, 0x00, 0xFF, 0xFF, 0xFF, 0x7F], "test");
        assert_eq!(r.read_u16_le().unwrap(), 1);
        assert_eq!(r.read_i32_le().unwrap(), 0x7FFF_FFFF);
    }

    // -- CompactSize tests ----------------------------------------------------

    #[test]
    fn compact_size_single_byte() {
        let mut r = ByteReader::new(&[0xFC], "test");
        assert_eq!(r.read_compact_size().unwrap(), 0xFC);
    }

    #[test]
    fn compact_size_two_byte_form() {
        let mut r = ByteReader::new(&[0xFD, 0x34, 0x12], "test");
        assert_eq!(r.read_compact_size().unwrap(), 0x1234);
    }

    #[test]
    fn compact_size_four_byte_form() {
        let mut r = ByteReader::new(&[0xFE, 0x78, 0x56, 0x34, 0x12], "test");
        assert_eq!(r.read_compact_size().unwrap(), 0x1234_5678);
    }

    #[test]
    fn compact_size_eight_byte_form() {
        let mut r = ByteReader::new(
            &[0xFF, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02, 0x01],
            "test",
        );
        assert_eq!(r.read_compact_size().unwrap(), 0x0102_0304_0506_0708);
    }

    #[test]
    fn compact_size_truncated_payload() {
        let mut r = ByteReader::new(&[0xFD, 0x34], "test");
        assert_eq!(r.read_compact_size().unwrap_err().code(), "TRUNCATED");
    }

    // -- CVarInt tests --------------------------------------------------------

    #[test]
    fn cvarint_single_byte() {
        let mut r = ByteReader::new(&[0x7F], "test");
        assert_eq!(r.read_cvarint().unwrap(), 127);
    }

    #[test]
    fn cvarint_continuation_off_by_one() {
        // 128 encodes as [0x80, 0x00] in Core's VARINT, not [0x81, 0x00].
        let mut r = ByteReader::new(&[0x80, 0x00], "test");
        assert_eq!(r.read_cvarint().unwrap(), 128);
    }

    #[test]
    fn cvarint_multi_byte() {
        // ((((0+1)<<7 | 0x7F) + 1) << 7) | 0x7F = 32895.
        let mut r = ByteReader::new(&[0x80, 0xFF, 0x7F], "test");
        assert_eq!(r.read_cvarint().unwrap(), 32_895);
    }

    #[test]
    fn cvarint_differs_from_compact_size() {
        // The same bytes mean different things under the two encodings.
        let bytes = [0xFD, 0x01, 0x00];
        let mut compact = ByteReader::new(&bytes, "test");
        let mut cvar = ByteReader::new(&bytes, "test");
        assert_eq!(compact.read_compact_size().unwrap(), 1);
        assert_ne!(cvar.read_cvarint().unwrap(), 1);
    }

    #[test]
    fn cvarint_truncated_mid_value() {
        let mut r = ByteReader::new(&[0x80], "test");
        assert_eq!(r.read_cvarint().unwrap_err().code(), "TRUNCATED");
    }

    // -- XOR tests ------------------------------------------------------------

    #[test]
    fn xor_empty_key_is_noop() {
        assert_eq!(xor_decode(&[1, 2, 3], &[]), vec![1, 2, 3]);
    }

    #[test]
    fn xor_all_zero_key_is_noop() {
        assert_eq!(xor_decode(&[1, 2, 3], &[0, 0]), vec![1, 2, 3]);
    }

    #[test]
    fn xor_key_wraps_around() {
        let data = [0xFF, 0x00, 0xFF, 0x00];
        let key = [0x0F, 0xF0];
        assert_eq!(xor_decode(&data, &key), vec![0xF0, 0xF0, 0xF0, 0xF0]);
    }

    #[test]
    fn xor_roundtrips() {
        let data = b"blockscope";
        let key = [0x5A, 0xA5, 0x3C];
        assert_eq!(xor_decode(&xor_decode(data, &key), &key), data.to_vec());
    }

    // -- Amount decompression tests -------------------------------------------

    #[test]
    fn decompress_zero() {
        assert_eq!(decompress_amount(0), 0);
    }

    #[test]
    fn decompress_known_values() {
        // Hand-checked against Core's CompressAmount:
        //   1 sat   -> 0x1
        //   10 sats -> 0x2
        //   2 sats  -> 0xB
        //   100     -> 0x3
        assert_eq!(decompress_amount(0x1), 1);
        assert_eq!(decompress_amount(0x2), 10);
        assert_eq!(decompress_amount(0xB), 2);
        assert_eq!(decompress_amount(0x3), 100);
    }

    #[test]
    fn decompress_round_amounts() {
        // 50 BTC (the original subsidy) compresses to 0x32 via the e = 9 path.
        assert_eq!(decompress_amount(compress(50_0000_0000)), 50_0000_0000);
        assert_eq!(decompress_amount(compress(546)), 546);
        assert_eq!(decompress_amount(compress(1_2345_6789)), 1_2345_6789);
    }

    /// Core's CompressAmount, used only to generate test vectors.
    fn compress(mut n: u64) -> u64 {
        if n == 0 {
            return 0;
        }
        let mut e = 0u64;
        while n % 10 == 0 && e < 9 {
            n /= 10;
            e += 1;
        }
        if e < 9 {
            let d = n % 10;
            n /= 10;
            1 + (n * 9 + d - 1) * 10 + e
        } else {
            1 + (n - 1) * 10 + 9
        }
    }

    // -- double_sha256 tests --------------------------------------------------

    #[test]
    fn double_sha256_of_empty_input() {
        // SHA256(SHA256("")) is a well-known constant.
        let h = double_sha256(b"");
        assert_eq!(
            hex::encode(h),
            "5df6e0e2761359d30a8275058e299fcc0381534545f55cf43e41983f5d4c9456"
        );
    }
}
