//! Canonical byte encoding of an eddy state
//!
//! This is the signing payload. Layout, all integers and floats big-endian:
//!
//! | field     | encoding                                   |
//! |-----------|--------------------------------------------|
//! | id        | `u32` byte length, then UTF-8 bytes        |
//! | vector    | `u32` element count, then `f64` per element |
//! | energy    | `f64`                                      |
//! | timestamp | `u64` milliseconds since the Unix epoch    |
//!
//! The signature itself is never part of the payload. Changing the byte order
//! or field order breaks verification of every signature produced before.

use crate::EddyState;

impl EddyState {
    /// Deterministic signing payload; see the module docs for the layout
    pub fn to_canonical_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.canonical_len());

        // Construction bounds both lengths to u32.
        buf.extend_from_slice(&(self.id().len() as u32).to_be_bytes());
        buf.extend_from_slice(self.id().as_bytes());

        buf.extend_from_slice(&(self.dimension() as u32).to_be_bytes());
        for value in self.vector() {
            buf.extend_from_slice(&value.to_be_bytes());
        }

        buf.extend_from_slice(&self.energy().to_be_bytes());
        buf.extend_from_slice(&self.timestamp().to_be_bytes());
        buf
    }

    /// Length in bytes of [`to_canonical_bytes`](Self::to_canonical_bytes)
    pub fn canonical_len(&self) -> usize {
        4 + self.id().len() + 4 + 8 * self.dimension() + 8 + 8
    }
}

#[cfg(test)]
mod tests {
    use crate::EddyState;

    fn fixture() -> EddyState {
        EddyState::builder("ab", vec![1.0, -2.5], 0.5)
            .timestamp(0x0102_0304_0506_0708)
            .build()
            .unwrap()
    }

    #[test]
    fn test_layout_is_big_endian() {
        let bytes = fixture().to_canonical_bytes();

        let mut expected = Vec::new();
        expected.extend_from_slice(&[0, 0, 0, 2]);
        expected.extend_from_slice(b"ab");
        expected.extend_from_slice(&[0, 0, 0, 2]);
        expected.extend_from_slice(&1.0_f64.to_be_bytes());
        expected.extend_from_slice(&(-2.5_f64).to_be_bytes());
        expected.extend_from_slice(&0.5_f64.to_be_bytes());
        expected.extend_from_slice(&[1, 2, 3, 4, 5, 6, 7, 8]);

        assert_eq!(bytes, expected);
        assert_eq!(bytes.len(), fixture().canonical_len());
    }

    #[test]
    fn test_encoding_is_deterministic() {
        let eddy = fixture();
        assert_eq!(eddy.to_canonical_bytes(), eddy.to_canonical_bytes());

        let rebuilt = EddyState::builder(eddy.id(), eddy.vector().to_vec(), eddy.energy())
            .timestamp(eddy.timestamp())
            .build()
            .unwrap();
        assert_eq!(rebuilt.to_canonical_bytes(), eddy.to_canonical_bytes());
    }

    #[test]
    fn test_signature_is_not_part_of_payload() {
        let unsigned = fixture();
        let mut signed = fixture();
        signed.attach_signature(vec![9; 64]).unwrap();
        assert_eq!(unsigned.to_canonical_bytes(), signed.to_canonical_bytes());
    }

    #[test]
    fn test_utf8_id_length_counts_bytes() {
        let eddy = EddyState::builder("é", vec![0.0], 0.0)
            .timestamp(0)
            .build()
            .unwrap();
        let bytes = eddy.to_canonical_bytes();
        assert_eq!(&bytes[..4], &[0, 0, 0, 2]);
        assert_eq!(&bytes[4..6], "é".as_bytes());
    }
}
