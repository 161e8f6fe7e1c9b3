// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! MD-5 checksum of a file's index section, as the 256-byte footer field
//! prescribes: hex-encoded, left-justified, space-padded.

use md5::{Digest, Md5};
use std::io::{Read, Write};

/// Width in bytes of the footer's checksum field.
pub const FOOTER_CHECKSUM_FIELD_LEN: usize = 256;

/// The MD-5 digest of a file's serialized index section.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct IndexChecksum([u8; 16]);

impl IndexChecksum {
    /// Computes the checksum of `bytes`.
    #[must_use]
    pub fn compute(bytes: &[u8]) -> Self {
        let digest = Md5::digest(bytes);
        Self(digest.into())
    }

    /// The lowercase hex representation (always exactly 32 ASCII bytes).
    #[must_use]
    pub fn to_hex(self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parses a checksum back from its hex representation. Trailing ASCII
    /// space/NUL padding is trimmed first, per the design note that
    /// readers must tolerate padding rather than compare byte-for-byte.
    ///
    /// Returns `None` if the trimmed string is not exactly 32 valid hex
    /// characters.
    #[must_use]
    pub fn from_hex(field: &str) -> Option<Self> {
        let trimmed = field.trim_end_matches(['\0', ' ']);
        if trimmed.len() != 32 {
            return None;
        }

        let mut bytes = [0u8; 16];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&trimmed[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }

    /// Writes this checksum into the fixed-width footer field:
    /// `to_hex()` followed by ASCII-space padding to
    /// [`FOOTER_CHECKSUM_FIELD_LEN`] bytes.
    ///
    /// # Errors
    /// Propagates I/O errors from `writer`.
    pub fn write_field<W: Write>(self, writer: &mut W) -> std::io::Result<()> {
        let hex = self.to_hex();
        writer.write_all(hex.as_bytes())?;
        let padding = [b' '; FOOTER_CHECKSUM_FIELD_LEN];
        writer.write_all(&padding[..FOOTER_CHECKSUM_FIELD_LEN - hex.len()])
    }

    /// Reads a [`FOOTER_CHECKSUM_FIELD_LEN`]-byte footer field and parses
    /// the checksum out of it.
    ///
    /// # Errors
    /// Propagates I/O errors from `reader`.
    pub fn read_field<R: Read>(reader: &mut R) -> std::io::Result<Option<Self>> {
        let mut buf = [0u8; FOOTER_CHECKSUM_FIELD_LEN];
        reader.read_exact(&mut buf)?;
        let field = String::from_utf8_lossy(&buf);
        Ok(Self::from_hex(&field))
    }
}

impl std::fmt::Display for IndexChecksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn round_trip() {
        let checksum = IndexChecksum::compute(b"hello world");
        let mut buf = Vec::new();
        checksum.write_field(&mut buf).unwrap();
        assert_eq!(buf.len(), FOOTER_CHECKSUM_FIELD_LEN);

        let mut cursor = std::io::Cursor::new(buf);
        let parsed = IndexChecksum::read_field(&mut cursor).unwrap().unwrap();
        assert_eq!(checksum, parsed);
    }

    #[test]
    fn tolerates_trailing_nul_padding() {
        let checksum = IndexChecksum::compute(b"abc");
        let hex = checksum.to_hex();
        let mut field = hex.clone().into_bytes();
        field.resize(FOOTER_CHECKSUM_FIELD_LEN, 0);
        let field = String::from_utf8_lossy(&field);
        assert_eq!(IndexChecksum::from_hex(&field), Some(checksum));
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(
            IndexChecksum::compute(b"abc"),
            IndexChecksum::compute(b"abd")
        );
    }

    #[test]
    fn rejects_malformed_hex() {
        assert_eq!(IndexChecksum::from_hex("not-hex"), None);
    }
}
