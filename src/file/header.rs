// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use crate::compression::CompressionAlgorithm;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Magic bytes that open every block file.
pub const MAGIC_BYTES: [u8; 8] = *b"RPKBLOCK";

/// Current on-disk format version.
pub const FORMAT_VERSION: u32 = 1;

const RESERVED_LEN: usize = 57;

/// Total on-disk size of a [`Header`]: 8 (magic) + 4 (version) + 8 (tag) +
/// 57 (reserved) = 77 bytes.
pub const HEADER_LEN: usize = 8 + 4 + 8 + RESERVED_LEN;

/// The fixed 77-byte header every block file opens with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub format_version: u32,
    pub compression: CompressionAlgorithm,
}

impl Encode for Header {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_all(&MAGIC_BYTES)?;
        writer.write_u32::<LittleEndian>(self.format_version)?;
        writer.write_all(self.compression.tag())?;
        writer.write_all(&[0u8; RESERVED_LEN])?;
        Ok(())
    }
}

impl Decode for Header {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC_BYTES {
            return Err(DecodeError::InvalidMagic("block file header"));
        }

        let format_version = reader.read_u32::<LittleEndian>()?;
        if format_version != FORMAT_VERSION {
            return Err(DecodeError::InvalidTag(
                "header format_version",
                format_version as u8,
            ));
        }

        let mut tag = [0u8; 8];
        reader.read_exact(&mut tag)?;
        let compression = CompressionAlgorithm::from_tag(tag)
            .map_err(|_| DecodeError::InvalidTag("header compression_algorithm", tag[0]))?;

        let mut reserved = [0u8; RESERVED_LEN];
        reader.read_exact(&mut reserved)?;

        Ok(Self {
            format_version,
            compression,
        })
    }
}
