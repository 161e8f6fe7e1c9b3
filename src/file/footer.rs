// Copyright (c) 2024-present, spectre contributors
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use crate::checksum::{IndexChecksum, FOOTER_CHECKSUM_FIELD_LEN};
use crate::coding::{Decode, DecodeError, Encode, EncodeError};
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// Magic bytes that close every sealed block file, null-padded to 8 bytes.
pub const MAGIC_BYTES: [u8; 8] = *b"RPKEND\0\0";

const RESERVED_LEN: usize = 48;

/// Total on-disk size of a [`Footer`]: 8 (index_offset) + 4 (index_length)
/// + 256 (checksum) + 48 (reserved) + 8 (magic) = 324 bytes.
pub const FOOTER_LEN: usize = 8 + 4 + FOOTER_CHECKSUM_FIELD_LEN + RESERVED_LEN + 8;

/// The fixed 324-byte trailer of a sealed block file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub index_offset: i64,
    pub index_length: i32,
    pub checksum: IndexChecksum,
}

impl Encode for Footer {
    fn encode_into<W: Write>(&self, writer: &mut W) -> Result<(), EncodeError> {
        writer.write_i64::<LittleEndian>(self.index_offset)?;
        writer.write_i32::<LittleEndian>(self.index_length)?;
        self.checksum.write_field(writer)?;
        writer.write_all(&[0u8; RESERVED_LEN])?;
        writer.write_all(&MAGIC_BYTES)?;
        Ok(())
    }
}

impl Decode for Footer {
    fn decode_from<R: Read>(reader: &mut R) -> Result<Self, DecodeError> {
        let index_offset = reader.read_i64::<LittleEndian>()?;
        let index_length = reader.read_i32::<LittleEndian>()?;

        let checksum = IndexChecksum::read_field(reader)?
            .ok_or(DecodeError::InvalidMagic("footer checksum field"))?;

        let mut reserved = [0u8; RESERVED_LEN];
        reader.read_exact(&mut reserved)?;

        let mut magic = [0u8; 8];
        reader.read_exact(&mut magic)?;
        if magic != MAGIC_BYTES {
            return Err(DecodeError::InvalidMagic("block file footer"));
        }

        Ok(Self {
            index_offset,
            index_length,
            checksum,
        })
    }
}
