//! DXBC container framing.
//!
//! # Layout
//!
//! ```text
//! DxbcHeader   32 bytes
//! u32[count]   chunk offsets, relative to the container start
//! chunks       tag (4 bytes), payload size (u32), payload
//! ```
//!
//! Every chunk is kept verbatim next to its decoded form, so
//! [`DxbcContainer::serialize`] reproduces the original bytes.

use std::io::{Cursor, Write};

use byteorder::{LittleEndian, WriteBytesExt};
use log::{debug, warn};
use perun_common::{BinaryReader, FourCC};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::glsl::{GlslOptions, GlslWriter};
use crate::rdef::Rdef;
use crate::shex::Shex;
use crate::signature::Signature;
use crate::{Error, Result};

/// Size of a chunk's tag and payload-size fields.
const CHUNK_HEADER_SIZE: usize = 8;

/// Chunks that are expected in compiled shaders but not interpreted.
const PASSTHROUGH_TAGS: &[&[u8; 4]] = &[
    b"STAT", b"SFI0", b"IFCE", b"SDBG", b"SPDB", b"ILDB", b"ILDN", b"PRIV", b"RTS0", b"Aon9",
    b"XNAS", b"XNAP", b"HASH", b"DXIL",
];

/// Fixed DXBC container header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromBytes, IntoBytes, Immutable, KnownLayout)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[repr(C)]
pub struct DxbcHeader {
    pub magic: FourCC,
    /// Checksum over the rest of the container.
    pub digest: [u8; 16],
    pub major_version: u16,
    pub minor_version: u16,
    /// Total container size in bytes.
    pub size: u32,
    pub chunk_count: u32,
}

impl DxbcHeader {
    pub const MAGIC: FourCC = FourCC(*b"DXBC");
    pub const SIZE: usize = std::mem::size_of::<Self>();
}

/// A raw chunk as stored in the container.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Chunk {
    pub tag: FourCC,
    /// Offset of the chunk header from the container start.
    pub offset: u32,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub data: Vec<u8>,
}

/// A parsed DXBC container.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DxbcContainer {
    pub header: DxbcHeader,
    /// Every chunk in offset-table order, including the decoded ones.
    pub chunks: Vec<Chunk>,
    pub rdef: Option<Rdef>,
    pub input_signature: Option<Signature>,
    pub output_signature: Option<Signature>,
    pub patch_constant_signature: Option<Signature>,
    pub shex: Option<Shex>,
}

impl DxbcContainer {
    /// Parse a container from the start of `data`.
    ///
    /// Bytes past the header's declared size are ignored.
    pub fn parse(data: &[u8]) -> Result<Self> {
        let mut reader = BinaryReader::new(data);
        let header: DxbcHeader = reader.read_struct()?;
        if header.magic != DxbcHeader::MAGIC {
            return Err(Error::InvalidMagic(header.magic));
        }

        let size = header.size as usize;
        if size > data.len() {
            return Err(perun_common::Error::UnexpectedEof {
                needed: size,
                available: data.len(),
            }
            .into());
        }
        let data = &data[..size];
        let mut reader = BinaryReader::new(data);
        reader.seek(DxbcHeader::SIZE)?;
        let offsets = reader.read_u32_array(header.chunk_count as usize)?;

        let mut container = Self {
            header,
            chunks: Vec::with_capacity(offsets.len()),
            rdef: None,
            input_signature: None,
            output_signature: None,
            patch_constant_signature: None,
            shex: None,
        };

        // Chunks never overlap the header or offset table; serialize relies on it.
        let table_end = reader.position();
        for (index, &offset) in offsets.iter().enumerate() {
            let chunk = read_chunk(data, table_end, index, offset)?;
            container
                .decode_chunk(&chunk)
                .map_err(|err| err.in_chunk(chunk.tag))?;
            container.chunks.push(chunk);
        }

        Ok(container)
    }

    fn decode_chunk(&mut self, chunk: &Chunk) -> Result<()> {
        debug!(
            "chunk {} at {:#x}, {} bytes",
            chunk.tag,
            chunk.offset,
            chunk.data.len()
        );

        match &chunk.tag.0 {
            b"RDEF" => self.rdef = Some(Rdef::parse(&chunk.data)?),
            b"SHEX" | b"SHDR" => self.shex = Some(Shex::parse(&chunk.data)?),
            b"ISGN" | b"ISG1" => {
                self.input_signature = Some(Signature::parse(chunk.tag, &chunk.data)?)
            }
            b"OSGN" | b"OSG1" | b"OSG5" => {
                self.output_signature = Some(Signature::parse(chunk.tag, &chunk.data)?)
            }
            b"PCSG" | b"PSG1" => {
                self.patch_constant_signature = Some(Signature::parse(chunk.tag, &chunk.data)?)
            }
            tag if PASSTHROUGH_TAGS.contains(&tag) => {}
            _ => warn!("passing through unknown DXBC chunk {}", chunk.tag),
        }
        Ok(())
    }

    /// Find the first chunk with the given tag.
    pub fn chunk(&self, tag: &[u8; 4]) -> Option<&Chunk> {
        self.chunks.iter().find(|c| &c.tag.0 == tag)
    }

    /// Rebuild the container bytes.
    ///
    /// Chunks are written at their recorded offsets, so a parsed container
    /// serializes back to its original bytes. The output is at least as long
    /// as the header's declared size.
    pub fn serialize(&self) -> Result<Vec<u8>> {
        let table_end = DxbcHeader::SIZE + self.chunks.len() * 4;
        let chunks_end = self
            .chunks
            .iter()
            .map(|c| c.offset as usize + CHUNK_HEADER_SIZE + c.data.len())
            .max()
            .unwrap_or(0);
        let total = table_end.max(chunks_end).max(self.header.size as usize);

        let header = DxbcHeader {
            size: total as u32,
            chunk_count: self.chunks.len() as u32,
            ..self.header
        };

        let mut out = Cursor::new(vec![0u8; total]);
        out.write_all(header.as_bytes())?;
        for chunk in &self.chunks {
            out.write_u32::<LittleEndian>(chunk.offset)?;
        }

        for (index, chunk) in self.chunks.iter().enumerate() {
            if (chunk.offset as usize) < table_end {
                return Err(Error::OffsetOutOfBounds {
                    index,
                    offset: chunk.offset as usize,
                    len: total,
                });
            }
            out.set_position(chunk.offset as u64);
            out.write_all(&chunk.tag.0)?;
            out.write_u32::<LittleEndian>(chunk.data.len() as u32)?;
            out.write_all(&chunk.data)?;
        }

        Ok(out.into_inner())
    }

    /// Transpile the shader to GLSL with default options.
    pub fn to_glsl(&self) -> Result<String> {
        self.to_glsl_with(&GlslOptions::default())
    }

    /// Transpile the shader to GLSL.
    pub fn to_glsl_with(&self, options: &GlslOptions) -> Result<String> {
        GlslWriter::new(self, options).write()
    }
}

fn read_chunk(data: &[u8], table_end: usize, index: usize, offset: u32) -> Result<Chunk> {
    let start = offset as usize;
    let out_of_bounds = || Error::OffsetOutOfBounds {
        index,
        offset: start,
        len: data.len(),
    };

    if start < table_end
        || start
            .checked_add(CHUNK_HEADER_SIZE)
            .map_or(true, |end| end > data.len())
    {
        return Err(out_of_bounds());
    }

    let mut reader = BinaryReader::new(data);
    reader.seek(start)?;
    let tag = reader.read_fourcc()?;
    let size = reader.read_u32()? as usize;
    if size > reader.remaining() {
        return Err(out_of_bounds());
    }

    Ok(Chunk {
        tag,
        offset,
        data: reader.read_bytes(size)?.to_vec(),
    })
}
