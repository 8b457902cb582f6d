//! RIFF chunk reading and writing
//!
//! [`ChunkReader`] walks chunk headers over any seekable byte source
//! without loading the file. It only ever moves forward; callers that need
//! to revisit an earlier region seek the reader explicitly with
//! [`ChunkReader::seek_to`].

use std::io::{Read, Seek, SeekFrom, Write};

use avikit_core::fourcc::chunk_ids;
use avikit_core::{Error, FourCC, Result};
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

/// Size of a chunk header (tag + length).
pub const CHUNK_HEADER_SIZE: u64 = 8;

/// Round a payload length up to the RIFF word boundary.
pub fn padded(size: u64) -> u64 {
    size + (size & 1)
}

/// A decoded chunk header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: FourCC,
    /// Payload length in bytes (for a list found by sub-type, the length
    /// after the sub-type tag)
    pub size: u32,
    /// Absolute offset of the first payload byte
    pub offset: u64,
}

impl ChunkHeader {
    pub fn is_list(&self) -> bool {
        self.id == chunk_ids::LIST || self.id == chunk_ids::RIFF
    }

    /// Offset one past the payload.
    pub fn end(&self) -> u64 {
        self.offset + self.size as u64
    }

    /// Offset of the next sibling chunk.
    pub fn padded_end(&self) -> u64 {
        self.offset + padded(self.size as u64)
    }
}

/// Sequential chunk reader over a seekable source.
pub struct ChunkReader<R> {
    inner: R,
    pos: u64,
}

impl<R: Read + Seek> ChunkReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let pos = inner.stream_position()?;
        Ok(ChunkReader { inner, pos })
    }

    /// Current absolute position.
    pub fn position(&self) -> u64 {
        self.pos
    }

    /// Total length of the underlying source; position is preserved.
    pub fn source_len(&mut self) -> Result<u64> {
        let len = self.inner.seek(SeekFrom::End(0))?;
        self.inner.seek(SeekFrom::Start(self.pos))?;
        Ok(len)
    }

    /// Absolute seek, the only way to move backward.
    pub fn seek_to(&mut self, pos: u64) -> Result<()> {
        self.pos = self.inner.seek(SeekFrom::Start(pos))?;
        Ok(())
    }

    pub fn read_fourcc(&mut self) -> Result<FourCC> {
        let mut tag = [0u8; 4];
        self.inner.read_exact(&mut tag)?;
        self.pos += 4;
        Ok(FourCC(tag))
    }

    /// Read an 8-byte chunk header; a short read is an I/O error.
    pub fn read_chunk_header(&mut self) -> Result<ChunkHeader> {
        let id = self.read_fourcc()?;
        let size = self.inner.read_u32::<LittleEndian>()?;
        self.pos += 4;
        Ok(ChunkHeader {
            id,
            size,
            offset: self.pos,
        })
    }

    /// Advance exactly `len` bytes.
    pub fn skip_payload(&mut self, len: u64) -> Result<()> {
        if len > 0 {
            let delta = i64::try_from(len)
                .map_err(|_| Error::bad_param(format!("skip of {} bytes", len)))?;
            self.pos = self.inner.seek(SeekFrom::Current(delta))?;
        }
        Ok(())
    }

    /// Read `min(len, buf.len())` bytes into `buf`, then skip the rest of
    /// the `len` bytes.
    pub fn read_payload(&mut self, len: u64, buf: &mut [u8]) -> Result<usize> {
        let n = (len as usize).min(buf.len());
        self.inner.read_exact(&mut buf[..n])?;
        self.pos += n as u64;
        self.skip_payload(len - n as u64)?;
        Ok(n)
    }

    /// Read a whole chunk payload and step over its pad byte.
    pub fn read_chunk_data(&mut self, header: &ChunkHeader) -> Result<Vec<u8>> {
        let mut data = vec![0u8; header.size as usize];
        self.read_payload(header.size as u64, &mut data)?;
        self.skip_payload(header.size as u64 & 1)?;
        Ok(data)
    }

    /// Find the next chunk tagged `tag` before `scope_end`, treating
    /// `LIST` chunks as opaque. Leaves the reader at the chunk payload.
    pub fn seek_to_chunk(&mut self, tag: FourCC, scope_end: u64) -> Result<ChunkHeader> {
        self.seek_to_target(tag, false, scope_end)
    }

    /// Find the next `LIST` whose sub-type is `list_type` before
    /// `scope_end`. Leaves the reader after the sub-type tag; the
    /// returned size excludes it.
    pub fn seek_to_list(&mut self, list_type: FourCC, scope_end: u64) -> Result<ChunkHeader> {
        self.seek_to_target(list_type, true, scope_end)
    }

    fn seek_to_target(&mut self, target: FourCC, by_list_type: bool, scope_end: u64) -> Result<ChunkHeader> {
        loop {
            if self.pos + CHUNK_HEADER_SIZE > scope_end {
                return Err(Error::NotFound(target));
            }
            let header = self.read_chunk_header()?;

            if by_list_type && header.id == chunk_ids::LIST && header.size >= 4 {
                let list_type = self.read_fourcc()?;
                if list_type == target {
                    return Ok(ChunkHeader {
                        id: list_type,
                        size: header.size - 4,
                        offset: self.pos,
                    });
                }
                self.skip_payload(padded(header.size as u64) - 4)?;
                continue;
            }

            if !by_list_type && header.id == target {
                return Ok(header);
            }
            self.skip_payload(padded(header.size as u64))?;
        }
    }

    pub fn get_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

/// Chunk identifier with stream number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkId {
    /// Raw FourCC
    pub fourcc: FourCC,
    /// Stream number (if applicable)
    pub stream_number: Option<u16>,
    /// Chunk type
    pub chunk_type: ChunkType,
}

fn from_hex(b: u8) -> Option<u16> {
    (b as char).to_digit(16).map(|d| d as u16)
}

fn to_hex(n: u16) -> u8 {
    b"0123456789ABCDEF"[(n & 0xF) as usize]
}

impl ChunkId {
    /// Parse chunk ID from FourCC; the first two bytes are the stream
    /// number in hexadecimal.
    pub fn parse(fourcc: FourCC) -> Self {
        let bytes = fourcc.as_bytes();

        match (from_hex(bytes[0]), from_hex(bytes[1])) {
            (Some(hi), Some(lo)) => {
                let chunk_type = match &bytes[2..4] {
                    b"dc" | b"DC" => ChunkType::VideoCompressed,
                    b"db" | b"DB" => ChunkType::VideoUncompressed,
                    b"wb" | b"WB" => ChunkType::Audio,
                    b"tx" | b"TX" => ChunkType::Text,
                    b"ix" | b"IX" => ChunkType::Index,
                    b"pc" | b"PC" => ChunkType::PaletteChange,
                    _ => ChunkType::Unknown,
                };

                ChunkId {
                    fourcc,
                    stream_number: Some((hi << 4) | lo),
                    chunk_type,
                }
            }
            _ => ChunkId {
                fourcc,
                stream_number: None,
                chunk_type: ChunkType::Unknown,
            },
        }
    }

    /// Create a stream chunk ID
    pub fn stream_chunk(stream_num: u16, chunk_type: ChunkType) -> Self {
        let suffix = match chunk_type {
            ChunkType::VideoCompressed => *b"dc",
            ChunkType::VideoUncompressed => *b"db",
            ChunkType::Audio => *b"wb",
            ChunkType::Text => *b"tx",
            ChunkType::Index => *b"ix",
            ChunkType::PaletteChange => *b"pc",
            ChunkType::Unknown => *b"??",
        };

        ChunkId {
            fourcc: FourCC([to_hex(stream_num >> 4), to_hex(stream_num), suffix[0], suffix[1]]),
            stream_number: Some(stream_num),
            chunk_type,
        }
    }
}

/// Chunk type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkType {
    /// Compressed video frame
    VideoCompressed,
    /// Uncompressed video frame
    VideoUncompressed,
    /// Audio data
    Audio,
    /// Text/subtitle
    Text,
    /// Index chunk
    Index,
    /// Palette change
    PaletteChange,
    /// Unknown type
    Unknown,
}

bitflags! {
    /// `idx1` entry flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct IndexFlags: u32 {
        /// The entry points at a `LIST` (e.g. `rec `).
        const LIST = 0x0000_0001;
        const KEYFRAME = 0x0000_0010;
        /// The chunk does not consume playback time (palette change).
        const NO_TIME = 0x0000_0100;
    }
}

/// AVI index entry (idx1 format)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Chunk ID
    pub chunk_id: FourCC,
    pub flags: IndexFlags,
    /// Offset of the chunk header from the movie data base
    pub offset: u32,
    /// Size of chunk data
    pub size: u32,
}

impl IndexEntry {
    /// On-disk record size.
    pub const SIZE: usize = 16;

    /// Read from data
    pub fn read(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::bad_format(format!(
                "index record needs {} bytes, have {}",
                Self::SIZE,
                data.len()
            )));
        }

        let mut cursor = data;
        let mut id_bytes = [0u8; 4];
        cursor.read_exact(&mut id_bytes)?;

        Ok(IndexEntry {
            chunk_id: FourCC(id_bytes),
            flags: IndexFlags::from_bits_retain(cursor.read_u32::<LittleEndian>()?),
            offset: cursor.read_u32::<LittleEndian>()?,
            size: cursor.read_u32::<LittleEndian>()?,
        })
    }

    /// Write to writer
    pub fn write<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        writer.write_all(self.chunk_id.as_bytes())?;
        writer.write_u32::<LittleEndian>(self.flags.bits())?;
        writer.write_u32::<LittleEndian>(self.offset)?;
        writer.write_u32::<LittleEndian>(self.size)?;
        Ok(())
    }

    /// Check if this is a keyframe
    pub fn is_keyframe(&self) -> bool {
        self.flags.contains(IndexFlags::KEYFRAME)
    }

    /// Stream number encoded in the chunk id, if any.
    pub fn stream_number(&self) -> Option<u16> {
        ChunkId::parse(self.chunk_id).stream_number
    }
}

/// Parse an idx1 payload; a trailing partial record is ignored.
pub fn parse_index(data: &[u8]) -> Vec<IndexEntry> {
    data.chunks_exact(IndexEntry::SIZE)
        .filter_map(|record| IndexEntry::read(record).ok())
        .collect()
}

/// Write a chunk (header, payload, pad byte).
pub fn write_chunk<W: Write>(writer: &mut W, id: FourCC, data: &[u8]) -> std::io::Result<()> {
    writer.write_all(id.as_bytes())?;
    writer.write_u32::<LittleEndian>(data.len() as u32)?;
    writer.write_all(data)?;
    if data.len() % 2 != 0 {
        writer.write_all(&[0])?;
    }
    Ok(())
}
