//! AVI header structures (`avih` and `strh`)

use std::io::{Cursor, Write};

use avikit_core::{Error, FourCC, Rect, Result, StreamFlags, StreamInfo, StreamType};
use bitflags::bitflags;
use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

bitflags! {
    /// `avih` flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct HeaderFlags: u32 {
        /// File has an index
        const HAS_INDEX = 0x0000_0010;
        /// Playback order must follow the index
        const MUST_USE_INDEX = 0x0000_0020;
        const IS_INTERLEAVED = 0x0000_0100;
        /// Key frame flags in the index can be trusted for seeking
        const TRUST_CK_TYPE = 0x0000_0800;
        const WAS_CAPTURE_FILE = 0x0001_0000;
        const COPYRIGHTED = 0x0002_0000;
    }
}

/// AVI main header (avih chunk)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MainHeader {
    pub microseconds_per_frame: u32,
    pub max_bytes_per_sec: u32,
    pub padding_granularity: u32,
    pub flags: HeaderFlags,
    pub total_frames: u32,
    /// Initial frames (for interleaved files)
    pub initial_frames: u32,
    pub streams: u32,
    pub suggested_buffer_size: u32,
    pub width: u32,
    pub height: u32,
}

impl MainHeader {
    /// Payload size of `avih`.
    pub const SIZE: usize = 56;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::bad_format(format!(
                "avih chunk is {} bytes, expected {}",
                data.len(),
                Self::SIZE
            )));
        }

        let mut cursor = Cursor::new(data);
        Ok(MainHeader {
            microseconds_per_frame: cursor.read_u32::<LittleEndian>()?,
            max_bytes_per_sec: cursor.read_u32::<LittleEndian>()?,
            padding_granularity: cursor.read_u32::<LittleEndian>()?,
            flags: HeaderFlags::from_bits_retain(cursor.read_u32::<LittleEndian>()?),
            total_frames: cursor.read_u32::<LittleEndian>()?,
            initial_frames: cursor.read_u32::<LittleEndian>()?,
            streams: cursor.read_u32::<LittleEndian>()?,
            suggested_buffer_size: cursor.read_u32::<LittleEndian>()?,
            width: cursor.read_u32::<LittleEndian>()?,
            height: cursor.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.microseconds_per_frame)?;
        w.write_u32::<LittleEndian>(self.max_bytes_per_sec)?;
        w.write_u32::<LittleEndian>(self.padding_granularity)?;
        w.write_u32::<LittleEndian>(self.flags.bits())?;
        w.write_u32::<LittleEndian>(self.total_frames)?;
        w.write_u32::<LittleEndian>(self.initial_frames)?;
        w.write_u32::<LittleEndian>(self.streams)?;
        w.write_u32::<LittleEndian>(self.suggested_buffer_size)?;
        w.write_u32::<LittleEndian>(self.width)?;
        w.write_u32::<LittleEndian>(self.height)?;
        // Reserved
        for _ in 0..4 {
            w.write_u32::<LittleEndian>(0)?;
        }
        Ok(())
    }

    /// Calculate frame rate in fps
    pub fn frame_rate(&self) -> f64 {
        if self.microseconds_per_frame > 0 {
            1_000_000.0 / self.microseconds_per_frame as f64
        } else {
            0.0
        }
    }
}

impl Default for MainHeader {
    fn default() -> Self {
        MainHeader {
            microseconds_per_frame: 0,
            max_bytes_per_sec: 0,
            padding_granularity: 0,
            flags: HeaderFlags::HAS_INDEX,
            total_frames: 0,
            initial_frames: 0,
            streams: 0,
            suggested_buffer_size: 0,
            width: 0,
            height: 0,
        }
    }
}

/// Stream header (strh chunk)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamHeader {
    /// Stream type (vids, auds, txts, mids)
    pub stream_type: StreamType,
    /// FourCC handler/codec
    pub handler: FourCC,
    pub flags: StreamFlags,
    pub priority: u16,
    pub language: u16,
    pub initial_frames: u32,
    /// Time scale
    pub scale: u32,
    /// Rate (samples per second = rate/scale)
    pub rate: u32,
    pub start: u32,
    /// Length (number of frames or audio samples)
    pub length: u32,
    pub suggested_buffer_size: u32,
    /// Quality (0-10000), `u32::MAX` for the default
    pub quality: u32,
    /// Sample size (0 for variable)
    pub sample_size: u32,
    pub frame: Rect,
}

impl StreamHeader {
    /// Payload size of `strh` as written.
    pub const SIZE: usize = 56;
    /// Oldest writers omit the frame rectangle.
    pub const MIN_SIZE: usize = 48;

    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(Error::bad_format(format!(
                "strh chunk is {} bytes, expected at least {}",
                data.len(),
                Self::MIN_SIZE
            )));
        }

        let mut cursor = Cursor::new(data);
        let stream_type = StreamType::from_fourcc(FourCC::from_u32(cursor.read_u32::<LittleEndian>()?));
        let handler = FourCC::from_u32(cursor.read_u32::<LittleEndian>()?);
        let flags = StreamFlags::from_bits_retain(cursor.read_u32::<LittleEndian>()?);
        let priority = cursor.read_u16::<LittleEndian>()?;
        let language = cursor.read_u16::<LittleEndian>()?;
        let initial_frames = cursor.read_u32::<LittleEndian>()?;
        let scale = cursor.read_u32::<LittleEndian>()?;
        let rate = cursor.read_u32::<LittleEndian>()?;
        let start = cursor.read_u32::<LittleEndian>()?;
        let length = cursor.read_u32::<LittleEndian>()?;
        let suggested_buffer_size = cursor.read_u32::<LittleEndian>()?;
        let quality = cursor.read_u32::<LittleEndian>()?;
        let sample_size = cursor.read_u32::<LittleEndian>()?;

        let frame = if data.len() >= Self::SIZE {
            Rect {
                left: cursor.read_i16::<LittleEndian>()?,
                top: cursor.read_i16::<LittleEndian>()?,
                right: cursor.read_i16::<LittleEndian>()?,
                bottom: cursor.read_i16::<LittleEndian>()?,
            }
        } else {
            Rect::default()
        };

        Ok(StreamHeader {
            stream_type,
            handler,
            flags,
            priority,
            language,
            initial_frames,
            scale,
            rate,
            start,
            length,
            suggested_buffer_size,
            quality,
            sample_size,
            frame,
        })
    }

    pub fn write<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_all(self.stream_type.to_fourcc().as_bytes())?;
        w.write_all(self.handler.as_bytes())?;
        w.write_u32::<LittleEndian>(self.flags.bits())?;
        w.write_u16::<LittleEndian>(self.priority)?;
        w.write_u16::<LittleEndian>(self.language)?;
        w.write_u32::<LittleEndian>(self.initial_frames)?;
        w.write_u32::<LittleEndian>(self.scale)?;
        w.write_u32::<LittleEndian>(self.rate)?;
        w.write_u32::<LittleEndian>(self.start)?;
        w.write_u32::<LittleEndian>(self.length)?;
        w.write_u32::<LittleEndian>(self.suggested_buffer_size)?;
        w.write_u32::<LittleEndian>(self.quality)?;
        w.write_u32::<LittleEndian>(self.sample_size)?;
        w.write_i16::<LittleEndian>(self.frame.left)?;
        w.write_i16::<LittleEndian>(self.frame.top)?;
        w.write_i16::<LittleEndian>(self.frame.right)?;
        w.write_i16::<LittleEndian>(self.frame.bottom)?;
        Ok(())
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::SIZE);
        let _ = self.write(&mut data);
        data
    }

    /// Header for a stream being written from its description.
    pub fn from_info(info: &StreamInfo) -> Self {
        StreamHeader {
            stream_type: info.stream_type,
            handler: info.handler,
            flags: info.flags,
            priority: info.priority,
            language: info.language,
            initial_frames: info.initial_frames,
            scale: info.scale,
            rate: info.rate,
            start: info.start.max(0) as u32,
            length: info.length.max(0) as u32,
            suggested_buffer_size: info.suggested_buffer_size,
            quality: info.quality,
            sample_size: info.sample_size,
            frame: info.frame,
        }
    }

    /// Stream description; `length` is supplied by the caller since the
    /// index may disagree with the header.
    pub fn to_info(&self, length: i64, name: &str) -> StreamInfo {
        StreamInfo {
            stream_type: self.stream_type,
            handler: self.handler,
            flags: self.flags,
            caps: avikit_core::StreamCaps::CAN_READ,
            priority: self.priority,
            language: self.language,
            scale: self.scale,
            rate: self.rate,
            start: self.start as i64,
            length,
            initial_frames: self.initial_frames,
            suggested_buffer_size: self.suggested_buffer_size,
            quality: self.quality,
            sample_size: self.sample_size,
            frame: self.frame,
            edit_count: 0,
            format_change_count: 0,
            name: name.to_string(),
        }
    }
}

impl Default for StreamHeader {
    fn default() -> Self {
        StreamHeader {
            stream_type: StreamType::Video,
            handler: FourCC::NULL,
            flags: StreamFlags::empty(),
            priority: 0,
            language: 0,
            initial_frames: 0,
            scale: 1,
            rate: 30,
            start: 0,
            length: 0,
            suggested_buffer_size: 0,
            quality: u32::MAX,
            sample_size: 0,
            frame: Rect::default(),
        }
    }
}
