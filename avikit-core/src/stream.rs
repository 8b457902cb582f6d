//! Stream model shared by containers, editable streams and the decoder.
//!
//! A stream is a sequence of samples addressed by position. Containers
//! hand out streams as [`StreamHandle`]s; the `Arc` strong count is the
//! stream's reference count, so an editable stream that references the
//! same source from many segments keeps it alive exactly as long as one
//! segment still points at it.

use std::any::Any;
use std::sync::Arc;

use bitflags::bitflags;

use crate::error::{Error, Result};
use crate::fourcc::{stream_types, FourCC};

/// Shared, reference-counted stream handle.
pub type StreamHandle = Arc<dyn Stream>;

/// Stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamType {
    Video,
    Audio,
    Text,
    Midi,
    Unknown(FourCC),
}

impl StreamType {
    pub fn from_fourcc(fourcc: FourCC) -> Self {
        match fourcc {
            stream_types::VIDEO => StreamType::Video,
            stream_types::AUDIO => StreamType::Audio,
            stream_types::TEXT => StreamType::Text,
            stream_types::MIDI => StreamType::Midi,
            other => StreamType::Unknown(other),
        }
    }

    pub fn to_fourcc(self) -> FourCC {
        match self {
            StreamType::Video => stream_types::VIDEO,
            StreamType::Audio => stream_types::AUDIO,
            StreamType::Text => stream_types::TEXT,
            StreamType::Midi => stream_types::MIDI,
            StreamType::Unknown(fourcc) => fourcc,
        }
    }

    /// The "no type set yet" marker of an empty editable stream.
    pub fn is_unset(self) -> bool {
        self == StreamType::Unknown(FourCC::NULL)
    }
}

impl Default for StreamType {
    fn default() -> Self {
        StreamType::Unknown(FourCC::NULL)
    }
}

/// Rectangle structure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub left: i16,
    pub top: i16,
    pub right: i16,
    pub bottom: i16,
}

impl Rect {
    pub fn new(left: i16, top: i16, right: i16, bottom: i16) -> Self {
        Rect {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> i32 {
        self.right as i32 - self.left as i32
    }

    pub fn height(&self) -> i32 {
        self.bottom as i32 - self.top as i32
    }
}

bitflags! {
    /// Stream flags (`dwFlags` of the stream description).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamFlags: u32 {
        /// Stream should not be played by default.
        const DISABLED = 0x0000_0001;
        /// The stream's format changes over time (palette changes for
        /// video, or segments from different sources in an edit).
        const FORMAT_CHANGES = 0x0001_0000;
    }
}

bitflags! {
    /// Capabilities of a stream.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct StreamCaps: u32 {
        const CAN_READ = 0x0000_0001;
        const CAN_WRITE = 0x0000_0002;
        const ALL_KEYFRAMES = 0x0001_0000;
        const NO_COMPRESSION = 0x0002_0000;
    }
}

bitflags! {
    /// Sample search flags for [`Stream::find_sample`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FindFlags: u32 {
        /// Search forward from the position.
        const NEXT = 0x0001;
        /// Search backward from the position.
        const PREV = 0x0004;
        /// Search from the first sample of the stream.
        const FROM_START = 0x0008;
        /// Find a key frame.
        const KEY = 0x0010;
        /// Find any non-empty sample.
        const ANY = 0x0020;
        /// Find a format change.
        const FORMAT = 0x0040;
    }
}

/// Aggregate stream description.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamInfo {
    pub stream_type: StreamType,
    /// Codec (handler) tag; `NULL` when no single compressor describes
    /// the stream.
    pub handler: FourCC,
    pub flags: StreamFlags,
    pub caps: StreamCaps,
    pub priority: u16,
    pub language: u16,
    /// Time scale; `rate / scale` is samples per second
    pub scale: u32,
    pub rate: u32,
    /// First valid position
    pub start: i64,
    /// Number of samples
    pub length: i64,
    pub initial_frames: u32,
    pub suggested_buffer_size: u32,
    /// Quality (0-10000)
    pub quality: u32,
    /// Sample size (0 for variable)
    pub sample_size: u32,
    pub frame: Rect,
    pub edit_count: u32,
    pub format_change_count: u32,
    pub name: String,
}

impl StreamInfo {
    /// One past the last valid position.
    pub fn end(&self) -> i64 {
        self.start + self.length
    }

    pub fn contains(&self, pos: i64) -> bool {
        pos >= self.start && pos < self.end()
    }

    pub fn is_video(&self) -> bool {
        self.stream_type == StreamType::Video
    }

    pub fn is_audio(&self) -> bool {
        self.stream_type == StreamType::Audio
    }

    /// Samples per second.
    pub fn sample_rate(&self) -> f64 {
        if self.scale > 0 {
            self.rate as f64 / self.scale as f64
        } else {
            0.0
        }
    }
}

/// Outcome of a [`Stream::read`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadInfo {
    /// Bytes written (or required, for a size query).
    pub bytes: usize,
    /// Samples covered by those bytes.
    pub samples: i64,
}

/// A readable sample stream.
///
/// Implementations use interior locking for any shared file handle, so a
/// stream can be read from several owners at once.
pub trait Stream: Send + Sync + 'static {
    /// Current stream description.
    fn info(&self) -> StreamInfo;

    /// Format descriptor (`strf` bytes) in effect at `pos`.
    fn read_format(&self, pos: i64) -> Result<Vec<u8>>;

    /// Read up to `samples` samples starting at `start`.
    ///
    /// With `buf == None` nothing is read; the return value reports the
    /// bytes required. A buffer that cannot hold even one sample fails
    /// with [`Error::BufferTooSmall`].
    fn read(&self, start: i64, samples: i64, buf: Option<&mut [u8]>) -> Result<ReadInfo>;

    /// Locate a sample relative to `pos`; `None` when nothing matches.
    fn find_sample(&self, pos: i64, flags: FindFlags) -> Option<i64>;

    /// Handler-private or auxiliary data stored with the stream.
    fn read_data(&self, tag: FourCC) -> Result<Vec<u8>> {
        Err(Error::NoData(format!("stream has no '{}' data", tag)))
    }

    /// Private capability query; lets the editing layer recognise its own
    /// stream type behind a handle.
    fn as_any(&self) -> &dyn Any;

    fn start(&self) -> i64 {
        self.info().start
    }

    fn length(&self) -> i64 {
        self.info().length
    }

    /// Byte size of the sample at `pos` without reading it.
    fn sample_size(&self, pos: i64) -> Result<usize> {
        self.read(pos, 1, None).map(|r| r.bytes)
    }

    /// Read one sample into a freshly sized buffer.
    fn read_sample(&self, pos: i64) -> Result<Vec<u8>> {
        let needed = self.sample_size(pos)?;
        let mut buf = vec![0u8; needed];
        let got = self.read(pos, 1, Some(&mut buf))?;
        buf.truncate(got.bytes);
        Ok(buf)
    }

    /// Whether `pos` holds a key frame.
    fn is_key_frame(&self, pos: i64) -> bool {
        self.find_sample(pos, FindFlags::PREV | FindFlags::KEY) == Some(pos)
    }
}

/// Resolve a search against a sorted list of matching positions.
///
/// Shared by every stream implementation so that all of them honour the
/// same direction semantics.
pub fn search_positions(sorted: &[i64], pos: i64, flags: FindFlags) -> Option<i64> {
    if flags.contains(FindFlags::FROM_START) {
        return sorted.first().copied();
    }
    if flags.contains(FindFlags::NEXT) {
        let idx = sorted.partition_point(|&p| p < pos);
        return sorted.get(idx).copied();
    }
    // Backward is the default direction.
    let idx = sorted.partition_point(|&p| p <= pos);
    idx.checked_sub(1).map(|i| sorted[i])
}
