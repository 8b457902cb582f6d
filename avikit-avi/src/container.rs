//! Capabilities shared by file-backed and in-memory containers.
//!
//! A container object may implement several of these at once (a WAV file
//! is a container, a stream and a persistable file); callers pick the
//! capability they need through the trait they call.

use std::io::{Read, Seek};
use std::path::{Path, PathBuf};

use avikit_core::{Error, FourCC, Result, StreamCaps, StreamHandle, StreamType};
use bitflags::bitflags;

use crate::types::HeaderFlags;

/// Any seekable byte source a container can be parsed from.
pub trait MediaSource: Read + Seek + Send {}

impl<T: Read + Seek + Send> MediaSource for T {}

bitflags! {
    /// File open mode. Read-only is the empty set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenMode: u32 {
        const WRITE = 0x0000_0001;
        const READ_WRITE = 0x0000_0002;
        const SHARE_EXCLUSIVE = 0x0000_0010;
        const SHARE_DENY_WRITE = 0x0000_0020;
        const SHARE_DENY_READ = 0x0000_0030;
        const SHARE_DENY_NONE = 0x0000_0040;
        const CREATE = 0x0000_1000;
    }
}

impl OpenMode {
    pub const READ: OpenMode = OpenMode::empty();

    /// Whether the mode asks for anything beyond reading.
    pub fn wants_write(self) -> bool {
        self.intersects(OpenMode::WRITE | OpenMode::READ_WRITE | OpenMode::CREATE)
    }
}

/// File-level description of a container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileInfo {
    pub max_bytes_per_sec: u32,
    pub flags: HeaderFlags,
    pub caps: StreamCaps,
    pub streams: u32,
    pub suggested_buffer_size: u32,
    pub width: u32,
    pub height: u32,
    /// Time base of the file, taken from its first video stream (or its
    /// first stream when there is no video).
    pub scale: u32,
    pub rate: u32,
    pub length: i64,
    pub edit_count: u32,
    pub file_type: String,
}

/// Container operations.
pub trait Container: Send {
    fn info(&self) -> Result<FileInfo>;

    /// The `index`-th stream of `stream_type`, or of any type when `None`.
    /// The caller receives its own reference.
    fn stream(&self, stream_type: Option<StreamType>, index: usize) -> Result<StreamHandle>;

    /// File-level auxiliary data.
    fn read_data(&self, tag: FourCC) -> Result<Vec<u8>> {
        Err(Error::NoData(format!("container has no '{}' data", tag)))
    }
}

/// Persistence operations.
pub trait Persist {
    /// Path the object was loaded from or last saved to.
    fn path(&self) -> Option<PathBuf>;

    /// Whether there are changes not yet written to `path`.
    fn is_dirty(&self) -> bool;

    fn save(&self, path: &Path) -> Result<()>;
}

/// Position of the `index`-th stream of a type among `types`.
pub fn select_stream<I>(types: I, stream_type: Option<StreamType>, index: usize) -> Option<usize>
where
    I: IntoIterator<Item = StreamType>,
{
    types
        .into_iter()
        .enumerate()
        .filter(|(_, t)| stream_type.map_or(true, |wanted| *t == wanted))
        .nth(index)
        .map(|(n, _)| n)
}
