//! AVI and WAVE containers
//!
//! This crate reads RIFF-structured media files without loading them into
//! memory and writes streams back out.
//!
//! # Features
//!
//! - Streaming RIFF chunk reader
//! - AVI reading with per-stream index partitions and random sample access
//! - Recovery of truncated movie data
//! - AVI writing from any set of streams
//! - WAVE files and in-memory stream files
//!
//! # Example
//!
//! ```no_run
//! use avikit_avi::{AviFile, OpenMode};
//! use avikit_core::{Config, Stream, StreamType};
//!
//! let avi = AviFile::open_path("video.avi", OpenMode::READ, Config::default()).unwrap();
//! let video = avi.get_stream(Some(StreamType::Video), 0).unwrap();
//! println!("{} frames", video.length());
//! ```

pub mod chunks;
mod container;
mod index;
mod memfile;
mod reader;
mod types;
mod wav;
pub mod writer;

pub use chunks::{ChunkHeader, ChunkId, ChunkReader, ChunkType, IndexEntry, IndexFlags};
pub use container::{select_stream, Container, FileInfo, MediaSource, OpenMode, Persist};
pub use index::IndexTable;
pub use memfile::StreamFile;
pub use reader::{AviFile, AviStream, ReaderState};
pub use types::{HeaderFlags, MainHeader, StreamHeader};
pub use wav::WavFile;
pub use writer::{save_streams, save_to_path, AviWriter, WriterConfig};
