//! # avikit
//!
//! Read, edit, decode and write AVI and WAVE files.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use avikit::{Context, OpenMode, Stream, StreamHandle, StreamType};
//!
//! fn main() -> avikit::Result<()> {
//!     let ctx = Context::default();
//!     let file = ctx.open_container("input.avi", OpenMode::READ)?;
//!     let video = file.stream(Some(StreamType::Video), 0)?;
//!
//!     // Drop the first second and write the rest back out.
//!     let edited = ctx.edit_stream(Some(&video))?;
//!     let rate = video.info().sample_rate().round() as i64;
//!     edited.cut(0, rate, false)?;
//!     let edited: StreamHandle = Arc::new(edited);
//!     ctx.save("output.avi", &[edited])?;
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! The library is organized into several crates:
//! - `avikit-core`: errors, the stream model, format descriptors, configuration
//! - `avikit-avi`: RIFF/AVI and WAVE readers, the AVI writer
//! - `avikit-codec`: codec dispatch and the frame decode pipeline
//! - `avikit-edit`: segment-based editable streams
//!
//! This crate re-exports the most commonly used types and ties the
//! components together through a [`Context`].

mod context;
pub mod prelude;

pub use avikit_core::{
    BitmapInfo, Config, ContainerKind, Error, FindFlags, FourCC, IndexPolicy, ReadInfo, Rect,
    Result, Stream, StreamCaps, StreamFlags, StreamHandle, StreamInfo, StreamType, WaveFormat,
};

pub use avikit_avi::{
    AviFile, AviWriter, Container, FileInfo, OpenMode, Persist, StreamFile, WavFile, WriterConfig,
};

pub use avikit_codec::{Codec, CodecHandler, CodecMode, CodecRegistry, CodecRequest, FramePipeline};

pub use avikit_edit::{EditableStream, Segment};

pub use context::{Context, OpenFile};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
