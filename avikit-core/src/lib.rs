//! # avikit core
//!
//! Types shared by every avikit component:
//! - the error taxonomy
//! - four character codes and well-known chunk tags
//! - the stream model (`Stream`, `StreamInfo`, search flags)
//! - typed views of video and audio format descriptors
//! - engine configuration

pub mod config;
pub mod error;
pub mod format;
pub mod fourcc;
pub mod stream;

pub use config::{Config, ContainerKind, IndexPolicy};
pub use error::{Error, Result};
pub use format::{BitmapInfo, WaveFormat, BI_RGB};
pub use fourcc::FourCC;
pub use stream::{
    FindFlags, ReadInfo, Rect, Stream, StreamCaps, StreamFlags, StreamHandle, StreamInfo,
    StreamType,
};
