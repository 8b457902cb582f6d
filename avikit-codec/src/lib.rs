//! # avikit codecs
//!
//! The boundary to pluggable codec handlers and the frame decode pipeline
//! built on top of it.
//!
//! ## Dispatch
//!
//! - [`CodecRegistry`] - compression tag to handler factory
//! - [`CodecHandler`] - what a handler implements
//! - [`CodecRequest`] - the closed set of requests a handler receives
//!
//! ## Decoding
//!
//! [`FramePipeline`] seeks to key frames, decodes forward and caches the
//! last decoded raster.

pub mod dispatch;
pub mod getframe;

pub use dispatch::{Codec, CodecFactory, CodecHandler, CodecMode, CodecRegistry, CodecRequest};
pub use getframe::FramePipeline;
