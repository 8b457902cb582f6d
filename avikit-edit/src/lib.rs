//! Non-destructive stream editing.
//!
//! An [`EditableStream`] references ranges of other streams instead of
//! copying their samples. Cut, copy and paste rewrite a small segment
//! table; reads resolve through it to the sources.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use avikit_avi::WavFile;
//! use avikit_codec::CodecRegistry;
//! use avikit_core::{Config, Stream, WaveFormat};
//! use avikit_edit::EditableStream;
//!
//! let wav = WavFile::create(WaveFormat::pcm(1, 8000, 8)).unwrap();
//! wav.append(&[0u8; 800]).unwrap();
//!
//! let registry = Arc::new(CodecRegistry::new());
//! let stream = EditableStream::from_stream(&wav.as_stream(), registry, Config::default()).unwrap();
//!
//! // Move the first 100 samples to the end.
//! let head = stream.cut(0, 100, true).unwrap().unwrap();
//! let head: avikit_core::StreamHandle = Arc::new(head);
//! stream.paste(stream.info().end(), &head, 0, 100).unwrap();
//!
//! assert_eq!(stream.length(), 800);
//! assert_eq!(stream.segments().len(), 2);
//! ```

mod editable;
mod segment;

pub use editable::EditableStream;
pub use segment::{same_stream, Segment};
