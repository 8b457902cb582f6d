//! Prelude module for convenient imports.
//!
//! ```rust
//! use avikit::prelude::*;
//! ```

pub use crate::{Error, Result};

pub use crate::{Context, OpenFile, OpenMode};

pub use crate::{FindFlags, Stream, StreamHandle, StreamInfo, StreamType};

pub use crate::{Container, Persist};

pub use crate::{CodecHandler, CodecRequest, FramePipeline};

pub use crate::EditableStream;
