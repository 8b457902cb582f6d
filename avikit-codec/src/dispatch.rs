//! Codec dispatch.
//!
//! Codec handlers are external collaborators. The engine never looks
//! inside them; it opens a handler for a compression tag and drives it
//! through a fixed sequence of [`CodecRequest`]s:
//!
//! ```text
//! Open -> DecompressBegin -> Decompress* -> DecompressEnd -> Close
//! ```
//!
//! Whatever error a handler reports is surfaced unchanged.

use std::collections::HashMap;
use std::sync::Arc;

use avikit_core::{BitmapInfo, Error, FourCC, Result};
use parking_lot::RwLock;
use tracing::{debug, warn};

/// What a handler is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CodecMode {
    Decompress,
    Compress,
}

/// One request sent to a codec handler.
#[derive(Debug)]
pub enum CodecRequest<'a> {
    Open {
        tag: FourCC,
        mode: CodecMode,
    },
    DecompressBegin {
        input: &'a BitmapInfo,
        output: &'a BitmapInfo,
    },
    Decompress {
        input: &'a BitmapInfo,
        data: &'a [u8],
        output: &'a BitmapInfo,
        out: &'a mut [u8],
        /// The payload depends on previously decoded frames.
        not_key_frame: bool,
    },
    DecompressEnd,
    Close,
}

/// A pluggable codec implementation.
pub trait CodecHandler: Send {
    fn handle(&mut self, request: CodecRequest<'_>) -> Result<()>;
}

/// Creates a fresh handler instance per open.
pub type CodecFactory = Arc<dyn Fn() -> Box<dyn CodecHandler> + Send + Sync>;

/// Maps compression tags to handler factories.
///
/// Tags are matched case-insensitively, since files in the wild disagree
/// on the case of the same codec (`CVID` vs `cvid`).
pub struct CodecRegistry {
    factories: RwLock<HashMap<FourCC, CodecFactory>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self {
            factories: RwLock::new(HashMap::new()),
        }
    }

    /// Register a handler factory, replacing any previous one for `tag`.
    pub fn register<F>(&self, tag: FourCC, factory: F)
    where
        F: Fn() -> Box<dyn CodecHandler> + Send + Sync + 'static,
    {
        debug!(tag = %tag, "codec registered");
        self.factories
            .write()
            .insert(tag.to_ascii_lowercase(), Arc::new(factory));
    }

    pub fn unregister(&self, tag: FourCC) -> bool {
        self.factories.write().remove(&tag.to_ascii_lowercase()).is_some()
    }

    pub fn contains(&self, tag: FourCC) -> bool {
        self.factories.read().contains_key(&tag.to_ascii_lowercase())
    }

    pub fn count(&self) -> usize {
        self.factories.read().len()
    }

    /// Open a handler for `tag`.
    pub fn open(&self, tag: FourCC, mode: CodecMode) -> Result<Codec> {
        let factory = self
            .factories
            .read()
            .get(&tag.to_ascii_lowercase())
            .cloned()
            .ok_or(Error::NoCompressor(tag))?;

        let mut handler = factory();
        handler.handle(CodecRequest::Open { tag, mode })?;
        debug!(tag = %tag, ?mode, "codec opened");

        Ok(Codec {
            handler,
            tag,
            begun: false,
            closed: false,
        })
    }
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// An open codec handler.
///
/// Dropping the handle ends any running decompression and closes the
/// handler.
pub struct Codec {
    handler: Box<dyn CodecHandler>,
    tag: FourCC,
    begun: bool,
    closed: bool,
}

impl Codec {
    pub fn tag(&self) -> FourCC {
        self.tag
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::BadHandle(format!("codec '{}' is closed", self.tag)));
        }
        Ok(())
    }

    pub fn decompress_begin(&mut self, input: &BitmapInfo, output: &BitmapInfo) -> Result<()> {
        self.ensure_open()?;
        self.handler
            .handle(CodecRequest::DecompressBegin { input, output })?;
        self.begun = true;
        Ok(())
    }

    pub fn decompress(
        &mut self,
        input: &BitmapInfo,
        data: &[u8],
        output: &BitmapInfo,
        out: &mut [u8],
        not_key_frame: bool,
    ) -> Result<()> {
        self.ensure_open()?;
        if !self.begun {
            return Err(Error::BadHandle(format!(
                "codec '{}' has not begun decompressing",
                self.tag
            )));
        }
        self.handler.handle(CodecRequest::Decompress {
            input,
            data,
            output,
            out,
            not_key_frame,
        })
    }

    pub fn decompress_end(&mut self) -> Result<()> {
        if self.closed || !self.begun {
            return Ok(());
        }
        self.begun = false;
        self.handler.handle(CodecRequest::DecompressEnd)
    }

    /// Release the handler. Calling this more than once is harmless.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let ended = self.decompress_end();
        self.closed = true;
        let closed = self.handler.handle(CodecRequest::Close);
        debug!(tag = %self.tag, "codec closed");
        ended.and(closed)
    }
}

impl Drop for Codec {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(tag = %self.tag, error = %e, "codec close failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Records the name of every request it receives.
    struct Recorder(Arc<Mutex<Vec<&'static str>>>);

    impl CodecHandler for Recorder {
        fn handle(&mut self, request: CodecRequest<'_>) -> Result<()> {
            let name = match request {
                CodecRequest::Open { .. } => "open",
                CodecRequest::DecompressBegin { .. } => "begin",
                CodecRequest::Decompress { .. } => "decompress",
                CodecRequest::DecompressEnd => "end",
                CodecRequest::Close => "close",
            };
            self.0.lock().push(name);
            Ok(())
        }
    }

    fn registry_with_recorder() -> (CodecRegistry, Arc<Mutex<Vec<&'static str>>>) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let registry = CodecRegistry::new();
        let shared = Arc::clone(&log);
        registry.register(FourCC::new(*b"cvid"), move || {
            Box::new(Recorder(Arc::clone(&shared))) as Box<dyn CodecHandler>
        });
        (registry, log)
    }

    #[test]
    fn test_missing_codec() {
        let registry = CodecRegistry::new();
        let err = registry
            .open(FourCC::new(*b"xvid"), CodecMode::Decompress)
            .err();
        assert!(matches!(err, Some(Error::NoCompressor(tag)) if tag == FourCC::new(*b"xvid")));
    }

    #[test]
    fn test_case_insensitive_lookup() {
        let (registry, _) = registry_with_recorder();
        assert!(registry.contains(FourCC::new(*b"CVID")));
        let codec = registry.open(FourCC::new(*b"CVID"), CodecMode::Decompress).unwrap();
        assert_eq!(codec.tag(), FourCC::new(*b"CVID"));
    }

    #[test]
    fn test_request_sequence() {
        let (registry, log) = registry_with_recorder();
        let format = BitmapInfo::rgb(2, 2, 24);
        let mut out = vec![0u8; format.frame_size()];
        {
            let mut codec = registry.open(FourCC::new(*b"cvid"), CodecMode::Decompress).unwrap();
            codec.decompress_begin(&format, &format).unwrap();
            codec.decompress(&format, &[0], &format, &mut out, false).unwrap();
        }
        assert_eq!(*log.lock(), vec!["open", "begin", "decompress", "end", "close"]);
    }

    #[test]
    fn test_close_is_idempotent() {
        let (registry, log) = registry_with_recorder();
        let mut codec = registry.open(FourCC::new(*b"cvid"), CodecMode::Decompress).unwrap();
        codec.close().unwrap();
        codec.close().unwrap();
        drop(codec);
        assert_eq!(*log.lock(), vec!["open", "close"]);
    }

    #[test]
    fn test_decompress_requires_begin() {
        let (registry, _) = registry_with_recorder();
        let format = BitmapInfo::rgb(1, 1, 24);
        let mut out = vec![0u8; 4];
        let mut codec = registry.open(FourCC::new(*b"cvid"), CodecMode::Decompress).unwrap();
        assert!(matches!(
            codec.decompress(&format, &[0], &format, &mut out, false),
            Err(Error::BadHandle(_))
        ));
    }

    #[test]
    fn test_unregister() {
        let (registry, _) = registry_with_recorder();
        assert_eq!(registry.count(), 1);
        assert!(registry.unregister(FourCC::new(*b"CviD")));
        assert!(!registry.unregister(FourCC::new(*b"cvid")));
        assert_eq!(registry.count(), 0);
    }
}
