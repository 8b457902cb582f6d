//! Engine context.
//!
//! A [`Context`] carries the configuration and codec registry every
//! component needs, and counts the containers it has opened that are
//! still alive.

use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use avikit_avi::{writer, AviFile, Container, FileInfo, OpenMode, Persist, WavFile};
use avikit_codec::{CodecHandler, CodecRegistry, FramePipeline};
use avikit_core::{
    BitmapInfo, Config, ContainerKind, Error, FourCC, Result, StreamHandle, StreamType,
};
use avikit_edit::EditableStream;
use tracing::debug;

/// Shared state for one user of the engine.
///
/// Cloning a context shares its registry and open-object count.
#[derive(Clone)]
pub struct Context {
    config: Config,
    registry: Arc<CodecRegistry>,
    open: Arc<AtomicUsize>,
}

impl Default for Context {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

impl Context {
    pub fn new(config: Config) -> Self {
        Context {
            config,
            registry: Arc::new(CodecRegistry::new()),
            open: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// A context configured from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config = serde_json::from_str(json)
            .map_err(|e| Error::bad_param(format!("invalid configuration: {}", e)))?;
        Ok(Self::new(config))
    }

    /// A context configured from a JSON file.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_json(&fs::read_to_string(path)?)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CodecRegistry> {
        &self.registry
    }

    /// Register a codec handler factory for a compression tag.
    pub fn register_codec<F>(&self, tag: FourCC, factory: F)
    where
        F: Fn() -> Box<dyn CodecHandler> + Send + Sync + 'static,
    {
        self.registry.register(tag, factory);
    }

    /// Containers opened through this context and not yet dropped.
    pub fn open_objects(&self) -> usize {
        self.open.load(Ordering::Acquire)
    }

    /// Open a container file, choosing the reader by file extension.
    ///
    /// Files are opened for reading only; use [`Context::save`] to write.
    pub fn open_container(&self, path: impl AsRef<Path>, mode: OpenMode) -> Result<OpenFile> {
        let path = path.as_ref();
        if mode.wants_write() {
            return Err(Error::unsupported(
                "containers are opened read-only; write with save",
            ));
        }
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();
        let kind = self.config.container_for_extension(ext).ok_or_else(|| {
            Error::unsupported(format!("no container handles '{}'", path.display()))
        })?;

        let file = match kind {
            ContainerKind::Avi => {
                FileKind::Avi(AviFile::open_path(path, mode, self.config.clone())?)
            }
            ContainerKind::Wav => FileKind::Wav(WavFile::open_path(path, mode, &self.config)?),
        };
        debug!(path = %path.display(), ?kind, "opened container");

        Ok(OpenFile {
            kind,
            file,
            _live: LiveObject::new(&self.open),
        })
    }

    /// Write `streams` to a new AVI file at `path`.
    pub fn save(&self, path: impl AsRef<Path>, streams: &[StreamHandle]) -> Result<()> {
        let path = path.as_ref();
        if streams.is_empty() {
            return Err(Error::bad_param("nothing to save"));
        }
        writer::save_to_path(path, streams)?;
        debug!(path = %path.display(), streams = streams.len(), "saved");
        Ok(())
    }

    /// An editable stream, empty or covering all of `source`.
    pub fn edit_stream(&self, source: Option<&StreamHandle>) -> Result<EditableStream> {
        let registry = Arc::clone(&self.registry);
        match source {
            Some(source) => EditableStream::from_stream(source, registry, self.config.clone()),
            None => Ok(EditableStream::new(registry, self.config.clone())),
        }
    }

    /// A decode pipeline for a video stream, producing `format` or the
    /// default RGB raster.
    pub fn frame_pipeline(
        &self,
        stream: StreamHandle,
        format: Option<&BitmapInfo>,
    ) -> Result<FramePipeline> {
        FramePipeline::open(stream, Arc::clone(&self.registry), &self.config, format)
    }
}

/// Decrements the context's open-object count when dropped.
struct LiveObject(Arc<AtomicUsize>);

impl LiveObject {
    fn new(count: &Arc<AtomicUsize>) -> Self {
        count.fetch_add(1, Ordering::AcqRel);
        LiveObject(Arc::clone(count))
    }
}

impl Drop for LiveObject {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

enum FileKind {
    Avi(AviFile),
    Wav(WavFile),
}

/// A container opened through a [`Context`].
pub struct OpenFile {
    kind: ContainerKind,
    file: FileKind,
    _live: LiveObject,
}

impl OpenFile {
    pub fn kind(&self) -> ContainerKind {
        self.kind
    }

    /// Container operations.
    pub fn container(&self) -> &dyn Container {
        match &self.file {
            FileKind::Avi(avi) => avi,
            FileKind::Wav(wav) => wav,
        }
    }

    /// Persistence operations.
    pub fn persist(&self) -> &dyn Persist {
        match &self.file {
            FileKind::Avi(avi) => avi,
            FileKind::Wav(wav) => wav,
        }
    }

    pub fn info(&self) -> Result<FileInfo> {
        self.container().info()
    }

    pub fn stream(&self, stream_type: Option<StreamType>, index: usize) -> Result<StreamHandle> {
        self.container().stream(stream_type, index)
    }

    /// Every stream in file order.
    pub fn streams(&self) -> Result<Vec<StreamHandle>> {
        match &self.file {
            FileKind::Avi(avi) => avi.streams(),
            FileKind::Wav(wav) => Ok(vec![wav.as_stream()]),
        }
    }

    /// The underlying AVI reader, when this is an AVI file.
    pub fn as_avi(&self) -> Option<&AviFile> {
        match &self.file {
            FileKind::Avi(avi) => Some(avi),
            FileKind::Wav(_) => None,
        }
    }
}
