//! RIFF `WAVE` files.
//!
//! [`WavFile`] is a container with a single audio stream, and that stream
//! is the file itself: it implements [`Container`], [`Stream`] and
//! [`Persist`]. Cloning is cheap and every clone sees the same data.

use std::any::Any;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use avikit_core::fourcc::chunk_ids;
use avikit_core::stream::search_positions;
use avikit_core::{
    Config, Error, FindFlags, FourCC, ReadInfo, Result, Stream, StreamCaps, StreamHandle, StreamInfo,
    StreamType, WaveFormat,
};
use byteorder::{LittleEndian, WriteBytesExt};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::chunks::{padded, write_chunk, ChunkReader, CHUNK_HEADER_SIZE};
use crate::container::{Container, FileInfo, MediaSource, OpenMode, Persist};

enum WavData {
    OnDisk {
        source: Mutex<ChunkReader<Box<dyn MediaSource>>>,
        offset: u64,
        len: u64,
    },
    InMemory(Vec<u8>),
}

impl WavData {
    fn len(&self) -> u64 {
        match self {
            WavData::OnDisk { len, .. } => *len,
            WavData::InMemory(bytes) => bytes.len() as u64,
        }
    }

    fn read_at(&self, at: u64, buf: &mut [u8]) -> Result<()> {
        match self {
            WavData::OnDisk { source, offset, .. } => {
                let mut source = source.lock();
                source.seek_to(offset + at)?;
                source.read_payload(buf.len() as u64, buf)?;
            }
            WavData::InMemory(bytes) => {
                let at = at as usize;
                buf.copy_from_slice(&bytes[at..at + buf.len()]);
            }
        }
        Ok(())
    }

    fn to_vec(&self) -> Result<Vec<u8>> {
        let mut all = vec![0u8; self.len() as usize];
        self.read_at(0, &mut all)?;
        Ok(all)
    }
}

struct WavInner {
    format: WaveFormat,
    format_bytes: Vec<u8>,
    name: String,
    data: RwLock<WavData>,
    path: Mutex<Option<PathBuf>>,
    dirty: AtomicBool,
}

/// A WAVE file.
#[derive(Clone)]
pub struct WavFile {
    inner: Arc<WavInner>,
}

impl WavFile {
    /// A new, empty in-memory file.
    pub fn create(format: WaveFormat) -> Result<Self> {
        if format.block_align == 0 {
            return Err(Error::bad_param("wave format has zero block alignment"));
        }
        Ok(Self::with_data(format, String::new(), WavData::InMemory(Vec::new()), None))
    }

    fn with_data(format: WaveFormat, name: String, data: WavData, path: Option<PathBuf>) -> Self {
        let format_bytes = format.to_bytes();
        WavFile {
            inner: Arc::new(WavInner {
                format,
                format_bytes,
                name,
                data: RwLock::new(data),
                path: Mutex::new(path),
                dirty: AtomicBool::new(false),
            }),
        }
    }

    /// Parse a WAVE file from a seekable source.
    pub fn from_reader<R: MediaSource + 'static>(source: R, config: &Config) -> Result<Self> {
        Self::parse(Box::new(source), config, None)
    }

    /// Open a WAVE file on disk for reading.
    pub fn open_path(path: impl AsRef<Path>, mode: OpenMode, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        if mode.wants_write() {
            return Err(Error::unsupported("WAVE files are opened read-only; use save to write"));
        }
        let file = File::open(path)?;
        Self::parse(Box::new(BufReader::new(file)), config, Some(path.to_path_buf()))
    }

    fn parse(source: Box<dyn MediaSource>, config: &Config, path: Option<PathBuf>) -> Result<Self> {
        let mut reader = ChunkReader::new(source)?;
        let file_len = reader.source_len()?;
        reader.seek_to(0)?;

        if file_len < 12 {
            return Err(Error::bad_format("file too short for a RIFF header"));
        }
        let riff = reader.read_chunk_header()?;
        if riff.id != chunk_ids::RIFF || reader.read_fourcc()? != chunk_ids::WAVE {
            return Err(Error::bad_format("not a RIFF WAVE file"));
        }
        let riff_end = riff.end().min(file_len);

        let mut format = None;
        let mut data = None;
        let mut name = String::new();
        while reader.position() + CHUNK_HEADER_SIZE <= riff_end {
            let chunk = reader.read_chunk_header()?;
            match chunk.id {
                chunk_ids::FMT => format = Some(WaveFormat::parse(&reader.read_chunk_data(&chunk)?)?),
                chunk_ids::DATA => {
                    let mut len = chunk.size as u64;
                    if chunk.end() > file_len {
                        if !config.recover_truncated {
                            return Err(Error::FileRead(Arc::new(io::Error::new(
                                io::ErrorKind::UnexpectedEof,
                                "wave data extends past the end of the file",
                            ))));
                        }
                        warn!(declared = len, actual = file_len - chunk.offset, "wave data truncated");
                        len = file_len - chunk.offset;
                    }
                    data = Some((chunk.offset, len));
                    reader.skip_payload(padded(chunk.size as u64))?;
                }
                chunk_ids::LIST if chunk.size >= 4 => {
                    let list_end = chunk.end().min(riff_end);
                    if reader.read_fourcc()? == chunk_ids::INFO {
                        if let Ok(inam) = reader.seek_to_chunk(chunk_ids::INAM, list_end) {
                            let raw = reader.read_chunk_data(&inam)?;
                            name = String::from_utf8_lossy(&raw).trim_end_matches('\0').to_string();
                        }
                    }
                    reader.seek_to(chunk.padded_end())?;
                }
                _ => reader.skip_payload(padded(chunk.size as u64))?,
            }
        }

        let format = format.ok_or_else(|| Error::bad_format("WAVE file has no 'fmt ' chunk"))?;
        let (offset, len) = data.ok_or_else(|| Error::bad_format("WAVE file has no 'data' chunk"))?;
        if format.block_align == 0 {
            return Err(Error::bad_format("wave format has zero block alignment"));
        }

        debug!(
            channels = format.channels,
            rate = format.samples_per_sec,
            bits = format.bits_per_sample,
            bytes = len,
            "opened WAVE file"
        );

        let data = WavData::OnDisk {
            source: Mutex::new(reader),
            offset,
            len,
        };
        Ok(Self::with_data(format, name, data, path))
    }

    pub fn format(&self) -> &WaveFormat {
        &self.inner.format
    }

    fn block_align(&self) -> u64 {
        self.inner.format.block_align as u64
    }

    fn sample_count(&self) -> i64 {
        (self.inner.data.read().len() / self.block_align()) as i64
    }

    /// Append whole blocks; returns the number of samples added.
    pub fn append(&self, bytes: &[u8]) -> Result<i64> {
        let block = self.block_align();
        if bytes.len() as u64 % block != 0 {
            return Err(Error::bad_param(format!(
                "{} bytes is not a multiple of the {} byte block",
                bytes.len(),
                block
            )));
        }

        let mut data = self.inner.data.write();
        if let WavData::OnDisk { .. } = &*data {
            let loaded = data.to_vec()?;
            *data = WavData::InMemory(loaded);
        }
        if let WavData::InMemory(buf) = &mut *data {
            buf.extend_from_slice(bytes);
        }
        self.inner.dirty.store(true, Ordering::Release);
        Ok((bytes.len() as u64 / block) as i64)
    }

    /// A handle to the file's audio stream.
    pub fn as_stream(&self) -> StreamHandle {
        Arc::new(self.clone())
    }

    fn write_to<W: Write>(&self, w: &mut W) -> Result<()> {
        let data = self.inner.data.read().to_vec()?;

        let mut body = Vec::with_capacity(data.len() + 64);
        body.extend_from_slice(chunk_ids::WAVE.as_bytes());
        write_chunk(&mut body, chunk_ids::FMT, &self.inner.format_bytes).map_err(Error::write)?;
        write_chunk(&mut body, chunk_ids::DATA, &data).map_err(Error::write)?;
        if !self.inner.name.is_empty() {
            let mut inam = self.inner.name.as_bytes().to_vec();
            inam.push(0);
            let mut info = chunk_ids::INFO.as_bytes().to_vec();
            write_chunk(&mut info, chunk_ids::INAM, &inam).map_err(Error::write)?;
            write_chunk(&mut body, chunk_ids::LIST, &info).map_err(Error::write)?;
        }

        w.write_all(chunk_ids::RIFF.as_bytes()).map_err(Error::write)?;
        w.write_u32::<LittleEndian>(body.len() as u32).map_err(Error::write)?;
        w.write_all(&body).map_err(Error::write)?;
        Ok(())
    }

    /// Serialise the whole file into memory.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_to(&mut out)?;
        Ok(out)
    }
}

impl Stream for WavFile {
    fn info(&self) -> StreamInfo {
        let format = &self.inner.format;
        StreamInfo {
            stream_type: StreamType::Audio,
            handler: FourCC::NULL,
            caps: StreamCaps::CAN_READ | StreamCaps::CAN_WRITE,
            scale: format.block_align as u32,
            rate: format.avg_bytes_per_sec,
            start: 0,
            length: self.sample_count(),
            suggested_buffer_size: format.avg_bytes_per_sec,
            quality: u32::MAX,
            sample_size: format.block_align as u32,
            name: self.inner.name.clone(),
            ..Default::default()
        }
    }

    fn read_format(&self, _pos: i64) -> Result<Vec<u8>> {
        Ok(self.inner.format_bytes.clone())
    }

    fn read(&self, start: i64, samples: i64, buf: Option<&mut [u8]>) -> Result<ReadInfo> {
        let data = self.inner.data.read();
        let block = self.block_align() as usize;
        let length = (data.len() / block as u64) as i64;
        if start < 0 || start >= length {
            return Err(Error::bad_param(format!("position {} outside stream [0, {})", start, length)));
        }
        if samples < 1 {
            return Err(Error::bad_param(format!("cannot read {} samples", samples)));
        }

        let wanted = samples.min(length - start);
        let Some(buf) = buf else {
            return Ok(ReadInfo {
                bytes: wanted as usize * block,
                samples: wanted,
            });
        };

        let fit = (buf.len() / block) as i64;
        if fit == 0 {
            return Err(Error::BufferTooSmall {
                needed: block,
                available: buf.len(),
            });
        }
        let count = wanted.min(fit);
        let bytes = count as usize * block;
        data.read_at(start as u64 * block as u64, &mut buf[..bytes])?;
        Ok(ReadInfo { bytes, samples: count })
    }

    fn find_sample(&self, pos: i64, flags: FindFlags) -> Option<i64> {
        let length = self.sample_count();
        if length == 0 {
            return None;
        }
        if flags.contains(FindFlags::FORMAT) {
            return search_positions(&[0], pos, flags);
        }
        // Every PCM block is a key frame.
        if flags.contains(FindFlags::FROM_START) {
            Some(0)
        } else if flags.contains(FindFlags::NEXT) {
            let p = pos.max(0);
            (p < length).then_some(p)
        } else if pos < 0 {
            None
        } else {
            Some(pos.min(length - 1))
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Container for WavFile {
    fn info(&self) -> Result<FileInfo> {
        let format = &self.inner.format;
        Ok(FileInfo {
            max_bytes_per_sec: format.avg_bytes_per_sec,
            caps: StreamCaps::CAN_READ | StreamCaps::CAN_WRITE,
            streams: 1,
            suggested_buffer_size: format.avg_bytes_per_sec,
            scale: format.block_align as u32,
            rate: format.avg_bytes_per_sec,
            length: self.sample_count(),
            file_type: "Waveform audio".to_string(),
            ..Default::default()
        })
    }

    fn stream(&self, stream_type: Option<StreamType>, index: usize) -> Result<StreamHandle> {
        match stream_type {
            None | Some(StreamType::Audio) if index == 0 => Ok(self.as_stream()),
            _ => Err(Error::NoData(format!("no stream {} of type {:?}", index, stream_type))),
        }
    }
}

impl Persist for WavFile {
    fn path(&self) -> Option<PathBuf> {
        self.inner.path.lock().clone()
    }

    fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let file = File::create(path).map_err(Error::write)?;
        let mut out = BufWriter::new(file);
        self.write_to(&mut out)?;
        out.flush().map_err(Error::write)?;

        *self.inner.path.lock() = Some(path.to_path_buf());
        self.inner.dirty.store(false, Ordering::Release);
        Ok(())
    }
}
