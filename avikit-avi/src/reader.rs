//! AVI container reader
//!
//! [`AviFile`] owns one open file. Opening walks the RIFF structure once,
//! keeps the stream headers and formats, and resolves the index into file
//! offsets; samples are then read on demand through a locked handle.

use std::any::Any;
use std::fs::File;
use std::io::{self, BufReader};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use avikit_core::fourcc::chunk_ids;
use avikit_core::stream::search_positions;
use avikit_core::{
    Config, Error, FindFlags, FourCC, ReadInfo, Result, Stream, StreamCaps, StreamHandle,
    StreamInfo, StreamType,
};
use parking_lot::Mutex;
use tracing::{debug, trace, warn};

use crate::chunks::{padded, ChunkHeader, ChunkReader, IndexEntry, IndexFlags, CHUNK_HEADER_SIZE};
use crate::container::{select_stream, Container, FileInfo, MediaSource, OpenMode, Persist};
use crate::index::IndexTable;
use crate::types::{MainHeader, StreamHeader};
use crate::writer;

/// Reader lifecycle. There is no way back to `Unopened`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Unopened,
    Parsing,
    Ready,
    Failed,
}

enum State {
    Unopened(Box<dyn MediaSource>),
    Parsing,
    Ready(Arc<Parsed>),
    Failed(Error),
}

/// Where an index entry's chunk lives in the file.
#[derive(Debug, Clone, Copy)]
struct Location {
    /// Absolute offset of the chunk header
    offset: u64,
    /// Payload bytes actually available
    size: u32,
}

/// A run of samples stored in one chunk.
#[derive(Debug, Clone, Copy)]
struct SampleChunk {
    location: Location,
    /// First sample, relative to the stream start
    first: i64,
    count: i64,
}

impl SampleChunk {
    fn end(&self) -> i64 {
        self.first + self.count
    }
}

struct StreamData {
    header: StreamHeader,
    format: Vec<u8>,
    handler_data: Option<Vec<u8>>,
    name: String,
    /// One slot per partition entry; `None` when the chunk lies past the
    /// end of the movie data.
    locations: Vec<Option<Location>>,
    samples: Vec<SampleChunk>,
    key_positions: Vec<i64>,
    length: i64,
}

impl StreamData {
    fn start(&self) -> i64 {
        self.header.start as i64
    }

    /// Index of the chunk holding relative sample `rel`.
    fn chunk_for(&self, rel: i64) -> usize {
        self.samples.partition_point(|c| c.end() <= rel)
    }
}

struct Parsed {
    source: Mutex<ChunkReader<Box<dyn MediaSource>>>,
    header: MainHeader,
    streams: Vec<StreamData>,
    index: IndexTable,
    movie_base: u64,
    info: FileInfo,
}

impl Parsed {
    fn stream(&self, n: usize) -> Result<&StreamData> {
        self.streams.get(n).ok_or_else(|| {
            Error::bad_param(format!("stream {} out of range ({} streams)", n, self.streams.len()))
        })
    }

    /// Read `buf.len()` bytes at an absolute offset.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut source = self.source.lock();
        source.seek_to(offset)?;
        source.read_payload(buf.len() as u64, buf)?;
        Ok(())
    }
}

/// AVI file reader
pub struct AviFile {
    state: State,
    config: Config,
    path: Option<PathBuf>,
}

impl AviFile {
    /// Wrap a source without parsing it yet.
    pub fn new<R: MediaSource + 'static>(source: R, config: Config) -> Self {
        AviFile {
            state: State::Unopened(Box::new(source)),
            config,
            path: None,
        }
    }

    /// Wrap and parse a source.
    pub fn from_reader<R: MediaSource + 'static>(source: R, config: Config) -> Result<Self> {
        let mut file = AviFile::new(source, config);
        file.open()?;
        Ok(file)
    }

    /// Open and parse a file on disk; only read access is supported.
    pub fn open_path(path: impl AsRef<Path>, mode: OpenMode, config: Config) -> Result<Self> {
        let path = path.as_ref();
        if mode.wants_write() {
            return Err(Error::unsupported("AVI files are opened read-only; use save to write"));
        }
        let file = File::open(path)?;
        let mut avi = AviFile::new(BufReader::new(file), config);
        avi.path = Some(path.to_path_buf());
        avi.open()?;
        Ok(avi)
    }

    /// Parse the source. On failure the reader stays `Failed` and every
    /// later call returns the same error.
    pub fn open(&mut self) -> Result<()> {
        match std::mem::replace(&mut self.state, State::Parsing) {
            State::Unopened(source) => match parse(source, &self.config) {
                Ok(parsed) => {
                    self.state = State::Ready(Arc::new(parsed));
                    Ok(())
                }
                Err(e) => {
                    debug!(error = %e, "AVI open failed");
                    self.state = State::Failed(e.clone());
                    Err(e)
                }
            },
            State::Ready(parsed) => {
                self.state = State::Ready(parsed);
                Ok(())
            }
            State::Failed(e) => {
                self.state = State::Failed(e.clone());
                Err(e)
            }
            State::Parsing => Err(Error::BadHandle("container is being parsed".into())),
        }
    }

    pub fn state(&self) -> ReaderState {
        match self.state {
            State::Unopened(_) => ReaderState::Unopened,
            State::Parsing => ReaderState::Parsing,
            State::Ready(_) => ReaderState::Ready,
            State::Failed(_) => ReaderState::Failed,
        }
    }

    fn parsed(&self) -> Result<&Arc<Parsed>> {
        match &self.state {
            State::Ready(parsed) => Ok(parsed),
            State::Failed(e) => Err(e.clone()),
            State::Unopened(_) | State::Parsing => {
                Err(Error::BadHandle("container is not open".into()))
            }
        }
    }

    pub fn header(&self) -> Result<&MainHeader> {
        Ok(&self.parsed()?.header)
    }

    pub fn stream_count(&self) -> Result<usize> {
        Ok(self.parsed()?.streams.len())
    }

    /// The stream header exactly as stored in the file.
    pub fn stream_info(&self, stream: usize) -> Result<StreamHeader> {
        Ok(self.parsed()?.stream(stream)?.header.clone())
    }

    /// The stream's `strf` bytes.
    pub fn stream_format(&self, stream: usize) -> Result<Vec<u8>> {
        Ok(self.parsed()?.stream(stream)?.format.clone())
    }

    pub fn index(&self) -> Result<&IndexTable> {
        Ok(&self.parsed()?.index)
    }

    /// Offset of the `movi` tag; index offsets are relative to it.
    pub fn movie_base(&self) -> Result<u64> {
        Ok(self.parsed()?.movie_base)
    }

    /// Read the chunk of the `index`-th index entry of a stream.
    ///
    /// The returned record starts with the chunk's own 8-byte header
    /// (tag and declared size), followed by the payload. With
    /// `buf == None` only the size is reported and the file is not
    /// touched.
    pub fn read_sample_into(&self, stream: usize, index: usize, buf: Option<&mut [u8]>) -> Result<ReadInfo> {
        let parsed = self.parsed()?;
        let entries = parsed.index.lookup(stream)?;
        if index >= entries.len() {
            return Err(Error::bad_param(format!(
                "sample {} out of range ({} entries)",
                index,
                entries.len()
            )));
        }
        let location = parsed.stream(stream)?.locations[index].ok_or_else(|| {
            Error::FileRead(Arc::new(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "chunk lies beyond the end of the movie data",
            )))
        })?;

        let total = location.size as usize + CHUNK_HEADER_SIZE as usize;
        if let Some(buf) = buf {
            if buf.len() < total {
                return Err(Error::BufferTooSmall {
                    needed: total,
                    available: buf.len(),
                });
            }
            parsed.read_at(location.offset, &mut buf[..total])?;
        }
        Ok(ReadInfo {
            bytes: total,
            samples: 1,
        })
    }

    /// Size of a sample record without reading it.
    pub fn sample_size(&self, stream: usize, index: usize) -> Result<ReadInfo> {
        self.read_sample_into(stream, index, None)
    }

    /// Read one sample record (chunk header included).
    pub fn read_sample(&self, stream: usize, index: usize) -> Result<Vec<u8>> {
        let size = self.sample_size(stream, index)?;
        let mut buf = vec![0u8; size.bytes];
        self.read_sample_into(stream, index, Some(&mut buf))?;
        Ok(buf)
    }

    /// A shared handle to the `index`-th stream of a type.
    pub fn get_stream(&self, stream_type: Option<StreamType>, index: usize) -> Result<StreamHandle> {
        let parsed = self.parsed()?;
        let number = select_stream(
            parsed.streams.iter().map(|s| s.header.stream_type),
            stream_type,
            index,
        )
        .ok_or_else(|| Error::NoData(format!("no stream {} of type {:?}", index, stream_type)))?;

        Ok(Arc::new(AviStream {
            parsed: Arc::clone(parsed),
            number,
        }))
    }

    /// Handles to every stream in file order.
    pub fn streams(&self) -> Result<Vec<StreamHandle>> {
        (0..self.stream_count()?).map(|n| self.get_stream(None, n)).collect()
    }
}

impl Container for AviFile {
    fn info(&self) -> Result<FileInfo> {
        Ok(self.parsed()?.info.clone())
    }

    fn stream(&self, stream_type: Option<StreamType>, index: usize) -> Result<StreamHandle> {
        self.get_stream(stream_type, index)
    }
}

impl Persist for AviFile {
    fn path(&self) -> Option<PathBuf> {
        self.path.clone()
    }

    fn is_dirty(&self) -> bool {
        false
    }

    fn save(&self, path: &Path) -> Result<()> {
        writer::save_to_path(path, &self.streams()?)
    }
}

/// One stream of an open [`AviFile`].
pub struct AviStream {
    parsed: Arc<Parsed>,
    number: usize,
}

impl AviStream {
    fn data(&self) -> &StreamData {
        &self.parsed.streams[self.number]
    }

    pub fn number(&self) -> usize {
        self.number
    }

    fn read_variable(&self, data: &StreamData, rel: i64, buf: Option<&mut [u8]>) -> Result<ReadInfo> {
        let chunk = data.samples[data.chunk_for(rel)];
        let needed = chunk.location.size as usize;
        if let Some(buf) = buf {
            if buf.len() < needed {
                return Err(Error::BufferTooSmall {
                    needed,
                    available: buf.len(),
                });
            }
            self.parsed
                .read_at(chunk.location.offset + CHUNK_HEADER_SIZE, &mut buf[..needed])?;
        }
        Ok(ReadInfo {
            bytes: needed,
            samples: 1,
        })
    }

    fn read_fixed(&self, data: &StreamData, rel: i64, samples: i64, buf: Option<&mut [u8]>) -> Result<ReadInfo> {
        let sample_size = data.header.sample_size as usize;
        let wanted = samples.min(data.length - rel);

        let buf = match buf {
            None => {
                return Ok(ReadInfo {
                    bytes: wanted as usize * sample_size,
                    samples: wanted,
                })
            }
            Some(buf) => buf,
        };

        let fit = (buf.len() / sample_size) as i64;
        if fit == 0 {
            return Err(Error::BufferTooSmall {
                needed: sample_size,
                available: buf.len(),
            });
        }
        let count = wanted.min(fit);

        let mut pos = rel;
        let mut written = 0usize;
        let mut chunk_idx = data.chunk_for(rel);
        while pos < rel + count {
            let chunk = data.samples[chunk_idx];
            let within = pos - chunk.first;
            let take = (chunk.count - within).min(rel + count - pos);
            if take > 0 {
                let bytes = take as usize * sample_size;
                let offset = chunk.location.offset + CHUNK_HEADER_SIZE + (within as usize * sample_size) as u64;
                self.parsed.read_at(offset, &mut buf[written..written + bytes])?;
                written += bytes;
                pos += take;
            }
            chunk_idx += 1;
        }

        Ok(ReadInfo {
            bytes: written,
            samples: count,
        })
    }

    /// Next/previous non-empty sample of a variable-size stream.
    fn find_non_empty(&self, data: &StreamData, rel: i64, forward: bool) -> Option<i64> {
        let idx = data.chunk_for(rel);
        let found = if forward {
            data.samples[idx..].iter().find(|c| c.location.size > 0)
        } else {
            data.samples[..=idx.min(data.samples.len() - 1)]
                .iter()
                .rev()
                .find(|c| c.location.size > 0)
        };
        found.map(|c| data.start() + c.first)
    }
}

impl Stream for AviStream {
    fn info(&self) -> StreamInfo {
        let data = self.data();
        let mut info = data.header.to_info(data.length, &data.name);
        if data.header.sample_size == 0 && data.key_positions.len() as i64 == data.length {
            info.caps |= StreamCaps::ALL_KEYFRAMES;
        }
        info
    }

    fn read_format(&self, _pos: i64) -> Result<Vec<u8>> {
        Ok(self.data().format.clone())
    }

    fn read(&self, start: i64, samples: i64, buf: Option<&mut [u8]>) -> Result<ReadInfo> {
        let data = self.data();
        let rel = start - data.start();
        if rel < 0 || rel >= data.length {
            return Err(Error::bad_param(format!(
                "position {} outside stream [{}, {})",
                start,
                data.start(),
                data.start() + data.length
            )));
        }
        if samples < 1 {
            return Err(Error::bad_param(format!("cannot read {} samples", samples)));
        }

        if data.header.sample_size == 0 {
            self.read_variable(data, rel, buf)
        } else {
            self.read_fixed(data, rel, samples, buf)
        }
    }

    fn find_sample(&self, pos: i64, flags: FindFlags) -> Option<i64> {
        let data = self.data();
        if data.length == 0 {
            return None;
        }
        let start = data.start();
        let end = start + data.length;
        let forward = flags.contains(FindFlags::NEXT);

        if flags.contains(FindFlags::FORMAT) {
            // The format never changes inside one AVI stream.
            return if flags.contains(FindFlags::FROM_START) || (forward && pos <= start) || (!forward && pos >= start) {
                Some(start)
            } else {
                None
            };
        }

        if flags.contains(FindFlags::KEY) && data.header.sample_size == 0 {
            return search_positions(&data.key_positions, pos, flags);
        }

        let pos = if flags.contains(FindFlags::FROM_START) {
            start
        } else if forward {
            let p = pos.max(start);
            if p >= end {
                return None;
            }
            p
        } else {
            if pos < start {
                return None;
            }
            pos.min(end - 1)
        };

        if flags.contains(FindFlags::ANY) && data.header.sample_size == 0 {
            let forward = forward || flags.contains(FindFlags::FROM_START);
            return self.find_non_empty(data, pos - start, forward);
        }
        Some(pos)
    }

    fn read_data(&self, tag: FourCC) -> Result<Vec<u8>> {
        let data = self.data();
        let found = match tag {
            chunk_ids::STRD => data.handler_data.clone(),
            chunk_ids::STRN if !data.name.is_empty() => Some(data.name.as_bytes().to_vec()),
            _ => None,
        };
        found.ok_or_else(|| Error::NoData(format!("stream {} has no '{}' data", self.number, tag)))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

fn missing(what: &str) -> impl FnOnce(Error) -> Error + '_ {
    move |e| match e {
        Error::NotFound(tag) => Error::bad_format(format!("{}: no '{}' chunk", what, tag)),
        other => other,
    }
}

fn truncated(what: &str) -> Error {
    Error::FileRead(Arc::new(io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("{} extends past the end of the file", what),
    )))
}

fn parse(source: Box<dyn MediaSource>, config: &Config) -> Result<Parsed> {
    let mut reader = ChunkReader::new(source)?;
    let file_len = reader.source_len()?;
    reader.seek_to(0)?;

    // 1. RIFF / "AVI "
    if file_len < 12 {
        return Err(Error::bad_format("file too short for a RIFF header"));
    }
    let riff = reader.read_chunk_header()?;
    if riff.id != chunk_ids::RIFF {
        return Err(Error::bad_format(format!("not a RIFF file (found '{}')", riff.id)));
    }
    let form = reader.read_fourcc()?;
    if form != chunk_ids::AVI {
        return Err(Error::bad_format(format!("RIFF form '{}' is not AVI", form)));
    }
    let riff_end = riff.end().min(file_len);

    // 2. Main header
    let hdrl = reader.seek_to_list(chunk_ids::HDRL, riff_end).map_err(missing("header list"))?;
    let hdrl_end = hdrl.end().min(riff_end);
    let avih = reader.seek_to_chunk(chunk_ids::AVIH, hdrl_end).map_err(missing("header list"))?;
    let header = MainHeader::parse(&reader.read_chunk_data(&avih)?)?;

    debug!(
        width = header.width,
        height = header.height,
        streams = header.streams,
        frames = header.total_frames,
        fps = header.frame_rate(),
        "AVI main header"
    );

    if header.streams == 0 || header.streams > config.max_streams {
        return Err(Error::bad_format(format!(
            "declared stream count {} outside 1..={}",
            header.streams, config.max_streams
        )));
    }

    // 3. Stream lists
    let mut streams = Vec::with_capacity(header.streams as usize);
    for n in 0..header.streams {
        let what = format!("stream {}", n);
        let strl = reader.seek_to_list(chunk_ids::STRL, hdrl_end).map_err(missing(&what))?;
        let strl_end = strl.end().min(hdrl_end);

        let strh = reader.seek_to_chunk(chunk_ids::STRH, strl_end).map_err(missing(&what))?;
        let stream_header = StreamHeader::parse(&reader.read_chunk_data(&strh)?)?;
        let strf = reader.seek_to_chunk(chunk_ids::STRF, strl_end).map_err(missing(&what))?;
        let format = reader.read_chunk_data(&strf)?;

        let mut handler_data = None;
        let mut name = String::new();
        while reader.position() + CHUNK_HEADER_SIZE <= strl_end {
            let chunk = reader.read_chunk_header()?;
            match chunk.id {
                chunk_ids::STRD => handler_data = Some(reader.read_chunk_data(&chunk)?),
                chunk_ids::STRN => {
                    let raw = reader.read_chunk_data(&chunk)?;
                    name = String::from_utf8_lossy(&raw).trim_end_matches('\0').to_string();
                }
                _ => reader.skip_payload(padded(chunk.size as u64))?,
            }
        }

        debug!(
            stream = n,
            kind = %stream_header.stream_type.to_fourcc(),
            handler = %stream_header.handler,
            rate = stream_header.rate,
            scale = stream_header.scale,
            length = stream_header.length,
            sample_size = stream_header.sample_size,
            "stream header"
        );

        streams.push((stream_header, format, handler_data, name));
        reader.seek_to(strl.padded_end())?;
    }

    // 4. Movie data
    reader.seek_to(hdrl.padded_end())?;
    let movi = reader.seek_to_list(chunk_ids::MOVI, riff_end).map_err(missing("file"))?;
    let movie_base = movi.offset - 4;
    let mut movi_end = movi.end();
    if movi_end > file_len {
        if !config.recover_truncated {
            return Err(truncated("movie data"));
        }
        warn!(
            declared = movi_end,
            actual = file_len,
            "movie data truncated, recovering from file length"
        );
        movi_end = file_len;
    }
    debug!(base = movie_base, end = movi_end, "movie data");

    // 5. Index, wherever it sits after the header list
    reader.seek_to(hdrl.padded_end())?;
    let raw = match reader.seek_to_chunk(chunk_ids::IDX1, riff_end) {
        Ok(idx1) => {
            let available = idx1.end().min(file_len) - idx1.offset;
            let mut data = vec![0u8; available as usize];
            reader.read_payload(available, &mut data)?;
            crate::chunks::parse_index(&data)
        }
        Err(e @ Error::NotFound(_)) | Err(e @ Error::FileRead(_)) => {
            debug!(error = %e, "no idx1 chunk, scanning movie data");
            scan_movie(&mut reader, &movi, movi_end, movie_base)?
        }
        Err(e) => return Err(e),
    };
    debug!(entries = raw.len(), "raw index");

    let index = IndexTable::build(&raw, streams.len(), config.index_policy)?;
    let absolute = offsets_are_absolute(&mut reader, &raw, movie_base, file_len)?;
    if absolute {
        debug!("index uses absolute offsets");
    }

    let mut stream_data = Vec::with_capacity(streams.len());
    for (n, (stream_header, format, handler_data, name)) in streams.into_iter().enumerate() {
        let entries = index.lookup(n)?;
        let mut data = StreamData {
            header: stream_header,
            format,
            handler_data,
            name,
            locations: Vec::with_capacity(entries.len()),
            samples: Vec::with_capacity(entries.len()),
            key_positions: Vec::new(),
            length: 0,
        };
        resolve_entries(&mut data, entries, absolute, movie_base, movi_end, config)?;
        trace!(stream = n, samples = data.length, keys = data.key_positions.len(), "resolved stream");
        stream_data.push(data);
    }

    let info = file_info(&header, &stream_data);
    Ok(Parsed {
        source: Mutex::new(reader),
        header,
        streams: stream_data,
        index,
        movie_base,
        info,
    })
}

/// Rebuild a flat index by walking the `movi` list.
fn scan_movie(
    reader: &mut ChunkReader<Box<dyn MediaSource>>,
    movi: &ChunkHeader,
    movi_end: u64,
    movie_base: u64,
) -> Result<Vec<IndexEntry>> {
    reader.seek_to(movi.offset)?;
    let mut entries = Vec::new();
    while reader.position() + CHUNK_HEADER_SIZE <= movi_end {
        let chunk = reader.read_chunk_header()?;
        let offset = (chunk.offset - CHUNK_HEADER_SIZE - movie_base) as u32;
        if chunk.id == chunk_ids::LIST && chunk.size >= 4 {
            // Descend into `rec ` groups; their children follow inline.
            let list_type = reader.read_fourcc()?;
            entries.push(IndexEntry {
                chunk_id: list_type,
                flags: IndexFlags::LIST,
                offset,
                size: chunk.size,
            });
            continue;
        }
        entries.push(IndexEntry {
            chunk_id: chunk.id,
            flags: IndexFlags::KEYFRAME,
            offset,
            size: chunk.size,
        });
        reader.skip_payload(padded(chunk.size as u64))?;
    }
    Ok(entries)
}

/// Whether index offsets are absolute file offsets rather than relative
/// to the `movi` tag, decided by probing the first sample entry.
fn offsets_are_absolute(
    reader: &mut ChunkReader<Box<dyn MediaSource>>,
    raw: &[IndexEntry],
    movie_base: u64,
    file_len: u64,
) -> Result<bool> {
    let first = raw
        .iter()
        .find(|e| !e.flags.contains(IndexFlags::LIST) && e.stream_number().is_some());
    let Some(first) = first else {
        return Ok(false);
    };

    let mut tag_at = |pos: u64| -> Result<Option<FourCC>> {
        if pos + CHUNK_HEADER_SIZE > file_len {
            return Ok(None);
        }
        reader.seek_to(pos)?;
        reader.read_fourcc().map(Some)
    };

    if tag_at(movie_base + first.offset as u64)? == Some(first.chunk_id) {
        return Ok(false);
    }
    Ok(tag_at(first.offset as u64)? == Some(first.chunk_id))
}

fn resolve_entries(
    data: &mut StreamData,
    entries: &[IndexEntry],
    absolute: bool,
    movie_base: u64,
    movi_end: u64,
    config: &Config,
) -> Result<()> {
    let sample_size = data.header.sample_size as i64;
    let start = data.start();
    let mut next = 0i64;
    let mut dropped = 0usize;

    for entry in entries {
        let offset = if absolute {
            entry.offset as u64
        } else {
            movie_base + entry.offset as u64
        };

        if offset + CHUNK_HEADER_SIZE > movi_end {
            dropped += 1;
            data.locations.push(None);
            continue;
        }
        let available = movi_end - offset - CHUNK_HEADER_SIZE;
        let mut size = entry.size;
        if size as u64 > available {
            if !config.recover_truncated {
                return Err(truncated("sample chunk"));
            }
            size = available as u32;
        }

        let location = Location { offset, size };
        data.locations.push(Some(location));

        if entry.flags.contains(IndexFlags::NO_TIME) {
            continue;
        }

        let count = if sample_size > 0 {
            size as i64 / sample_size
        } else {
            1
        };
        let key = sample_size > 0 || entry.is_keyframe();
        if key && count > 0 {
            data.key_positions.push(start + next);
        }
        data.samples.push(SampleChunk {
            location,
            first: next,
            count,
        });
        next += count;
    }

    if dropped > 0 {
        warn!(dropped, "index entries point past the movie data");
    }
    data.length = next;
    Ok(())
}

fn file_info(header: &MainHeader, streams: &[StreamData]) -> FileInfo {
    let base = streams
        .iter()
        .find(|s| s.header.stream_type == StreamType::Video)
        .or_else(|| streams.first());

    let (scale, rate, length) = base
        .map(|s| (s.header.scale, s.header.rate, s.length))
        .unwrap_or_default();

    let (mut width, mut height) = (header.width, header.height);
    if width == 0 || height == 0 {
        if let Some(video) = streams.iter().find(|s| s.header.stream_type == StreamType::Video) {
            width = video.header.frame.width().max(0) as u32;
            height = video.header.frame.height().max(0) as u32;
        }
    }

    FileInfo {
        max_bytes_per_sec: header.max_bytes_per_sec,
        flags: header.flags,
        caps: StreamCaps::CAN_READ,
        streams: streams.len() as u32,
        suggested_buffer_size: header.suggested_buffer_size,
        width,
        height,
        scale,
        rate,
        length,
        edit_count: 0,
        file_type: "AVI File".to_string(),
    }
}
