//! AVI writer
//!
//! Serialises streams into a new RIFF/AVI file: `hdrl`, a `JUNK` pad so
//! the movie data starts on a 2 KiB boundary, `movi`, then `idx1`. Sizes
//! and counts that are only known at the end are patched in
//! [`AviWriter::finalize`].

use std::fs::File;
use std::io::{self, BufWriter, Seek, SeekFrom, Write};
use std::path::Path;

use avikit_core::fourcc::chunk_ids;
use avikit_core::{BitmapInfo, Error, FourCC, Result, StreamHandle, StreamInfo, StreamType};
use byteorder::{LittleEndian, WriteBytesExt};
use tracing::debug;

use crate::chunks::{write_chunk, ChunkId, ChunkType, IndexEntry, IndexFlags};
use crate::types::{HeaderFlags, MainHeader, StreamHeader};

/// Map write-side I/O failures to [`Error::FileWrite`].
trait WriteResult<T> {
    fn or_write_err(self) -> Result<T>;
}

impl<T> WriteResult<T> for io::Result<T> {
    fn or_write_err(self) -> Result<T> {
        self.map_err(Error::write)
    }
}

/// Writer configuration
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Whether to write idx1
    pub write_index: bool,
    /// Alignment of the movie data list; 0 disables the JUNK pad
    pub movie_alignment: u64,
}

impl Default for WriterConfig {
    fn default() -> Self {
        WriterConfig {
            write_index: true,
            movie_alignment: 2048,
        }
    }
}

struct StreamState {
    header: StreamHeader,
    format: Vec<u8>,
    name: String,
    chunk_id: FourCC,
    /// Samples written (the strh length)
    samples: u64,
    chunks: u64,
    max_chunk: u32,
    /// File offset of this stream's strh payload
    strh_offset: u64,
}

/// AVI writer
pub struct AviWriter<W: Write + Seek> {
    writer: W,
    config: WriterConfig,
    streams: Vec<StreamState>,
    index_entries: Vec<IndexEntry>,
    avih_offset: u64,
    movi_offset: u64,
    header_written: bool,
    finalized: bool,
}

impl<W: Write + Seek> AviWriter<W> {
    pub fn new(writer: W, config: WriterConfig) -> Self {
        AviWriter {
            writer,
            config,
            streams: Vec::new(),
            index_entries: Vec::new(),
            avih_offset: 0,
            movi_offset: 0,
            header_written: false,
            finalized: false,
        }
    }

    /// Declare a stream; all streams must be added before the first sample.
    pub fn add_stream(&mut self, info: &StreamInfo, format: Vec<u8>) -> Result<u32> {
        if self.header_written {
            return Err(Error::unsupported("cannot add a stream after the header is written"));
        }
        let number = self.streams.len() as u16;

        let chunk_type = match info.stream_type {
            StreamType::Video => match BitmapInfo::parse(&format) {
                Ok(bitmap) if bitmap.is_uncompressed() => ChunkType::VideoUncompressed,
                _ => ChunkType::VideoCompressed,
            },
            StreamType::Audio => ChunkType::Audio,
            StreamType::Text => ChunkType::Text,
            _ => ChunkType::Unknown,
        };

        let mut header = StreamHeader::from_info(info);
        header.length = 0;
        header.suggested_buffer_size = 0;

        self.streams.push(StreamState {
            header,
            format,
            name: info.name.clone(),
            chunk_id: ChunkId::stream_chunk(number, chunk_type).fourcc,
            samples: 0,
            chunks: 0,
            max_chunk: 0,
            strh_offset: 0,
        });
        Ok(number as u32)
    }

    pub fn write_header(&mut self) -> Result<()> {
        if self.header_written {
            return Ok(());
        }
        if self.streams.is_empty() {
            return Err(Error::bad_param("no streams to write"));
        }

        // RIFF header with placeholder size
        self.writer.write_all(chunk_ids::RIFF.as_bytes()).or_write_err()?;
        self.writer.write_u32::<LittleEndian>(0).or_write_err()?;
        self.writer.write_all(chunk_ids::AVI.as_bytes()).or_write_err()?;

        self.write_hdrl()?;

        // JUNK pad so movi starts on the alignment boundary
        let current = self.writer.stream_position().or_write_err()?;
        if self.config.movie_alignment > 0 {
            let target = (current + 8).div_ceil(self.config.movie_alignment) * self.config.movie_alignment;
            let junk_size = target - current - 8;
            write_chunk(&mut self.writer, chunk_ids::JUNK, &vec![0u8; junk_size as usize]).or_write_err()?;
        }

        // Start movi LIST
        self.movi_offset = self.writer.stream_position().or_write_err()?;
        self.writer.write_all(chunk_ids::LIST.as_bytes()).or_write_err()?;
        self.writer.write_u32::<LittleEndian>(0).or_write_err()?;
        self.writer.write_all(chunk_ids::MOVI.as_bytes()).or_write_err()?;

        self.header_written = true;
        debug!(movi = self.movi_offset, streams = self.streams.len(), "AVI header written");
        Ok(())
    }

    fn main_header(&self) -> MainHeader {
        let video = self
            .streams
            .iter()
            .find(|s| s.header.stream_type == StreamType::Video);

        let (microseconds_per_frame, width, height, total_frames) = video
            .map(|s| {
                let usec = if s.header.rate > 0 {
                    (s.header.scale as u64 * 1_000_000 / s.header.rate as u64) as u32
                } else {
                    0
                };
                let (w, h) = if s.header.frame.width() > 0 && s.header.frame.height() > 0 {
                    (s.header.frame.width() as u32, s.header.frame.height() as u32)
                } else {
                    BitmapInfo::parse(&s.format)
                        .map(|b| (b.width.unsigned_abs(), b.abs_height()))
                        .unwrap_or((0, 0))
                };
                (usec, w, h, s.samples as u32)
            })
            .unwrap_or((0, 0, 0, 0));

        let mut flags = HeaderFlags::IS_INTERLEAVED;
        if self.config.write_index {
            flags |= HeaderFlags::HAS_INDEX;
        }

        MainHeader {
            microseconds_per_frame,
            max_bytes_per_sec: 0,
            padding_granularity: 0,
            flags,
            total_frames,
            initial_frames: 0,
            streams: self.streams.len() as u32,
            suggested_buffer_size: self.streams.iter().map(|s| s.max_chunk).max().unwrap_or(0),
            width,
            height,
        }
    }

    fn write_hdrl(&mut self) -> Result<()> {
        let hdrl_start = self.writer.stream_position().or_write_err()?;
        self.writer.write_all(chunk_ids::LIST.as_bytes()).or_write_err()?;
        self.writer.write_u32::<LittleEndian>(0).or_write_err()?;
        self.writer.write_all(chunk_ids::HDRL.as_bytes()).or_write_err()?;

        let mut avih = Vec::with_capacity(MainHeader::SIZE);
        self.main_header().write(&mut avih).or_write_err()?;
        self.avih_offset = self.writer.stream_position().or_write_err()? + 8;
        write_chunk(&mut self.writer, chunk_ids::AVIH, &avih).or_write_err()?;

        for i in 0..self.streams.len() {
            self.write_strl(i)?;
        }

        self.patch_list_size(hdrl_start)
    }

    fn write_strl(&mut self, stream: usize) -> Result<()> {
        let strl_start = self.writer.stream_position().or_write_err()?;
        self.writer.write_all(chunk_ids::LIST.as_bytes()).or_write_err()?;
        self.writer.write_u32::<LittleEndian>(0).or_write_err()?;
        self.writer.write_all(chunk_ids::STRL.as_bytes()).or_write_err()?;

        let state = &mut self.streams[stream];
        state.strh_offset = strl_start + 12 + 8;
        write_chunk(&mut self.writer, chunk_ids::STRH, &state.header.to_bytes()).or_write_err()?;
        write_chunk(&mut self.writer, chunk_ids::STRF, &state.format).or_write_err()?;
        if !state.name.is_empty() {
            let mut name = state.name.as_bytes().to_vec();
            name.push(0);
            write_chunk(&mut self.writer, chunk_ids::STRN, &name).or_write_err()?;
        }

        self.patch_list_size(strl_start)
    }

    /// Patch the size of a LIST started at `start` to end at the current
    /// position.
    fn patch_list_size(&mut self, start: u64) -> Result<()> {
        let end = self.writer.stream_position().or_write_err()?;
        self.patch_u32(start + 4, (end - start - 8) as u32)
    }

    fn patch_u32(&mut self, at: u64, value: u32) -> Result<()> {
        let current = self.writer.stream_position().or_write_err()?;
        self.writer.seek(SeekFrom::Start(at)).or_write_err()?;
        self.writer.write_u32::<LittleEndian>(value).or_write_err()?;
        self.writer.seek(SeekFrom::Start(current)).or_write_err()?;
        Ok(())
    }

    /// Write one chunk holding `samples` samples of a stream.
    pub fn write_chunk(&mut self, stream: u32, data: &[u8], keyframe: bool, samples: u64) -> Result<()> {
        if self.finalized {
            return Err(Error::BadHandle("writer already finalized".into()));
        }
        if !self.header_written {
            self.write_header()?;
        }
        let stream_idx = stream as usize;
        if stream_idx >= self.streams.len() {
            return Err(Error::bad_param(format!("no stream {}", stream)));
        }

        let chunk_id = self.streams[stream_idx].chunk_id;

        // Offset relative to the movi tag
        let current = self.writer.stream_position().or_write_err()?;
        let offset = (current - self.movi_offset - 8) as u32;

        write_chunk(&mut self.writer, chunk_id, data).or_write_err()?;

        if self.config.write_index {
            self.index_entries.push(IndexEntry {
                chunk_id,
                flags: if keyframe {
                    IndexFlags::KEYFRAME
                } else {
                    IndexFlags::empty()
                },
                offset,
                size: data.len() as u32,
            });
        }

        let state = &mut self.streams[stream_idx];
        state.samples += samples;
        state.chunks += 1;
        state.max_chunk = state.max_chunk.max(data.len() as u32);
        Ok(())
    }

    /// Write a video frame
    pub fn write_frame(&mut self, stream: u32, data: &[u8], keyframe: bool) -> Result<()> {
        self.write_chunk(stream, data, keyframe, 1)
    }

    /// Finalize the file
    pub fn finalize(&mut self) -> Result<()> {
        if self.finalized {
            return Ok(());
        }
        if !self.header_written {
            self.write_header()?;
        }

        self.patch_list_size(self.movi_offset)?;

        if self.config.write_index {
            let mut idx = Vec::with_capacity(self.index_entries.len() * IndexEntry::SIZE);
            for entry in &self.index_entries {
                entry.write(&mut idx).or_write_err()?;
            }
            write_chunk(&mut self.writer, chunk_ids::IDX1, &idx).or_write_err()?;
        }

        let file_end = self.writer.stream_position().or_write_err()?;
        self.patch_u32(4, (file_end - 8) as u32)?;

        let mut avih = Vec::with_capacity(MainHeader::SIZE);
        self.main_header().write(&mut avih).or_write_err()?;
        self.writer.seek(SeekFrom::Start(self.avih_offset)).or_write_err()?;
        self.writer.write_all(&avih).or_write_err()?;

        for i in 0..self.streams.len() {
            let state = &mut self.streams[i];
            state.header.length = state.samples as u32;
            state.header.suggested_buffer_size = state.max_chunk;
            let bytes = state.header.to_bytes();
            let at = state.strh_offset;
            self.writer.seek(SeekFrom::Start(at)).or_write_err()?;
            self.writer.write_all(&bytes).or_write_err()?;
        }

        self.writer.seek(SeekFrom::Start(file_end)).or_write_err()?;
        self.writer.flush().or_write_err()?;
        self.finalized = true;
        debug!(size = file_end, entries = self.index_entries.len(), "AVI finalized");
        Ok(())
    }

    /// Samples written to a stream so far.
    pub fn sample_count(&self, stream: u32) -> u64 {
        self.streams.get(stream as usize).map(|s| s.samples).unwrap_or(0)
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// Samples of a fixed-size stream written per chunk: one video frame's
/// worth when there is video, otherwise one second.
fn block_samples(info: &StreamInfo, video: Option<&StreamInfo>) -> i64 {
    let per_second = info.sample_rate();
    let block = match video {
        Some(v) if v.sample_rate() > 0.0 => (per_second / v.sample_rate()).ceil(),
        _ => per_second.ceil(),
    };
    (block as i64).max(1)
}

/// Write every sample of `streams` into `writer`, interleaved.
pub fn save_streams<W: Write + Seek>(writer: W, streams: &[StreamHandle]) -> Result<W> {
    let infos: Vec<StreamInfo> = streams.iter().map(|s| s.info()).collect();
    let video = infos.iter().find(|i| i.is_video()).cloned();

    let mut avi = AviWriter::new(writer, WriterConfig::default());
    for (stream, info) in streams.iter().zip(&infos) {
        avi.add_stream(info, stream.read_format(info.start)?)?;
    }
    avi.write_header()?;

    let mut cursors: Vec<i64> = infos.iter().map(|i| i.start).collect();
    let mut buf = Vec::new();
    loop {
        let mut progressed = false;
        for (n, (stream, info)) in streams.iter().zip(&infos).enumerate() {
            let pos = cursors[n];
            if pos >= info.end() {
                continue;
            }

            let wanted = if info.sample_size == 0 {
                1
            } else {
                block_samples(info, video.as_ref()).min(info.end() - pos)
            };
            let size = stream.read(pos, wanted, None)?;
            buf.resize(size.bytes, 0);
            let got = stream.read(pos, wanted, Some(&mut buf))?;
            if got.samples == 0 {
                cursors[n] = info.end();
                continue;
            }

            let key = info.sample_size != 0 || stream.is_key_frame(pos);
            avi.write_chunk(n as u32, &buf[..got.bytes], key, got.samples as u64)?;
            cursors[n] = pos + got.samples;
            progressed = true;
        }
        if !progressed {
            break;
        }
    }

    avi.finalize()?;
    Ok(avi.into_inner())
}

/// Create `path` and write `streams` into it.
pub fn save_to_path(path: &Path, streams: &[StreamHandle]) -> Result<()> {
    let file = File::create(path).or_write_err()?;
    let mut out = save_streams(BufWriter::new(file), streams)?;
    out.flush().or_write_err()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::AviFile;
    use avikit_core::{Config, Rect, WaveFormat};
    use std::io::Cursor;

    fn video_info() -> StreamInfo {
        StreamInfo {
            stream_type: StreamType::Video,
            handler: FourCC::new(*b"cvid"),
            scale: 1,
            rate: 25,
            frame: Rect::new(0, 0, 320, 240),
            ..Default::default()
        }
    }

    fn video_format() -> Vec<u8> {
        BitmapInfo {
            compression: FourCC::new(*b"cvid"),
            ..BitmapInfo::rgb(320, 240, 24)
        }
        .to_bytes()
    }

    #[test]
    fn test_add_stream_after_header_fails() {
        let mut avi = AviWriter::new(Cursor::new(Vec::new()), WriterConfig::default());
        avi.add_stream(&video_info(), video_format()).unwrap();
        avi.write_header().unwrap();
        assert!(avi.add_stream(&video_info(), video_format()).is_err());
    }

    #[test]
    fn test_movi_is_aligned() {
        let mut avi = AviWriter::new(Cursor::new(Vec::new()), WriterConfig::default());
        avi.add_stream(&video_info(), video_format()).unwrap();
        avi.write_header().unwrap();
        assert_eq!(avi.movi_offset % 2048, 0);
    }

    #[test]
    fn test_round_trip() {
        let audio = StreamInfo {
            stream_type: StreamType::Audio,
            scale: 1,
            rate: 8000,
            sample_size: 1,
            name: "mono".into(),
            ..Default::default()
        };

        let mut avi = AviWriter::new(Cursor::new(Vec::new()), WriterConfig::default());
        avi.add_stream(&video_info(), video_format()).unwrap();
        avi.add_stream(&audio, WaveFormat::pcm(1, 8000, 8).to_bytes()).unwrap();
        for i in 0..10u8 {
            avi.write_frame(0, &[i; 50], i == 0).unwrap();
            avi.write_chunk(1, &[i; 320], true, 320).unwrap();
        }
        avi.finalize().unwrap();
        assert_eq!(avi.sample_count(1), 3200);

        let bytes = avi.into_inner().into_inner();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"AVI ");

        let file = AviFile::from_reader(Cursor::new(bytes), Config::default()).unwrap();
        assert_eq!(file.header().unwrap().total_frames, 10);
        assert_eq!(file.header().unwrap().microseconds_per_frame, 40_000);
        assert_eq!(file.stream_info(0).unwrap().length, 10);
        assert_eq!(file.stream_info(0).unwrap().suggested_buffer_size, 50);
        assert_eq!(file.stream_info(1).unwrap().length, 3200);
        assert_eq!(file.index().unwrap().lookup(0).unwrap()[0].chunk_id, FourCC::new(*b"00dc"));
        assert_eq!(file.index().unwrap().lookup(1).unwrap()[0].chunk_id, FourCC::new(*b"01wb"));

        let audio = file.get_stream(Some(StreamType::Audio), 0).unwrap();
        assert_eq!(audio.info().name, "mono");
        let mut buf = vec![0u8; 400];
        let got = audio.read(300, 400, Some(&mut buf)).unwrap();
        assert_eq!(got.samples, 400);
        assert_eq!(&buf[..20], &[0u8; 20]);
        assert_eq!(&buf[20..340], &[1u8; 320][..]);
        assert_eq!(&buf[340..], &[2u8; 60][..]);
    }

    #[test]
    fn test_save_streams_copies_key_flags() {
        let mut avi = AviWriter::new(Cursor::new(Vec::new()), WriterConfig::default());
        avi.add_stream(&video_info(), video_format()).unwrap();
        for i in 0..6u8 {
            avi.write_frame(0, &[i; 7], i % 3 == 0).unwrap();
        }
        avi.finalize().unwrap();
        let source = AviFile::from_reader(Cursor::new(avi.into_inner().into_inner()), Config::default()).unwrap();

        let copy = save_streams(Cursor::new(Vec::new()), &source.streams().unwrap()).unwrap();
        let copy = AviFile::from_reader(Cursor::new(copy.into_inner()), Config::default()).unwrap();
        let stream = copy.get_stream(None, 0).unwrap();
        assert_eq!(stream.length(), 6);
        assert!(stream.is_key_frame(3));
        assert!(!stream.is_key_frame(4));
        assert_eq!(stream.read_sample(5).unwrap(), vec![5; 7]);
        assert_eq!(copy.stream_format(0).unwrap(), video_format());
    }
}
