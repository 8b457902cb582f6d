//! AVI reader tests.
//!
//! Files are assembled in memory chunk by chunk so that layouts the writer
//! never produces (index before movie data, truncated files, undeclared
//! streams) can be exercised.

use std::io::{Cursor, Write};
use std::sync::Arc;

use avikit_avi::chunks::write_chunk;
use avikit_avi::{
    AviFile, Container, IndexEntry, IndexFlags, MainHeader, OpenMode, Persist, ReaderState,
    StreamHeader,
};
use avikit_core::fourcc::chunk_ids;
use avikit_core::{
    BitmapInfo, Config, Error, FindFlags, FourCC, IndexPolicy, Rect, Stream, StreamFlags,
    StreamType, WaveFormat,
};
use parking_lot::Mutex;
use proptest::prelude::*;

// =============================================================================
// Builders
// =============================================================================

fn chunk(id: FourCC, data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    write_chunk(&mut out, id, data).unwrap();
    out
}

fn list(list_type: FourCC, body: &[u8]) -> Vec<u8> {
    let mut payload = list_type.as_bytes().to_vec();
    payload.extend_from_slice(body);
    chunk(chunk_ids::LIST, &payload)
}

struct FileBuilder {
    headers: Vec<(StreamHeader, Vec<u8>)>,
    /// (stream, payload, key)
    samples: Vec<(u16, Vec<u8>, bool)>,
    index_first: bool,
}

impl FileBuilder {
    fn new() -> Self {
        FileBuilder {
            headers: Vec::new(),
            samples: Vec::new(),
            index_first: false,
        }
    }

    fn stream(mut self, header: StreamHeader, format: Vec<u8>) -> Self {
        self.headers.push((header, format));
        self
    }

    fn sample(mut self, stream: u16, payload: Vec<u8>, key: bool) -> Self {
        self.samples.push((stream, payload, key));
        self
    }

    fn tag(&self, stream: u16) -> FourCC {
        let suffix = match self.headers.get(stream as usize).map(|h| h.0.stream_type) {
            Some(StreamType::Audio) => *b"wb",
            _ => *b"dc",
        };
        FourCC([b'0' + (stream / 10) as u8, b'0' + (stream % 10) as u8, suffix[0], suffix[1]])
    }

    fn build(&self) -> Vec<u8> {
        let main = MainHeader {
            streams: self.headers.len() as u32,
            width: 64,
            height: 48,
            ..Default::default()
        };
        let mut avih = Vec::new();
        main.write(&mut avih).unwrap();

        let mut hdrl = chunk(chunk_ids::AVIH, &avih);
        for (header, format) in &self.headers {
            let mut strl = chunk(chunk_ids::STRH, &header.to_bytes());
            strl.extend(chunk(chunk_ids::STRF, format));
            hdrl.extend(list(chunk_ids::STRL, &strl));
        }

        let mut movi = Vec::new();
        let mut idx = Vec::new();
        for (stream, payload, key) in &self.samples {
            let id = self.tag(*stream);
            IndexEntry {
                chunk_id: id,
                flags: if *key { IndexFlags::KEYFRAME } else { IndexFlags::empty() },
                offset: 4 + movi.len() as u32,
                size: payload.len() as u32,
            }
            .write(&mut idx)
            .unwrap();
            movi.extend(chunk(id, payload));
        }

        let mut body = chunk_ids::AVI.as_bytes().to_vec();
        body.extend(list(chunk_ids::HDRL, &hdrl));
        if self.index_first {
            body.extend(chunk(chunk_ids::IDX1, &idx));
            body.extend(list(chunk_ids::MOVI, &movi));
        } else {
            body.extend(list(chunk_ids::MOVI, &movi));
            body.extend(chunk(chunk_ids::IDX1, &idx));
        }
        chunk(chunk_ids::RIFF, &body)
    }
}

fn video_header(length: u32) -> StreamHeader {
    StreamHeader {
        stream_type: StreamType::Video,
        handler: FourCC::new(*b"cvid"),
        scale: 1,
        rate: 15,
        length,
        frame: Rect::new(0, 0, 64, 48),
        ..Default::default()
    }
}

fn audio_header(length: u32) -> StreamHeader {
    StreamHeader {
        stream_type: StreamType::Audio,
        handler: FourCC::NULL,
        scale: 1,
        rate: 11025,
        length,
        sample_size: 1,
        ..Default::default()
    }
}

fn cvid_format() -> Vec<u8> {
    BitmapInfo {
        compression: FourCC::new(*b"cvid"),
        ..BitmapInfo::rgb(64, 48, 24)
    }
    .to_bytes()
}

/// Ten video frames (key frame first) interleaved with ten audio chunks.
fn two_stream_example() -> FileBuilder {
    let mut builder = FileBuilder::new()
        .stream(video_header(10), cvid_format())
        .stream(audio_header(1100), WaveFormat::pcm(1, 11025, 8).to_bytes());
    for i in 0..10u8 {
        builder = builder
            .sample(0, vec![i; 20 + i as usize], i == 0)
            .sample(1, vec![0x80 + i; 110], true);
    }
    builder
}

fn open(bytes: Vec<u8>) -> AviFile {
    AviFile::from_reader(Cursor::new(bytes), Config::default()).unwrap()
}

// =============================================================================
// Example scenario
// =============================================================================

#[test]
fn test_two_stream_layout() {
    let avi = open(two_stream_example().build());

    assert_eq!(avi.stream_count().unwrap(), 2);
    assert_eq!(avi.stream_info(0).unwrap().stream_type.to_fourcc(), FourCC::new(*b"vids"));
    assert_eq!(avi.stream_info(0).unwrap().handler, FourCC::new(*b"cvid"));
    assert_eq!(avi.stream_info(1).unwrap().stream_type, StreamType::Audio);

    let video = avi.index().unwrap().lookup(0).unwrap();
    assert_eq!(video.len(), 10);
    assert!(video.windows(2).all(|w| w[0].offset < w[1].offset));
    assert!(video[0].is_keyframe());
    assert!(video[1..].iter().all(|e| !e.is_keyframe()));

    let info = avi.info().unwrap();
    assert_eq!(info.streams, 2);
    assert_eq!(info.rate, 15);
    assert_eq!(info.length, 10);
}

#[test]
fn test_video_stream_reads() {
    let avi = open(two_stream_example().build());
    let video = avi.get_stream(Some(StreamType::Video), 0).unwrap();

    assert_eq!(video.sample_size(4).unwrap(), 24);
    assert_eq!(video.read_sample(4).unwrap(), vec![4; 24]);
    assert_eq!(video.find_sample(7, FindFlags::PREV | FindFlags::KEY), Some(0));
    assert_eq!(video.find_sample(3, FindFlags::NEXT | FindFlags::ANY), Some(3));
    assert!(matches!(video.read(10, 1, None), Err(Error::BadParam(_))));

    let mut small = [0u8; 4];
    assert!(matches!(
        video.read(4, 1, Some(&mut small)),
        Err(Error::BufferTooSmall { needed: 24, .. })
    ));
}

#[test]
fn test_audio_reads_span_chunks() {
    let avi = open(two_stream_example().build());
    let audio = avi.get_stream(Some(StreamType::Audio), 0).unwrap();
    assert_eq!(audio.length(), 1100);

    let query = audio.read(100, 20, None).unwrap();
    assert_eq!((query.bytes, query.samples), (20, 20));

    let mut buf = vec![0u8; 20];
    audio.read(100, 20, Some(&mut buf)).unwrap();
    assert_eq!(&buf[..10], &[0x80; 10]);
    assert_eq!(&buf[10..], &[0x81; 10]);

    // Every audio position is a key position.
    assert!(audio.is_key_frame(555));
}

#[test]
fn test_readsample_record_and_index_bounds() {
    let avi = open(two_stream_example().build());
    let record = avi.read_sample(0, 2).unwrap();
    assert_eq!(&record[..4], b"00dc");
    assert_eq!(record.len(), 8 + 22);
    assert!(matches!(avi.read_sample(0, 10), Err(Error::BadParam(_))));
    assert!(matches!(avi.read_sample(2, 0), Err(Error::BadHandle(_))));
}

// =============================================================================
// Index layouts
// =============================================================================

#[test]
fn test_index_before_movie_data() {
    let mut builder = two_stream_example();
    builder.index_first = true;
    let avi = open(builder.build());
    let video = avi.get_stream(Some(StreamType::Video), 0).unwrap();
    assert_eq!(video.read_sample(9).unwrap(), vec![9; 29]);
}

#[test]
fn test_undeclared_stream_in_index() {
    let mut builder = two_stream_example();
    // The audio chunks stay in the index but their stream is not declared.
    builder.headers.pop();
    let bytes = builder.build();

    assert!(matches!(
        AviFile::from_reader(Cursor::new(bytes.clone()), Config::default()),
        Err(Error::BadFormat(_))
    ));

    let lenient = Config {
        index_policy: IndexPolicy::Lenient,
        ..Config::default()
    };
    let avi = AviFile::from_reader(Cursor::new(bytes), lenient).unwrap();
    assert_eq!(avi.stream_count().unwrap(), 1);
    assert_eq!(avi.index().unwrap().lookup(0).unwrap().len(), 10);
}

/// Collects formatted log output.
#[derive(Clone, Default)]
struct LogSink(Arc<Mutex<Vec<u8>>>);

impl Write for LogSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

#[test]
fn test_lost_index_rescans_and_logs_cause() {
    let mut bytes = two_stream_example().build();

    // Cut at the sixth video chunk; the trailing idx1 goes with it.
    let avi = open(bytes.clone());
    let base = avi.movie_base().unwrap() as usize;
    let sixth = avi.index().unwrap().lookup(0).unwrap()[5];
    bytes.truncate(base + sixth.offset as usize);

    let sink = LogSink::default();
    let writer = sink.clone();
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_ansi(false)
        .with_writer(move || writer.clone())
        .finish();
    let avi = tracing::subscriber::with_default(subscriber, || open(bytes));

    let video = avi.get_stream(Some(StreamType::Video), 0).unwrap();
    assert_eq!(video.length(), 5);
    assert_eq!(video.read_sample(4).unwrap(), vec![4; 24]);

    let logs = String::from_utf8(sink.0.lock().clone()).unwrap();
    let line = logs
        .lines()
        .find(|l| l.contains("no idx1 chunk"))
        .expect("fallback is logged");
    assert!(line.contains("error="), "{}", line);
}

#[test]
fn test_truncated_movie_data_recovered() {
    let mut builder = two_stream_example();
    builder.index_first = true;
    let mut bytes = builder.build();

    // Cut the file inside the sixth video frame (stream 0, sample 5).
    let avi = open(bytes.clone());
    let base = avi.movie_base().unwrap() as usize;
    let sixth = avi.index().unwrap().lookup(0).unwrap()[5];
    bytes.truncate(base + sixth.offset as usize + 8 + 10);

    let avi = open(bytes.clone());
    let video = avi.get_stream(Some(StreamType::Video), 0).unwrap();
    assert_eq!(video.length(), 6);
    assert_eq!(video.read_sample(5).unwrap(), vec![5; 10]);
    // The header still reports what was declared.
    assert_eq!(avi.stream_info(0).unwrap().length, 10);

    let audio = avi.get_stream(Some(StreamType::Audio), 0).unwrap();
    assert_eq!(audio.length(), 550);

    let strict = Config {
        recover_truncated: false,
        ..Config::default()
    };
    assert!(matches!(
        AviFile::from_reader(Cursor::new(bytes), strict),
        Err(Error::FileRead(_))
    ));
}

#[test]
fn test_not_riff() {
    let mut avi = AviFile::new(Cursor::new(b"this is not a riff file".to_vec()), Config::default());
    assert!(matches!(avi.open(), Err(Error::BadFormat(_))));
    assert_eq!(avi.state(), ReaderState::Failed);
}

// =============================================================================
// Files on disk
// =============================================================================

#[test]
fn test_open_path_and_save() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("clip.avi");
    std::fs::write(&path, two_stream_example().build()).unwrap();

    let avi = AviFile::open_path(&path, OpenMode::READ, Config::default()).unwrap();
    assert_eq!(avi.path().as_deref(), Some(path.as_path()));
    assert!(!avi.is_dirty());

    let copy_path = dir.path().join("copy.avi");
    avi.save(&copy_path).unwrap();

    let copy = AviFile::open_path(&copy_path, OpenMode::READ, Config::default()).unwrap();
    let video = copy.get_stream(Some(StreamType::Video), 0).unwrap();
    assert_eq!(video.length(), 10);
    assert!(video.is_key_frame(0));
    assert!(!video.is_key_frame(1));
    assert_eq!(video.read_sample(3).unwrap(), vec![3; 23]);
    let audio = copy.get_stream(Some(StreamType::Audio), 0).unwrap();
    assert_eq!(audio.length(), 1100);
}

#[test]
fn test_open_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let result = AviFile::open_path(dir.path().join("none.avi"), OpenMode::READ, Config::default());
    assert!(matches!(result, Err(Error::FileRead(_))));
}

// =============================================================================
// Properties
// =============================================================================

fn arb_header() -> impl Strategy<Value = StreamHeader> {
    (
        prop_oneof![Just(StreamType::Video), Just(StreamType::Audio), Just(StreamType::Text)],
        any::<[u8; 4]>(),
        any::<bool>(),
        any::<(u16, u16, u32)>(),
        (1u32..1000, 1u32..100_000, 0u32..1000, 0u32..100_000),
        any::<(u32, u32, u32)>(),
        any::<(i16, i16, i16, i16)>(),
    )
        .prop_map(
            |(stream_type, handler, disabled, (priority, language, initial_frames), (scale, rate, start, length), (buffer, quality, sample_size), (l, t, r, b))| {
                StreamHeader {
                    stream_type,
                    handler: FourCC(handler),
                    flags: if disabled { StreamFlags::DISABLED } else { StreamFlags::empty() },
                    priority,
                    language,
                    initial_frames,
                    scale,
                    rate,
                    start,
                    length,
                    suggested_buffer_size: buffer,
                    quality,
                    sample_size,
                    frame: Rect::new(l, t, r, b),
                }
            },
        )
}

proptest! {
    #[test]
    fn prop_stream_headers_round_trip(headers in prop::collection::vec(arb_header(), 1..=8)) {
        let mut builder = FileBuilder::new();
        for header in &headers {
            builder = builder.stream(header.clone(), vec![0; 16]);
        }
        let avi = open(builder.build());
        for (n, header) in headers.iter().enumerate() {
            prop_assert_eq!(&avi.stream_info(n).unwrap(), header);
        }
    }

    #[test]
    fn prop_index_partition_complete(owners in prop::collection::vec(0u16..4, 0..60)) {
        let mut builder = FileBuilder::new();
        for _ in 0..4 {
            builder = builder.stream(video_header(0), cvid_format());
        }
        for (i, owner) in owners.iter().enumerate() {
            builder = builder.sample(*owner, vec![i as u8; 1 + i % 5], i % 3 == 0);
        }
        let avi = open(builder.build());
        let index = avi.index().unwrap();

        for stream in 0..4u16 {
            let expected: Vec<usize> = owners
                .iter()
                .enumerate()
                .filter(|(_, o)| **o == stream)
                .map(|(i, _)| i)
                .collect();
            let entries = index.lookup(stream as usize).unwrap();
            prop_assert_eq!(entries.len(), expected.len());
            for (entry, i) in entries.iter().zip(&expected) {
                prop_assert_eq!(entry.size as usize, 1 + i % 5);
            }
            prop_assert!(entries.windows(2).all(|w| w[0].offset < w[1].offset));
        }
    }
}
