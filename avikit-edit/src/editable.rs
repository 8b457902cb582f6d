//! Editable streams
//!
//! An [`EditableStream`] is a stream whose samples come from a table of
//! segments over other streams. Cut, copy and paste only rewrite the
//! table; sample data is read from the sources on demand.
//!
//! Splicing compressed video anywhere but on a key frame breaks the
//! codec's dependency chain. Once that happens the stream switches to
//! serving decoded rasters, decoding each source through a
//! [`FramePipeline`].

use std::any::Any;
use std::sync::Arc;

use avikit_codec::{CodecRegistry, FramePipeline};
use avikit_core::stream::search_positions;
use avikit_core::{
    BitmapInfo, Config, Error, FindFlags, FourCC, ReadInfo, Result, Stream, StreamCaps,
    StreamFlags, StreamHandle, StreamInfo, StreamType,
};
use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::segment::{same_stream, Segment, SegmentTable};

#[derive(Clone)]
struct EditState {
    info: StreamInfo,
    table: SegmentTable,
    /// Samples are served as decoded rasters.
    decompress: bool,
    /// Raster every sample decodes to while `decompress` is set.
    raster: Option<BitmapInfo>,
}

/// Everything a paste needs from its source, captured up front so the
/// destination can be locked afterwards (the source may be the
/// destination itself).
struct PasteSource {
    info: StreamInfo,
    format: Vec<u8>,
    segments: Vec<Segment>,
    decompress: bool,
    raster: Option<BitmapInfo>,
    /// A key frame sits exactly at the first pasted sample.
    key_aligned: bool,
}

impl PasteSource {
    fn length(&self) -> i64 {
        self.segments.iter().map(|s| s.length).sum()
    }

    fn from_stream(source: &StreamHandle, start: i64, end: i64) -> Result<Self> {
        if let Some(edit) = source.as_any().downcast_ref::<EditableStream>() {
            return edit.state.read().snapshot(start, end);
        }

        let info = source.info();
        check_range(&info, start, end)?;
        let (format, segments) = if end > start {
            (
                source.read_format(start)?,
                vec![Segment::new(source.clone(), start, end - start)],
            )
        } else {
            (Vec::new(), Vec::new())
        };
        let key_aligned =
            !info.is_video() || source.find_sample(start, FindFlags::PREV | FindFlags::KEY) == Some(start);

        Ok(PasteSource {
            info,
            format,
            segments,
            decompress: false,
            raster: None,
            key_aligned,
        })
    }
}

fn check_range(info: &StreamInfo, start: i64, end: i64) -> Result<()> {
    if start < info.start || end > info.end() || start > end {
        return Err(Error::bad_param(format!(
            "source range [{}, {}) outside [{}, {})",
            start,
            end,
            info.start,
            info.end()
        )));
    }
    Ok(())
}

/// Top-down RGB raster matching a video source's dimensions.
fn default_raster(source: &StreamHandle, pos: i64, bit_count: u16) -> Result<BitmapInfo> {
    let native = BitmapInfo::parse(&source.read_format(pos)?)?;
    Ok(BitmapInfo::rgb(native.width, -(native.abs_height() as i32), bit_count))
}

impl EditState {
    fn empty(growth: usize) -> Self {
        EditState {
            info: StreamInfo::default(),
            table: SegmentTable::new(0, growth),
            decompress: false,
            raster: None,
        }
    }

    fn is_decoding_video(&self) -> bool {
        self.decompress && self.info.is_video()
    }

    fn format_at(&self, pos: i64) -> Result<Vec<u8>> {
        if let (true, Some(raster)) = (self.decompress, &self.raster) {
            return Ok(raster.to_bytes());
        }
        if self.table.is_empty() {
            return Err(Error::NoData("edited stream is empty".into()));
        }
        let pos = pos.clamp(self.table.start, self.table.end() - 1);
        let locus = self
            .table
            .locate(pos)
            .ok_or_else(|| Error::bad_param(format!("position {} outside stream", pos)))?;
        let segment = &self.table.segments[locus.index];
        segment
            .source
            .read_format(segment.start + (pos - locus.logical_start))
    }

    fn snapshot(&self, start: i64, end: i64) -> Result<PasteSource> {
        let mut info = self.info.clone();
        info.start = self.table.start;
        info.length = self.table.total_length();
        check_range(&info, start, end)?;

        let key_aligned = !info.is_video()
            || self.decompress
            || self.find(start, FindFlags::PREV | FindFlags::KEY) == Some(start);
        let format = if end > start { self.format_at(start)? } else { Vec::new() };

        Ok(PasteSource {
            info,
            format,
            segments: self.table.slice(start, end),
            decompress: self.decompress,
            raster: self.raster.clone(),
            key_aligned,
        })
    }

    /// Search through the segments, asking each source in its own
    /// coordinates.
    fn find(&self, pos: i64, flags: FindFlags) -> Option<i64> {
        let table = &self.table;
        if table.is_empty() {
            return None;
        }
        let kind = flags & (FindFlags::KEY | FindFlags::ANY);
        let starts = table.logical_starts();

        if flags.intersects(FindFlags::NEXT | FindFlags::FROM_START) {
            let pos = if flags.contains(FindFlags::FROM_START) {
                table.start
            } else {
                pos.max(table.start)
            };
            let locus = table.locate(pos)?;
            for i in locus.index..table.len() {
                let segment = &table.segments[i];
                let from = if i == locus.index {
                    segment.start + (pos - starts[i])
                } else {
                    segment.start
                };
                if let Some(found) = segment.source.find_sample(from, kind | FindFlags::NEXT) {
                    if found >= from && found < segment.end() {
                        return Some(starts[i] + found - segment.start);
                    }
                }
            }
            None
        } else {
            if pos < table.start {
                return None;
            }
            let pos = pos.min(table.end() - 1);
            let locus = table.locate(pos)?;
            for i in (0..=locus.index).rev() {
                let segment = &table.segments[i];
                let from = if i == locus.index {
                    segment.start + (pos - starts[i])
                } else {
                    segment.end() - 1
                };
                if let Some(found) = segment.source.find_sample(from, kind | FindFlags::PREV) {
                    if found >= segment.start && found <= from {
                        return Some(starts[i] + found - segment.start);
                    }
                }
            }
            None
        }
    }

    /// Positions where the source, and with it the format, changes.
    fn format_positions(&self) -> Vec<i64> {
        let starts = self.table.logical_starts();
        self.table
            .segments
            .iter()
            .enumerate()
            .filter(|(i, s)| *i == 0 || !s.same_source(&self.table.segments[i - 1]))
            .map(|(i, _)| starts[i])
            .collect()
    }

    /// Clamp `pos` to the stream in the search direction; used when every
    /// sample matches.
    fn clamp_search(&self, pos: i64, flags: FindFlags) -> Option<i64> {
        let (start, end) = (self.table.start, self.table.end());
        if start == end {
            return None;
        }
        if flags.contains(FindFlags::FROM_START) {
            Some(start)
        } else if flags.contains(FindFlags::NEXT) {
            let pos = pos.max(start);
            (pos < end).then_some(pos)
        } else {
            (pos >= start).then(|| pos.min(end - 1))
        }
    }

    fn sync_length(&mut self) {
        self.info.start = self.table.start;
        self.info.length = self.table.total_length();
    }
}

struct DecodeCache {
    source: StreamHandle,
    pipeline: FramePipeline,
}

/// A stream assembled from segments of other streams.
pub struct EditableStream {
    state: RwLock<EditState>,
    /// Decoder for the most recently decoded source.
    decoder: Mutex<Option<DecodeCache>>,
    registry: Arc<CodecRegistry>,
    config: Config,
}

impl EditableStream {
    /// An empty stream; the first paste decides its type.
    pub fn new(registry: Arc<CodecRegistry>, config: Config) -> Self {
        EditableStream {
            state: RwLock::new(EditState::empty(config.segment_growth)),
            decoder: Mutex::new(None),
            registry,
            config,
        }
    }

    /// An editable stream covering all of `source`.
    pub fn from_stream(source: &StreamHandle, registry: Arc<CodecRegistry>, config: Config) -> Result<Self> {
        let stream = EditableStream::new(registry, config);
        let info = source.info();
        stream.paste(info.start, source, info.start, info.end())?;
        Ok(stream)
    }

    fn empty_like(&self) -> Self {
        EditableStream::new(Arc::clone(&self.registry), self.config.clone())
    }

    fn invalidate_decoder(&self) {
        *self.decoder.lock() = None;
    }

    /// Insert `source[start, end)` at logical position `at`.
    ///
    /// `at` may be anywhere inside the stream or exactly at its end. An
    /// empty stream takes over the source's description. Pasting another
    /// editable stream copies its segments rather than referencing it.
    pub fn paste(&self, at: i64, source: &StreamHandle, start: i64, end: i64) -> Result<()> {
        let src = PasteSource::from_stream(source, start, end)?;
        let mut state = self.state.write();
        let mut next = state.clone();
        self.paste_into(&mut next, at, src)?;
        *state = next;
        drop(state);
        self.invalidate_decoder();
        Ok(())
    }

    fn paste_into(&self, state: &mut EditState, at: i64, src: PasteSource) -> Result<()> {
        if at < 0 {
            return Err(Error::bad_param(format!("cannot paste at {}", at)));
        }

        let empty = state.info.stream_type.is_unset();
        if empty {
            state.info = StreamInfo {
                start: at,
                length: 0,
                caps: StreamCaps::CAN_READ | StreamCaps::CAN_WRITE,
                flags: src.info.flags - StreamFlags::FORMAT_CHANGES,
                edit_count: 0,
                format_change_count: 0,
                ..src.info.clone()
            };
            state.table = SegmentTable::new(at, self.config.segment_growth);
            state.decompress = false;
            state.raster = None;
        } else {
            if at < state.table.start || at > state.table.end() {
                return Err(Error::bad_param(format!(
                    "paste at {} would leave a hole in [{}, {}]",
                    at,
                    state.table.start,
                    state.table.end()
                )));
            }
            if state.info.stream_type != src.info.stream_type {
                return Err(Error::unsupported(format!(
                    "cannot paste a '{}' stream into a '{}' stream",
                    src.info.stream_type.to_fourcc(),
                    state.info.stream_type.to_fourcc()
                )));
            }
        }

        let length = src.length();
        if length == 0 {
            return Ok(());
        }

        match state.info.stream_type {
            StreamType::Video => {
                let (dst, from) = (state.info.frame, src.info.frame);
                if dst.width() != from.width() || dst.height() != from.height() {
                    return Err(Error::unsupported(format!(
                        "frame size {}x{} does not match {}x{}",
                        from.width(),
                        from.height(),
                        dst.width(),
                        dst.height()
                    )));
                }
                self.check_decompression(state, at, &src)?;
            }
            StreamType::Audio => {
                if !state.table.is_empty() && state.format_at(state.table.start)? != src.format {
                    return Err(Error::unsupported("audio formats differ"));
                }
            }
            other => {
                return Err(Error::unsupported(format!(
                    "cannot edit '{}' streams",
                    other.to_fourcc()
                )));
            }
        }

        let index = state.table.split_at(at)?;
        let count = src.segments.len();
        state.table.reserve(count)?;
        let tail = state.table.segments.split_off(index);
        state.table.segments.extend(src.segments);
        state.table.segments.extend(tail);

        // Every adjacency touching the inserted run, including those
        // inside it when the source was flattened.
        let segments = &state.table.segments;
        let last = (index + count).min(segments.len().saturating_sub(1));
        let changes = (index.saturating_sub(1)..last)
            .filter(|&i| !segments[i].same_source(&segments[i + 1]))
            .count() as u32;
        if changes > 0 || src.info.flags.contains(StreamFlags::FORMAT_CHANGES) {
            state.info.flags |= StreamFlags::FORMAT_CHANGES;
            state.info.format_change_count += changes;
        }

        state.table.coalesce();
        state.sync_length();
        state.info.edit_count += 1;

        debug!(
            at,
            length,
            segments = state.table.len(),
            total = state.info.length,
            decompress = state.decompress,
            "paste"
        );
        Ok(())
    }

    /// Switch a video stream to decoded samples when the paste would
    /// splice compressed data off a key frame or mix formats.
    fn check_decompression(&self, state: &mut EditState, at: i64, src: &PasteSource) -> Result<()> {
        if state.decompress {
            return Ok(());
        }
        let at_key = at == state.table.end()
            || state.find(at, FindFlags::PREV | FindFlags::KEY) == Some(at);
        let format_differs =
            !state.table.is_empty() && state.format_at(state.table.start)? != src.format;

        if !(src.decompress || !src.key_aligned || !at_key || format_differs) {
            return Ok(());
        }

        let raster = match (&src.raster, src.decompress) {
            (Some(raster), true) => raster.clone(),
            _ => {
                let base = state
                    .table
                    .segments
                    .first()
                    .or_else(|| src.segments.first())
                    .ok_or_else(|| Error::bad_param("nothing to decode"))?;
                default_raster(&base.source, base.start, self.config.default_output_bit_count)?
            }
        };
        debug!(
            source_decompressed = src.decompress,
            source_key_aligned = src.key_aligned,
            at_key,
            format_differs,
            "edit requires decompression"
        );
        self.enable_decompression(state, raster);
        Ok(())
    }

    fn enable_decompression(&self, state: &mut EditState, raster: BitmapInfo) {
        state.decompress = true;
        state.info.handler = FourCC::NULL;
        state.info.suggested_buffer_size = raster.frame_size() as u32;
        state.raster = Some(raster);
    }

    /// Delete `[start, start + length)`, returning the removed range as a
    /// new stream when `want_copy` is set.
    ///
    /// The cut is all or nothing: without a copy the range must lie inside
    /// the stream; with a copy it is clamped to the stream first.
    pub fn cut(&self, start: i64, length: i64, want_copy: bool) -> Result<Option<EditableStream>> {
        let mut state = self.state.write();

        let (from, length, copy) = if want_copy {
            let (from, length) = clamp_range(&state, start, length)?;
            (from, length, Some(self.copy_range(&state, from, length)?))
        } else {
            if start < state.table.start || length < 0 || start + length > state.table.end() {
                return Err(Error::bad_param(format!(
                    "cut [{}, {}) outside [{}, {})",
                    start,
                    start + length,
                    state.table.start,
                    state.table.end()
                )));
            }
            (start, length, None)
        };
        if length == 0 {
            return Ok(copy);
        }

        let mut next = state.clone();
        let front_trimmed = next.table.delete(from, length);
        if front_trimmed && next.info.is_video() && !next.decompress {
            if let Some(first) = next.table.segments.first() {
                let raster = default_raster(&first.source, first.start, self.config.default_output_bit_count)?;
                self.enable_decompression(&mut next, raster);
            }
        }
        next.table.coalesce();
        next.sync_length();
        next.info.edit_count += 1;

        debug!(
            from,
            length,
            segments = next.table.len(),
            total = next.info.length,
            "cut"
        );
        *state = next;
        drop(state);
        self.invalidate_decoder();
        Ok(copy)
    }

    /// A new stream holding `[start, start + length)`, clamped to this
    /// stream's bounds.
    pub fn copy(&self, start: i64, length: i64) -> Result<EditableStream> {
        let state = self.state.read();
        let (from, length) = clamp_range(&state, start, length)?;
        self.copy_range(&state, from, length)
    }

    fn copy_range(&self, state: &EditState, from: i64, length: i64) -> Result<EditableStream> {
        let src = state.snapshot(from, from + length)?;
        let copy = self.empty_like();
        {
            let mut copy_state = copy.state.write();
            copy.paste_into(&mut copy_state, 0, src)?;
        }
        Ok(copy)
    }

    /// An independent stream with the same segments and description.
    /// Decoder state is not shared.
    pub fn clone_stream(&self) -> EditableStream {
        let state = self.state.read().clone();
        trace!(segments = state.table.len(), "clone");
        EditableStream {
            state: RwLock::new(state),
            decoder: Mutex::new(None),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }

    /// Update the descriptive fields of the stream: priority, language,
    /// start, rate, scale, quality, frame rectangle and name.
    pub fn set_info(&self, info: &StreamInfo) -> Result<()> {
        if info.scale == 0 || info.rate == 0 {
            return Err(Error::bad_param("rate and scale must be non-zero"));
        }
        let mut state = self.state.write();
        state.info.priority = info.priority;
        state.info.language = info.language;
        state.info.rate = info.rate;
        state.info.scale = info.scale;
        state.info.quality = info.quality;
        state.info.frame = info.frame;
        state.info.name = info.name.clone();
        state.table.start = info.start;
        state.sync_length();
        state.info.edit_count += 1;
        Ok(())
    }

    /// Current segments in logical order.
    pub fn segments(&self) -> Vec<Segment> {
        self.state.read().table.segments.clone()
    }

    /// Whether samples are served decoded.
    pub fn is_decompressed(&self) -> bool {
        self.state.read().decompress
    }

    fn read_decoded(&self, raster: &BitmapInfo, segment: &Segment, pos: i64, buf: Option<&mut [u8]>) -> Result<ReadInfo> {
        let needed = raster.frame_size();
        let Some(buf) = buf else {
            return Ok(ReadInfo { bytes: needed, samples: 1 });
        };
        if buf.len() < needed {
            return Err(Error::BufferTooSmall {
                needed,
                available: buf.len(),
            });
        }

        let mut cache = self.decoder.lock();
        let reuse = matches!(&*cache, Some(c) if same_stream(&c.source, &segment.source));
        if !reuse {
            let pipeline = FramePipeline::open(
                segment.source.clone(),
                Arc::clone(&self.registry),
                &self.config,
                Some(raster),
            )?;
            *cache = Some(DecodeCache {
                source: segment.source.clone(),
                pipeline,
            });
        }
        let entry = cache
            .as_mut()
            .ok_or_else(|| Error::BadHandle("decoder unavailable".into()))?;
        let frame = entry.pipeline.get_frame(pos)?;
        let n = needed.min(frame.len());
        buf[..n].copy_from_slice(&frame[..n]);
        Ok(ReadInfo { bytes: n, samples: 1 })
    }
}

fn clamp_range(state: &EditState, start: i64, length: i64) -> Result<(i64, i64)> {
    let (lo, hi) = (state.table.start, state.table.end());
    let (mut start, mut length) = (start, length);
    if start < lo {
        length -= lo - start;
        start = lo;
    }
    if start + length > hi {
        length = hi - start;
    }
    if start < 0 || length < 0 {
        return Err(Error::bad_param(format!(
            "range [{}, {}) lies outside [{}, {})",
            start,
            start + length,
            lo,
            hi
        )));
    }
    Ok((start, length))
}

impl Stream for EditableStream {
    fn info(&self) -> StreamInfo {
        let state = self.state.read();
        let mut info = state.info.clone();
        if state.is_decoding_video() {
            info.caps |= StreamCaps::ALL_KEYFRAMES;
        }
        info
    }

    fn read_format(&self, pos: i64) -> Result<Vec<u8>> {
        self.state.read().format_at(pos)
    }

    fn read(&self, start: i64, samples: i64, buf: Option<&mut [u8]>) -> Result<ReadInfo> {
        if samples < 1 {
            return Err(Error::bad_param(format!("cannot read {} samples", samples)));
        }
        let state = self.state.read();
        let locus = state.table.locate(start).ok_or_else(|| {
            Error::bad_param(format!(
                "position {} outside stream [{}, {})",
                start,
                state.table.start,
                state.table.end()
            ))
        })?;
        let segment = &state.table.segments[locus.index];
        let pos = segment.start + (start - locus.logical_start);

        if state.is_decoding_video() {
            let raster = state
                .raster
                .as_ref()
                .ok_or_else(|| Error::BadHandle("no decode raster".into()))?;
            return self.read_decoded(raster, segment, pos, buf);
        }
        segment.source.read(pos, samples.min(segment.end() - pos), buf)
    }

    fn find_sample(&self, pos: i64, flags: FindFlags) -> Option<i64> {
        let state = self.state.read();
        if flags.contains(FindFlags::FORMAT) {
            return search_positions(&state.format_positions(), pos, flags);
        }
        if state.is_decoding_video() {
            return state.clamp_search(pos, flags);
        }
        state.find(pos, flags)
    }

    fn read_data(&self, tag: FourCC) -> Result<Vec<u8>> {
        let state = self.state.read();
        match state.table.segments.first() {
            Some(segment) => segment.source.read_data(tag),
            None => Err(Error::NoData(format!("empty stream has no '{}' data", tag))),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avikit_core::{Rect, WaveFormat};

    /// Uncompressed video source: frame `i` is `width * height * 3` bytes
    /// of value `i`, key frames every `gop` frames.
    struct Video {
        width: i32,
        height: i32,
        length: i64,
        gop: i64,
    }

    impl Video {
        fn handle(length: i64, gop: i64) -> StreamHandle {
            Arc::new(Video {
                width: 4,
                height: 2,
                length,
                gop,
            })
        }

        fn format(&self) -> BitmapInfo {
            BitmapInfo::rgb(self.width, -self.height, 24)
        }
    }

    impl Stream for Video {
        fn info(&self) -> StreamInfo {
            StreamInfo {
                stream_type: StreamType::Video,
                handler: FourCC::new(*b"DIB "),
                scale: 1,
                rate: 25,
                length: self.length,
                frame: Rect::new(0, 0, self.width as i16, self.height as i16),
                ..Default::default()
            }
        }

        fn read_format(&self, _pos: i64) -> Result<Vec<u8>> {
            Ok(self.format().to_bytes())
        }

        fn read(&self, start: i64, _samples: i64, buf: Option<&mut [u8]>) -> Result<ReadInfo> {
            let size = self.format().frame_size();
            if let Some(buf) = buf {
                buf[..size].fill(start as u8);
            }
            Ok(ReadInfo { bytes: size, samples: 1 })
        }

        fn find_sample(&self, pos: i64, flags: FindFlags) -> Option<i64> {
            if pos < 0 || pos >= self.length {
                return None;
            }
            if !flags.contains(FindFlags::KEY) {
                return Some(pos);
            }
            let key = if flags.contains(FindFlags::NEXT) {
                (pos + self.gop - 1) / self.gop * self.gop
            } else {
                pos / self.gop * self.gop
            };
            (key < self.length).then_some(key)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    /// 8-bit mono PCM; sample `i` has value `i % 256`.
    struct Pcm {
        rate: u32,
        length: i64,
    }

    impl Stream for Pcm {
        fn info(&self) -> StreamInfo {
            StreamInfo {
                stream_type: StreamType::Audio,
                scale: 1,
                rate: self.rate,
                length: self.length,
                sample_size: 1,
                ..Default::default()
            }
        }

        fn read_format(&self, _pos: i64) -> Result<Vec<u8>> {
            Ok(WaveFormat::pcm(1, self.rate, 8).to_bytes())
        }

        fn read(&self, start: i64, samples: i64, buf: Option<&mut [u8]>) -> Result<ReadInfo> {
            let count = samples.min(self.length - start);
            if let Some(buf) = buf {
                let count = count.min(buf.len() as i64);
                for (i, b) in buf[..count as usize].iter_mut().enumerate() {
                    *b = (start + i as i64) as u8;
                }
                return Ok(ReadInfo { bytes: count as usize, samples: count });
            }
            Ok(ReadInfo { bytes: count as usize, samples: count })
        }

        fn find_sample(&self, pos: i64, _flags: FindFlags) -> Option<i64> {
            (pos >= 0 && pos < self.length).then_some(pos)
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    fn edit(source: &StreamHandle) -> EditableStream {
        EditableStream::from_stream(source, Arc::new(CodecRegistry::new()), Config::default()).unwrap()
    }

    fn coverage(stream: &EditableStream) -> Vec<(i64, i64)> {
        stream.segments().iter().map(|s| (s.start, s.length)).collect()
    }

    #[test]
    fn test_from_stream() {
        let source = Video::handle(20, 5);
        let stream = edit(&source);
        let info = stream.info();
        assert_eq!(info.length, 20);
        assert_eq!(info.stream_type, StreamType::Video);
        assert_eq!(info.edit_count, 1);
        assert_eq!(coverage(&stream), vec![(0, 20)]);
        assert!(!stream.is_decompressed());
    }

    #[test]
    fn test_cut_interior_splits() {
        let source = Video::handle(20, 5);
        let stream = edit(&source);
        let removed = stream.cut(5, 5, true).unwrap().unwrap();
        assert_eq!(coverage(&stream), vec![(0, 5), (10, 10)]);
        assert_eq!(stream.info().length, 15);
        assert_eq!(coverage(&removed), vec![(5, 5)]);
        assert_eq!(removed.info().length, 5);
        // Both cut points are key frames.
        assert!(!stream.is_decompressed());
        assert_eq!(Arc::strong_count(&source), 1 + 2 + 1);
    }

    #[test]
    fn test_cut_front_forces_decompression() {
        let source = Video::handle(20, 5);
        let stream = edit(&source);
        stream.cut(0, 3, false).unwrap();
        assert_eq!(coverage(&stream), vec![(3, 17)]);
        assert!(stream.is_decompressed());
        assert_eq!(stream.info().handler, FourCC::NULL);

        // Decoded frames come out of the pass-through pipeline.
        assert_eq!(stream.read_sample(0).unwrap(), vec![3u8; 24]);
        assert!(stream.is_key_frame(1));
    }

    #[test]
    fn test_cut_rejects_out_of_range_without_mutation() {
        let source = Video::handle(10, 5);
        let stream = edit(&source);
        assert!(matches!(stream.cut(8, 5, false), Err(Error::BadParam(_))));
        assert!(matches!(stream.cut(-1, 2, false), Err(Error::BadParam(_))));
        assert_eq!(coverage(&stream), vec![(0, 10)]);
        assert_eq!(stream.info().edit_count, 1);

        // With a copy the range is clamped instead.
        let removed = stream.cut(8, 5, true).unwrap().unwrap();
        assert_eq!(removed.info().length, 2);
        assert_eq!(stream.info().length, 8);
    }

    #[test]
    fn test_copy_clamps() {
        let source = Video::handle(10, 5);
        let stream = edit(&source);
        let copy = stream.copy(-3, 8).unwrap();
        assert_eq!(coverage(&copy), vec![(0, 5)]);
        let copy = stream.copy(5, 100).unwrap();
        assert_eq!(coverage(&copy), vec![(5, 5)]);
        assert!(matches!(stream.copy(12, 1), Err(Error::BadParam(_))));
    }

    #[test]
    fn test_copy_mid_gop_decompresses() {
        let source = Video::handle(10, 5);
        let stream = edit(&source);
        let copy = stream.copy(2, 4).unwrap();
        assert!(copy.is_decompressed());
        assert!(!stream.is_decompressed());
        assert_eq!(copy.read_sample(0).unwrap(), vec![2u8; 24]);
    }

    #[test]
    fn test_paste_rejects_hole_and_mismatches() {
        let video = Video::handle(10, 5);
        let stream = edit(&video);
        assert!(matches!(stream.paste(11, &video, 0, 5), Err(Error::BadParam(_))));
        assert!(matches!(stream.paste(-1, &video, 0, 5), Err(Error::BadParam(_))));
        assert!(matches!(stream.paste(0, &video, 5, 11), Err(Error::BadParam(_))));

        let audio: StreamHandle = Arc::new(Pcm { rate: 8000, length: 100 });
        assert!(matches!(stream.paste(0, &audio, 0, 10), Err(Error::Unsupported(_))));

        let wide: StreamHandle = Arc::new(Video {
            width: 8,
            height: 2,
            length: 10,
            gop: 5,
        });
        assert!(matches!(stream.paste(0, &wide, 0, 5), Err(Error::Unsupported(_))));
        assert_eq!(coverage(&stream), vec![(0, 10)]);
    }

    #[test]
    fn test_paste_at_end_and_format_changes() {
        let a = Video::handle(10, 5);
        let b = Video::handle(10, 5);
        let stream = edit(&a);
        stream.paste(10, &b, 0, 5).unwrap();
        let info = stream.info();
        assert_eq!(info.length, 15);
        assert!(info.flags.contains(StreamFlags::FORMAT_CHANGES));
        assert_eq!(info.format_change_count, 1);
        assert!(!stream.is_decompressed());
        assert_eq!(stream.find_sample(12, FindFlags::PREV | FindFlags::FORMAT), Some(10));
    }

    #[test]
    fn test_paste_inside_gop_decompresses() {
        let a = Video::handle(10, 5);
        let stream = edit(&a);
        stream.paste(3, &a, 0, 5).unwrap();
        assert!(stream.is_decompressed());
        assert_eq!(coverage(&stream), vec![(0, 3), (0, 5), (3, 7)]);
    }

    #[test]
    fn test_paste_from_mid_gop_source_decompresses() {
        let a = Video::handle(10, 5);
        let stream = edit(&a);
        stream.paste(5, &a, 1, 3).unwrap();
        assert!(stream.is_decompressed());
    }

    #[test]
    fn test_paste_flattens_editable_source() {
        let (a, b) = (Video::handle(10, 5), Video::handle(10, 5));
        let inner = edit(&a);
        inner.paste(10, &b, 0, 5).unwrap();
        let inner: StreamHandle = Arc::new(inner);

        let outer = edit(&b);
        outer.paste(10, &inner, 5, 15).unwrap();
        let segments = outer.segments();
        assert_eq!(segments.len(), 3);
        assert!(segments.iter().all(|s| !same_stream(&s.source, &inner)));
        assert!(same_stream(&segments[1].source, &a));
        assert_eq!((segments[1].start, segments[1].length), (5, 5));
        assert!(same_stream(&segments[2].source, &b));
        assert_eq!((segments[2].start, segments[2].length), (0, 5));
        assert_eq!(outer.info().format_change_count, 2);
    }

    #[test]
    fn test_paste_counts_boundaries_inside_flattened_run() {
        let (a, b, c) = (Video::handle(10, 5), Video::handle(10, 5), Video::handle(10, 5));
        let inner = edit(&a);
        inner.paste(10, &b, 0, 10).unwrap();
        let inner: StreamHandle = Arc::new(inner);

        let outer = edit(&c);
        outer.paste(10, &inner, 0, 20).unwrap();
        let segments = outer.segments();
        assert_eq!(segments.len(), 3);
        let boundaries = segments
            .windows(2)
            .filter(|pair| !pair[0].same_source(&pair[1]))
            .count() as u32;
        assert_eq!(boundaries, 2);
        assert_eq!(outer.info().format_change_count, boundaries);
        assert!(outer.info().flags.contains(StreamFlags::FORMAT_CHANGES));
    }

    #[test]
    fn test_paste_into_itself() {
        let a = Video::handle(10, 5);
        let stream = Arc::new(edit(&a));
        let handle: StreamHandle = stream.clone();
        stream.paste(10, &handle, 0, 10).unwrap();
        assert_eq!(coverage(&stream), vec![(0, 10), (0, 10)]);
        assert_eq!(stream.info().length, 20);
    }

    #[test]
    fn test_audio_paste_and_read() {
        let pcm: StreamHandle = Arc::new(Pcm { rate: 8000, length: 100 });
        let stream = edit(&pcm);
        stream.cut(10, 80, false).unwrap();
        stream.paste(10, &pcm, 50, 60).unwrap();
        assert_eq!(stream.info().length, 30);

        let mut buf = [0u8; 8];
        let got = stream.read(8, 8, Some(&mut buf)).unwrap();
        // The read stops at the segment boundary.
        assert_eq!(got.samples, 2);
        assert_eq!(&buf[..2], &[8, 9]);
        stream.read(10, 3, Some(&mut buf)).unwrap();
        assert_eq!(&buf[..3], &[50, 51, 52]);

        let other: StreamHandle = Arc::new(Pcm { rate: 22050, length: 100 });
        assert!(matches!(stream.paste(0, &other, 0, 10), Err(Error::Unsupported(_))));
    }

    #[test]
    fn test_clone_is_independent() {
        let a = Video::handle(10, 5);
        let stream = edit(&a);
        let clone = stream.clone_stream();
        assert_eq!(Arc::strong_count(&a), 3);
        clone.cut(0, 5, false).unwrap();
        assert_eq!(coverage(&stream), vec![(0, 10)]);
        assert_eq!(coverage(&clone), vec![(5, 5)]);
        drop(clone);
        assert_eq!(Arc::strong_count(&a), 2);
    }

    #[test]
    fn test_set_info() {
        let a = Video::handle(10, 5);
        let stream = edit(&a);
        let mut info = stream.info();
        info.start = 100;
        info.rate = 30;
        info.name = "edited".into();
        info.length = 999;
        stream.set_info(&info).unwrap();

        let now = stream.info();
        assert_eq!(now.start, 100);
        assert_eq!(now.rate, 30);
        assert_eq!(now.name, "edited");
        assert_eq!(now.length, 10);
        assert_eq!(now.edit_count, 2);
        assert_eq!(stream.read_sample(103).unwrap(), vec![3u8; 24]);

        info.scale = 0;
        assert!(matches!(stream.set_info(&info), Err(Error::BadParam(_))));
    }

    #[test]
    fn test_find_key_across_segments() {
        let (a, b) = (Video::handle(10, 5), Video::handle(10, 5));
        let stream = edit(&a);
        stream.paste(10, &b, 0, 10).unwrap();
        assert_eq!(stream.find_sample(12, FindFlags::PREV | FindFlags::KEY), Some(10));
        assert_eq!(stream.find_sample(16, FindFlags::NEXT | FindFlags::KEY), None);
        assert_eq!(stream.find_sample(6, FindFlags::NEXT | FindFlags::KEY), Some(10));
        assert_eq!(stream.find_sample(3, FindFlags::FROM_START | FindFlags::KEY), Some(0));
    }

    #[test]
    fn test_empty_stream() {
        let stream = EditableStream::new(Arc::new(CodecRegistry::new()), Config::default());
        assert!(stream.info().stream_type.is_unset());
        assert!(matches!(stream.read(0, 1, None), Err(Error::BadParam(_))));
        assert!(matches!(stream.read_format(0), Err(Error::NoData(_))));
        assert_eq!(stream.find_sample(0, FindFlags::NEXT | FindFlags::ANY), None);

        let a = Video::handle(10, 5);
        stream.paste(7, &a, 0, 5).unwrap();
        assert_eq!(stream.info().start, 7);
        assert_eq!(stream.read_sample(8).unwrap(), vec![1u8; 24]);
    }
}
