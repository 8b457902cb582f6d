//! Frame decode pipeline
//!
//! Produces decoded raster frames for arbitrary positions of a video
//! stream. Compressed video is usually differential, so a random seek
//! decodes forward from the nearest key frame; the last decoded frame is
//! cached so repeated and sequential access stays cheap.

use std::sync::Arc;

use avikit_core::{
    BitmapInfo, Config, Error, FindFlags, FourCC, Rect, Result, Stream, StreamHandle,
};
use tracing::{debug, trace};

use crate::dispatch::{Codec, CodecMode, CodecRegistry};

/// Tag under which a converter for uncompressed sources is looked up when
/// the source raster differs from the requested one.
pub const DIB: FourCC = FourCC(*b"DIB ");

enum Backend {
    /// The source already is the requested raster.
    PassThrough,
    Codec(Codec),
}

struct Decoder {
    input_format: BitmapInfo,
    output_format: BitmapInfo,
    backend: Backend,
    /// Reused compressed-sample buffer; only grows.
    input: Vec<u8>,
    output: Vec<u8>,
    /// Position whose decoded frame is in `output`.
    cached: Option<i64>,
}

impl Decoder {
    fn decode(&mut self, stream: &dyn Stream, pos: i64, marker: u8) -> Result<()> {
        self.cached = None;

        let size = stream.sample_size(pos)?;
        if size == 0 {
            // Dropped frame: the previous picture stays on screen.
            trace!(position = pos, "empty sample");
            self.cached = Some(pos);
            return Ok(());
        }
        if self.input.len() < size {
            self.input.resize(size, 0);
        }
        let got = stream.read(pos, 1, Some(&mut self.input[..size]))?;
        let data = &self.input[..got.bytes];
        let not_key_frame = data.first() == Some(&marker);

        match &mut self.backend {
            Backend::PassThrough => {
                let n = data.len().min(self.output.len());
                self.output[..n].copy_from_slice(&data[..n]);
            }
            Backend::Codec(codec) => codec.decompress(
                &self.input_format,
                data,
                &self.output_format,
                &mut self.output,
                not_key_frame,
            )?,
        }

        trace!(position = pos, bytes = got.bytes, not_key_frame, "decoded frame");
        self.cached = Some(pos);
        Ok(())
    }

    fn release(&mut self) -> Result<()> {
        self.cached = None;
        match &mut self.backend {
            Backend::PassThrough => Ok(()),
            Backend::Codec(codec) => codec.close(),
        }
    }
}

/// Same raster layout, so samples can be copied straight through.
fn same_raster(a: &BitmapInfo, b: &BitmapInfo) -> bool {
    a.width == b.width && a.height == b.height && a.bit_count == b.bit_count && a.planes == b.planes
}

/// Decodes frames of one video stream.
pub struct FramePipeline {
    stream: StreamHandle,
    registry: Arc<CodecRegistry>,
    not_key_frame_marker: u8,
    default_bit_count: u16,
    decoder: Option<Decoder>,
}

impl FramePipeline {
    /// Open a pipeline and negotiate `format` (or the default raster).
    pub fn open(
        stream: StreamHandle,
        registry: Arc<CodecRegistry>,
        config: &Config,
        format: Option<&BitmapInfo>,
    ) -> Result<Self> {
        let mut pipeline = FramePipeline {
            stream,
            registry,
            not_key_frame_marker: config.not_key_frame_marker,
            default_bit_count: config.default_output_bit_count,
            decoder: None,
        };
        pipeline.set_format(format, None)?;
        Ok(pipeline)
    }

    /// Choose the output raster and open a decoder for the source.
    ///
    /// Without a `format` the output is a top-down RGB raster of the
    /// source's size at the configured bit depth. Only single-plane,
    /// uncompressed outputs of the source's dimensions are accepted; a
    /// destination rectangle, if given, must match them too.
    pub fn set_format(&mut self, format: Option<&BitmapInfo>, dest: Option<Rect>) -> Result<()> {
        if let Some(mut old) = self.decoder.take() {
            old.release()?;
        }

        let info = self.stream.info();
        if !info.is_video() {
            return Err(Error::unsupported(format!(
                "cannot decode frames of a '{}' stream",
                info.stream_type.to_fourcc()
            )));
        }

        let input_format = BitmapInfo::parse(&self.stream.read_format(info.start)?)?;
        let output_format = match format {
            Some(format) => format.clone(),
            None => BitmapInfo::rgb(
                input_format.width,
                -(input_format.abs_height() as i32),
                self.default_bit_count,
            ),
        };

        if output_format.planes != 1 || !output_format.is_uncompressed() {
            return Err(Error::unsupported(format!(
                "output must be one uncompressed plane (planes {}, compression '{}')",
                output_format.planes, output_format.compression
            )));
        }
        if output_format.width != input_format.width
            || output_format.abs_height() != input_format.abs_height()
        {
            return Err(Error::unsupported(format!(
                "cannot stretch {}x{} to {}x{}",
                input_format.width,
                input_format.abs_height(),
                output_format.width,
                output_format.abs_height()
            )));
        }
        if let Some(rect) = dest {
            if rect.width() != output_format.width
                || rect.height() != output_format.abs_height() as i32
            {
                return Err(Error::unsupported(format!(
                    "destination {}x{} does not match the output raster",
                    rect.width(),
                    rect.height()
                )));
            }
        }

        let backend = if input_format.is_uncompressed() && same_raster(&input_format, &output_format) {
            Backend::PassThrough
        } else {
            let tag = if input_format.is_uncompressed() {
                DIB
            } else {
                input_format.compression
            };
            let mut codec = self.registry.open(tag, CodecMode::Decompress)?;
            codec.decompress_begin(&input_format, &output_format)?;
            Backend::Codec(codec)
        };

        debug!(
            compression = %input_format.compression,
            width = output_format.width,
            height = output_format.height,
            bit_count = output_format.bit_count,
            pass_through = matches!(backend, Backend::PassThrough),
            "frame pipeline configured"
        );

        self.decoder = Some(Decoder {
            output: vec![0u8; output_format.frame_size()],
            input_format,
            output_format,
            backend,
            input: Vec::new(),
            cached: None,
        });
        Ok(())
    }

    /// Decoded raster for `pos`.
    ///
    /// The slice is the pipeline's own output buffer and is overwritten by
    /// the next call.
    pub fn get_frame(&mut self, pos: i64) -> Result<&[u8]> {
        let info = self.stream.info();
        if !info.contains(pos) {
            return Err(Error::bad_param(format!(
                "frame {} outside stream [{}, {})",
                pos,
                info.start,
                info.end()
            )));
        }

        let marker = self.not_key_frame_marker;
        let stream = self.stream.as_ref();
        let decoder = self
            .decoder
            .as_mut()
            .ok_or_else(|| Error::BadHandle("frame pipeline has no output format".into()))?;

        match decoder.cached {
            Some(cached) if cached == pos => {
                trace!(position = pos, "frame cache hit");
            }
            Some(cached) if cached + 1 == pos => decoder.decode(stream, pos, marker)?,
            _ => {
                let key = stream
                    .find_sample(pos, FindFlags::PREV | FindFlags::KEY)
                    .filter(|&key| key <= pos)
                    .ok_or_else(|| {
                        Error::bad_format(format!("no key frame at or before frame {}", pos))
                    })?;
                debug!(position = pos, key_frame = key, frames = pos - key + 1, "seeking to key frame");
                for p in key..=pos {
                    decoder.decode(stream, p, marker)?;
                }
            }
        }
        Ok(&decoder.output)
    }

    pub fn stream(&self) -> &StreamHandle {
        &self.stream
    }

    pub fn output_format(&self) -> Option<&BitmapInfo> {
        self.decoder.as_ref().map(|d| &d.output_format)
    }

    pub fn cached_position(&self) -> Option<i64> {
        self.decoder.as_ref().and_then(|d| d.cached)
    }

    /// Release the decoder and buffers. Safe to call repeatedly.
    pub fn close(&mut self) -> Result<()> {
        match self.decoder.take() {
            Some(mut decoder) => decoder.release(),
            None => Ok(()),
        }
    }
}
