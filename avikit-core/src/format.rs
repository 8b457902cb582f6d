//! Stream format descriptors.
//!
//! `strf` chunks are stored verbatim by the container; these types give the
//! two layouts the engine itself needs to understand a typed view:
//! `BITMAPINFOHEADER` for video and `WAVEFORMATEX` for audio.

use std::io::{Cursor, Read, Write};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{Error, Result};
use crate::fourcc::FourCC;

/// Uncompressed RGB (`BI_RGB`, a zero compression tag).
pub const BI_RGB: FourCC = FourCC::NULL;

/// Video format (BITMAPINFOHEADER plus any trailing palette/codec data)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitmapInfo {
    /// Header size (40 for the plain header)
    pub size: u32,
    /// Width in pixels
    pub width: i32,
    /// Height in pixels (negative for top-down)
    pub height: i32,
    /// Number of planes (always 1 for usable rasters)
    pub planes: u16,
    /// Bits per pixel
    pub bit_count: u16,
    /// Compression FourCC, `BI_RGB` when uncompressed
    pub compression: FourCC,
    /// Image size in bytes
    pub image_size: u32,
    pub x_pels_per_meter: i32,
    pub y_pels_per_meter: i32,
    pub colors_used: u32,
    pub colors_important: u32,
    /// Palette entries or codec-private bytes following the header
    pub extra: Vec<u8>,
}

impl BitmapInfo {
    /// Size of the fixed header.
    pub const HEADER_SIZE: usize = 40;

    /// An uncompressed RGB raster description.
    pub fn rgb(width: i32, height: i32, bit_count: u16) -> Self {
        let mut info = BitmapInfo {
            size: Self::HEADER_SIZE as u32,
            width,
            height,
            planes: 1,
            bit_count,
            compression: BI_RGB,
            image_size: 0,
            x_pels_per_meter: 0,
            y_pels_per_meter: 0,
            colors_used: 0,
            colors_important: 0,
            extra: Vec::new(),
        };
        info.image_size = info.frame_size() as u32;
        info
    }

    /// Parse a `strf` payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::HEADER_SIZE {
            return Err(Error::bad_format(format!(
                "bitmap header needs {} bytes, have {}",
                Self::HEADER_SIZE,
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let size = cursor.read_u32::<LittleEndian>()?;
        let width = cursor.read_i32::<LittleEndian>()?;
        let height = cursor.read_i32::<LittleEndian>()?;
        let planes = cursor.read_u16::<LittleEndian>()?;
        let bit_count = cursor.read_u16::<LittleEndian>()?;
        let mut compression = [0u8; 4];
        cursor.read_exact(&mut compression)?;

        Ok(BitmapInfo {
            size,
            width,
            height,
            planes,
            bit_count,
            compression: FourCC(compression),
            image_size: cursor.read_u32::<LittleEndian>()?,
            x_pels_per_meter: cursor.read_i32::<LittleEndian>()?,
            y_pels_per_meter: cursor.read_i32::<LittleEndian>()?,
            colors_used: cursor.read_u32::<LittleEndian>()?,
            colors_important: cursor.read_u32::<LittleEndian>()?,
            extra: data[Self::HEADER_SIZE..].to_vec(),
        })
    }

    /// Serialise back to `strf` layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(Self::HEADER_SIZE + self.extra.len());
        // Writes into a Vec cannot fail.
        let _ = self.write_to(&mut data);
        data
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u32::<LittleEndian>(self.size)?;
        w.write_i32::<LittleEndian>(self.width)?;
        w.write_i32::<LittleEndian>(self.height)?;
        w.write_u16::<LittleEndian>(self.planes)?;
        w.write_u16::<LittleEndian>(self.bit_count)?;
        w.write_all(self.compression.as_bytes())?;
        w.write_u32::<LittleEndian>(self.image_size)?;
        w.write_i32::<LittleEndian>(self.x_pels_per_meter)?;
        w.write_i32::<LittleEndian>(self.y_pels_per_meter)?;
        w.write_u32::<LittleEndian>(self.colors_used)?;
        w.write_u32::<LittleEndian>(self.colors_important)?;
        w.write_all(&self.extra)
    }

    /// Get absolute height (handles negative for top-down)
    pub fn abs_height(&self) -> u32 {
        self.height.unsigned_abs()
    }

    /// Check if image is top-down
    pub fn is_top_down(&self) -> bool {
        self.height < 0
    }

    pub fn is_uncompressed(&self) -> bool {
        self.compression == BI_RGB
    }

    /// Bytes per scan line, DWORD aligned.
    pub fn stride(&self) -> usize {
        let bits = self.width.unsigned_abs() as usize * self.bit_count as usize;
        bits.div_ceil(32) * 4
    }

    /// Bytes needed to hold one uncompressed frame.
    pub fn frame_size(&self) -> usize {
        self.stride() * self.abs_height() as usize
    }
}

/// Audio format (WAVEFORMATEX)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaveFormat {
    /// Format tag (1 = PCM)
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub avg_bytes_per_sec: u32,
    /// Bytes per sample frame across all channels
    pub block_align: u16,
    pub bits_per_sample: u16,
    /// Extra codec-specific data (cbSize bytes)
    pub extra_data: Vec<u8>,
}

impl WaveFormat {
    pub const PCM: u16 = 0x0001;

    /// Minimum `fmt `/`strf` payload (PCMWAVEFORMAT).
    pub const MIN_SIZE: usize = 16;

    /// Plain PCM description.
    pub fn pcm(channels: u16, samples_per_sec: u32, bits_per_sample: u16) -> Self {
        let block_align = channels * bits_per_sample.div_ceil(8);
        WaveFormat {
            format_tag: Self::PCM,
            channels,
            samples_per_sec,
            avg_bytes_per_sec: samples_per_sec * block_align as u32,
            block_align,
            bits_per_sample,
            extra_data: Vec::new(),
        }
    }

    /// Parse a `fmt ` or audio `strf` payload.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::MIN_SIZE {
            return Err(Error::bad_format(format!(
                "wave format needs {} bytes, have {}",
                Self::MIN_SIZE,
                data.len()
            )));
        }

        let mut cursor = Cursor::new(data);
        let format_tag = cursor.read_u16::<LittleEndian>()?;
        let channels = cursor.read_u16::<LittleEndian>()?;
        let samples_per_sec = cursor.read_u32::<LittleEndian>()?;
        let avg_bytes_per_sec = cursor.read_u32::<LittleEndian>()?;
        let block_align = cursor.read_u16::<LittleEndian>()?;
        let bits_per_sample = cursor.read_u16::<LittleEndian>()?;

        let extra_data = if data.len() >= 18 {
            let size = cursor.read_u16::<LittleEndian>()? as usize;
            let end = (18 + size).min(data.len());
            data[18..end].to_vec()
        } else {
            Vec::new()
        };

        Ok(WaveFormat {
            format_tag,
            channels,
            samples_per_sec,
            avg_bytes_per_sec,
            block_align,
            bits_per_sample,
            extra_data,
        })
    }

    /// Serialise; the cbSize field is only written when extra data exists.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut data = Vec::with_capacity(18 + self.extra_data.len());
        let _ = self.write_to(&mut data);
        data
    }

    fn write_to<W: Write>(&self, w: &mut W) -> std::io::Result<()> {
        w.write_u16::<LittleEndian>(self.format_tag)?;
        w.write_u16::<LittleEndian>(self.channels)?;
        w.write_u32::<LittleEndian>(self.samples_per_sec)?;
        w.write_u32::<LittleEndian>(self.avg_bytes_per_sec)?;
        w.write_u16::<LittleEndian>(self.block_align)?;
        w.write_u16::<LittleEndian>(self.bits_per_sample)?;
        if !self.extra_data.is_empty() {
            w.write_u16::<LittleEndian>(self.extra_data.len() as u16)?;
            w.write_all(&self.extra_data)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bitmap_parse() {
        let info = BitmapInfo {
            compression: FourCC::new(*b"cvid"),
            extra: vec![1, 2, 3, 4],
            ..BitmapInfo::rgb(320, 240, 24)
        };
        let parsed = BitmapInfo::parse(&info.to_bytes()).unwrap();
        assert_eq!(parsed, info);
        assert!(!parsed.is_uncompressed());
    }

    #[test]
    fn test_bitmap_too_short() {
        assert!(matches!(
            BitmapInfo::parse(&[0u8; 20]),
            Err(Error::BadFormat(_))
        ));
    }

    #[test]
    fn test_stride_alignment() {
        // 3 pixels * 24 bits = 72 bits -> 9 bytes -> padded to 12.
        let info = BitmapInfo::rgb(3, -2, 24);
        assert_eq!(info.stride(), 12);
        assert_eq!(info.frame_size(), 24);
        assert!(info.is_top_down());
        assert_eq!(info.abs_height(), 2);
    }

    #[test]
    fn test_wave_pcm() {
        let fmt = WaveFormat::pcm(2, 44100, 16);
        assert_eq!(fmt.block_align, 4);
        assert_eq!(fmt.avg_bytes_per_sec, 176_400);
        assert_eq!(fmt.to_bytes().len(), 16);
        assert_eq!(WaveFormat::parse(&fmt.to_bytes()).unwrap(), fmt);
    }

    #[test]
    fn test_wave_extra_data() {
        let fmt = WaveFormat {
            format_tag: 0x0055,
            extra_data: vec![9; 12],
            ..WaveFormat::pcm(1, 22050, 0)
        };
        let bytes = fmt.to_bytes();
        assert_eq!(bytes.len(), 30);
        assert_eq!(WaveFormat::parse(&bytes).unwrap().extra_data, vec![9; 12]);
    }
}
