//! A container assembled in memory from existing streams.

use avikit_core::{Error, Result, StreamCaps, StreamHandle, StreamInfo};

use crate::container::{select_stream, Container, FileInfo};

/// Groups stream handles so they can be treated as one file, e.g. to
/// save edited streams together.
pub struct StreamFile {
    streams: Vec<StreamHandle>,
}

impl StreamFile {
    pub fn new(streams: Vec<StreamHandle>) -> Result<Self> {
        if streams.is_empty() {
            return Err(Error::bad_param("a stream file needs at least one stream"));
        }
        Ok(StreamFile { streams })
    }

    pub fn streams(&self) -> &[StreamHandle] {
        &self.streams
    }
}

impl Container for StreamFile {
    fn info(&self) -> Result<FileInfo> {
        let infos: Vec<StreamInfo> = self.streams.iter().map(|s| s.info()).collect();
        let base = infos
            .iter()
            .find(|i| i.is_video())
            .unwrap_or(&infos[0]);

        let (width, height) = infos
            .iter()
            .find(|i| i.is_video())
            .map(|v| (v.frame.width().max(0) as u32, v.frame.height().max(0) as u32))
            .unwrap_or((0, 0));

        Ok(FileInfo {
            caps: StreamCaps::CAN_READ,
            streams: infos.len() as u32,
            suggested_buffer_size: infos.iter().map(|i| i.suggested_buffer_size).max().unwrap_or(0),
            width,
            height,
            scale: base.scale,
            rate: base.rate,
            length: base.length,
            edit_count: infos.iter().map(|i| i.edit_count).sum(),
            file_type: "Stream file".to_string(),
            ..Default::default()
        })
    }

    fn stream(&self, stream_type: Option<avikit_core::StreamType>, index: usize) -> Result<StreamHandle> {
        let types = self.streams.iter().map(|s| s.info().stream_type);
        select_stream(types, stream_type, index)
            .map(|n| self.streams[n].clone())
            .ok_or_else(|| Error::NoData(format!("no stream {} of type {:?}", index, stream_type)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wav::WavFile;
    use avikit_core::{StreamType, WaveFormat};
    use std::sync::Arc;

    #[test]
    fn test_stream_file() {
        let wav = WavFile::create(WaveFormat::pcm(1, 8000, 8)).unwrap();
        wav.append(&[0; 80]).unwrap();
        let handle = wav.as_stream();

        let file = StreamFile::new(vec![handle.clone()]).unwrap();
        let info = file.info().unwrap();
        assert_eq!(info.streams, 1);
        assert_eq!(info.length, 80);

        let got = file.stream(Some(StreamType::Audio), 0).unwrap();
        assert!(Arc::ptr_eq(&got, &handle));
        assert!(file.stream(Some(StreamType::Video), 0).is_err());
    }

    #[test]
    fn test_empty_rejected() {
        assert!(matches!(StreamFile::new(Vec::new()), Err(Error::BadParam(_))));
    }
}
