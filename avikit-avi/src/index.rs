//! Per-stream partitioning of the flat `idx1` index.

use std::ops::Range;

use avikit_core::{Error, IndexPolicy, Result};
use tracing::{debug, warn};

use crate::chunks::{IndexEntry, IndexFlags};

/// The file's index, regrouped so that each stream's entries are one
/// contiguous slice in original file order.
#[derive(Debug, Clone, Default)]
pub struct IndexTable {
    entries: Vec<IndexEntry>,
    ranges: Vec<Range<usize>>,
}

impl IndexTable {
    /// Partition `raw` into `stream_count` per-stream ranges.
    ///
    /// `LIST` entries (`rec ` groups) and entries without a stream code are
    /// not samples and are skipped. An entry whose stream code names no
    /// declared stream is rejected under [`IndexPolicy::Strict`] and
    /// dropped under [`IndexPolicy::Lenient`].
    pub fn build(raw: &[IndexEntry], stream_count: usize, policy: IndexPolicy) -> Result<Self> {
        let mut dropped = 0usize;
        for entry in raw.iter().filter(|e| !e.flags.contains(IndexFlags::LIST)) {
            if let Some(n) = entry.stream_number() {
                if n as usize >= stream_count {
                    match policy {
                        IndexPolicy::Strict => {
                            return Err(Error::bad_format(format!(
                                "index entry '{}' names stream {} but only {} declared",
                                entry.chunk_id, n, stream_count
                            )));
                        }
                        IndexPolicy::Lenient => dropped += 1,
                    }
                }
            }
        }
        if dropped > 0 {
            warn!(dropped, stream_count, "dropping index entries for undeclared streams");
        }

        let mut entries = Vec::with_capacity(raw.len() - dropped);
        let mut ranges = Vec::with_capacity(stream_count);

        // Streams outer, entries inner: each partition keeps file order.
        for stream in 0..stream_count {
            let begin = entries.len();
            entries.extend(raw.iter().filter(|e| {
                !e.flags.contains(IndexFlags::LIST) && e.stream_number() == Some(stream as u16)
            }));
            ranges.push(begin..entries.len());
        }

        debug!(
            raw = raw.len(),
            kept = entries.len(),
            streams = stream_count,
            "partitioned index"
        );

        Ok(IndexTable { entries, ranges })
    }

    /// Entries of one stream, in file order.
    pub fn lookup(&self, stream: usize) -> Result<&[IndexEntry]> {
        self.ranges
            .get(stream)
            .map(|range| &self.entries[range.clone()])
            .ok_or_else(|| {
                Error::BadHandle(format!(
                    "stream {} out of range ({} streams)",
                    stream,
                    self.ranges.len()
                ))
            })
    }

    pub fn stream_count(&self) -> usize {
        self.ranges.len()
    }

    /// Number of entries across all partitions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
