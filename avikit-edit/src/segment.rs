//! Segment table.
//!
//! An edited stream is an ordered list of segments, each a contiguous
//! slice of some source stream. Logical positions are assigned by
//! concatenation: the first segment starts at the stream's logical start.

use std::fmt;
use std::sync::Arc;

use avikit_core::{Error, Result, StreamHandle};

/// One contiguous slice of a source stream.
#[derive(Clone)]
pub struct Segment {
    pub source: StreamHandle,
    /// First source position covered
    pub start: i64,
    pub length: i64,
}

impl Segment {
    pub fn new(source: StreamHandle, start: i64, length: i64) -> Self {
        Segment { source, start, length }
    }

    /// One past the last source position covered.
    pub fn end(&self) -> i64 {
        self.start + self.length
    }

    pub fn same_source(&self, other: &Segment) -> bool {
        same_stream(&self.source, &other.source)
    }

    /// `other` continues this segment in the same source.
    pub fn continued_by(&self, other: &Segment) -> bool {
        self.same_source(other) && self.end() == other.start
    }

    /// Same source and same source range.
    pub fn same_coverage(&self, other: &Segment) -> bool {
        self.same_source(other) && self.start == other.start && self.length == other.length
    }
}

impl fmt::Debug for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Segment")
            .field("source", &Arc::as_ptr(&self.source).cast::<()>())
            .field("start", &self.start)
            .field("length", &self.length)
            .finish()
    }
}

/// Identity of the stream object behind two handles.
pub fn same_stream(a: &StreamHandle, b: &StreamHandle) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

/// Position of a logical sample inside the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Locus {
    pub index: usize,
    /// Logical position of the segment's first sample
    pub logical_start: i64,
}

/// Ordered segments plus the logical start they are laid out from.
#[derive(Debug, Clone, Default)]
pub(crate) struct SegmentTable {
    pub segments: Vec<Segment>,
    pub start: i64,
    /// Reserve step when the table grows.
    pub growth: usize,
}

impl SegmentTable {
    pub fn new(start: i64, growth: usize) -> Self {
        SegmentTable {
            segments: Vec::new(),
            start,
            growth: growth.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn total_length(&self) -> i64 {
        self.segments.iter().map(|s| s.length).sum()
    }

    pub fn end(&self) -> i64 {
        self.start + self.total_length()
    }

    /// Segment holding logical position `pos`.
    pub fn locate(&self, pos: i64) -> Option<Locus> {
        if pos < self.start {
            return None;
        }
        let mut logical_start = self.start;
        for (index, segment) in self.segments.iter().enumerate() {
            if pos < logical_start + segment.length {
                return Some(Locus { index, logical_start });
            }
            logical_start += segment.length;
        }
        None
    }

    /// Logical start of every segment.
    pub fn logical_starts(&self) -> Vec<i64> {
        let mut at = self.start;
        self.segments
            .iter()
            .map(|s| {
                let here = at;
                at += s.length;
                here
            })
            .collect()
    }

    /// Make `pos` a segment boundary and return the index of the segment
    /// that starts there (`len()` when `pos` is the end).
    pub fn split_at(&mut self, pos: i64) -> Result<usize> {
        if pos == self.end() {
            return Ok(self.segments.len());
        }
        let locus = self.locate(pos).ok_or_else(|| {
            Error::bad_param(format!(
                "position {} outside [{}, {}]",
                pos,
                self.start,
                self.end()
            ))
        })?;
        let offset = pos - locus.logical_start;
        if offset == 0 {
            return Ok(locus.index);
        }

        self.reserve(1)?;
        let head = &mut self.segments[locus.index];
        let tail = Segment::new(head.source.clone(), head.start + offset, head.length - offset);
        head.length = offset;
        self.segments.insert(locus.index + 1, tail);
        Ok(locus.index + 1)
    }

    /// Grow the backing storage in steps of `growth` entries.
    pub fn reserve(&mut self, additional: usize) -> Result<()> {
        let needed = self.segments.len() + additional;
        if needed > self.segments.capacity() {
            let step = additional.max(self.growth);
            self.segments
                .try_reserve(step)
                .map_err(|e| Error::Memory(format!("segment table: {}", e)))?;
        }
        Ok(())
    }

    /// Merge neighbours that continue each other in the same source and
    /// drop empty segments. Returns the number of entries removed.
    pub fn coalesce(&mut self) -> usize {
        let before = self.segments.len();
        let mut merged: Vec<Segment> = Vec::with_capacity(self.segments.capacity());
        for segment in self.segments.drain(..) {
            if segment.length == 0 {
                continue;
            }
            match merged.last_mut() {
                Some(last) if last.continued_by(&segment) => last.length += segment.length,
                _ => merged.push(segment),
            }
        }
        self.segments = merged;
        before - self.segments.len()
    }

    /// Segments covering logical `[from, to)`, clipped to it.
    pub fn slice(&self, from: i64, to: i64) -> Vec<Segment> {
        let mut out = Vec::new();
        for (segment, logical_start) in self.segments.iter().zip(self.logical_starts()) {
            let logical_end = logical_start + segment.length;
            let lo = from.max(logical_start);
            let hi = to.min(logical_end);
            if lo < hi {
                out.push(Segment::new(
                    segment.source.clone(),
                    segment.start + (lo - logical_start),
                    hi - lo,
                ));
            }
        }
        out
    }

    /// Remove logical `[from, from + length)`. The range must lie inside
    /// the table. Returns whether a segment lost its front, which can
    /// leave a segment starting off a key frame.
    pub fn delete(&mut self, from: i64, length: i64) -> bool {
        let mut remaining = length;
        let mut front_trimmed = false;

        while remaining > 0 {
            let Some(locus) = self.locate(from) else {
                break;
            };
            let offset = from - locus.logical_start;
            let segment = &mut self.segments[locus.index];

            if offset == 0 {
                if remaining < segment.length {
                    segment.start += remaining;
                    segment.length -= remaining;
                    front_trimmed = true;
                    remaining = 0;
                } else {
                    remaining -= segment.length;
                    self.segments.remove(locus.index);
                }
            } else if offset + remaining >= segment.length {
                let removed = segment.length - offset;
                segment.length = offset;
                remaining -= removed;
            } else {
                let tail = Segment::new(
                    segment.source.clone(),
                    segment.start + offset + remaining,
                    segment.length - offset - remaining,
                );
                segment.length = offset;
                self.segments.insert(locus.index + 1, tail);
                remaining = 0;
            }
        }
        front_trimmed
    }
}
