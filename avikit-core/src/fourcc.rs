//! Four character codes.

use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// FourCC (Four Character Code) identifier
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// The all-zero code, used for "no handler".
    pub const NULL: FourCC = FourCC([0; 4]);

    /// Create from bytes
    pub const fn new(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }

    /// Create from the little-endian DWORD representation
    pub const fn from_u32(value: u32) -> Self {
        FourCC(value.to_le_bytes())
    }

    /// Little-endian DWORD representation
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Get as string
    pub fn as_str(&self) -> String {
        String::from_utf8_lossy(&self.0).to_string()
    }

    /// Get raw bytes
    pub fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    pub fn is_null(&self) -> bool {
        self.0 == [0; 4]
    }

    /// Case-insensitive comparison, used for handler lookups.
    pub fn eq_ignore_case(&self, other: &FourCC) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    /// Lower-cased copy.
    pub fn to_ascii_lowercase(self) -> FourCC {
        FourCC(self.0.map(|b| b.to_ascii_lowercase()))
    }
}

impl fmt::Debug for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCC(\"{}\")", self.as_str())
    }
}

impl fmt::Display for FourCC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<[u8; 4]> for FourCC {
    fn from(bytes: [u8; 4]) -> Self {
        FourCC(bytes)
    }
}

impl From<&[u8; 4]> for FourCC {
    fn from(bytes: &[u8; 4]) -> Self {
        FourCC(*bytes)
    }
}

impl FromStr for FourCC {
    type Err = Error;

    /// Parse a code of exactly four bytes.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| Error::bad_param(format!("FourCC '{}' is not 4 bytes", s)))?;
        Ok(FourCC(bytes))
    }
}

/// Well-known chunk IDs
pub mod chunk_ids {
    use super::FourCC;

    pub const RIFF: FourCC = FourCC(*b"RIFF");
    pub const AVI: FourCC = FourCC(*b"AVI ");
    pub const WAVE: FourCC = FourCC(*b"WAVE");
    pub const LIST: FourCC = FourCC(*b"LIST");
    pub const HDRL: FourCC = FourCC(*b"hdrl");
    pub const AVIH: FourCC = FourCC(*b"avih");
    pub const STRL: FourCC = FourCC(*b"strl");
    pub const STRH: FourCC = FourCC(*b"strh");
    pub const STRF: FourCC = FourCC(*b"strf");
    pub const STRN: FourCC = FourCC(*b"strn");
    pub const STRD: FourCC = FourCC(*b"strd");
    pub const MOVI: FourCC = FourCC(*b"movi");
    pub const REC: FourCC = FourCC(*b"rec ");
    pub const IDX1: FourCC = FourCC(*b"idx1");
    pub const JUNK: FourCC = FourCC(*b"JUNK");
    pub const INFO: FourCC = FourCC(*b"INFO");
    pub const INAM: FourCC = FourCC(*b"INAM");
    pub const FMT: FourCC = FourCC(*b"fmt ");
    pub const DATA: FourCC = FourCC(*b"data");
}

/// Stream type codes (`fccType`)
pub mod stream_types {
    use super::FourCC;

    pub const VIDEO: FourCC = FourCC(*b"vids");
    pub const AUDIO: FourCC = FourCC(*b"auds");
    pub const MIDI: FourCC = FourCC(*b"mids");
    pub const TEXT: FourCC = FourCC(*b"txts");
}
