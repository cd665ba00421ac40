//! Stream index tokens.
//!
//! Media tools identify streams with tokens of several shapes:
//!
//! | token        | track | slot | hex tag |
//! |--------------|-------|------|---------|
//! | `3`          | 0     | 3    | -       |
//! | `1:2`        | 1     | 2    | -       |
//! | `0:0[0x1]`   | 0     | 0    | 0x1     |
//! | `#0:1[0x2]:` | 0     | 1    | 0x2     |
//!
//! The canonical stream index is the slot. The bracketed hex value is a
//! container-assigned stream ID (an MPEG-TS PID, for instance) and is never
//! used to select a stream.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Errors produced while tokenizing a stream index.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StreamIndexError {
    #[error("empty stream index")]
    Empty,
    #[error("invalid number {0:?} in stream index")]
    InvalidNumber(String),
    #[error("invalid hex tag {0:?} in stream index")]
    InvalidHexTag(String),
    #[error("malformed stream index {0:?}")]
    Malformed(String),
}

/// A parsed stream index token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct StreamIndex {
    /// Input file number (`-i` order); 0 for single-input probes.
    pub track: u32,
    /// Stream number within the input. This is the canonical index.
    pub slot: u32,
    /// Opaque container stream ID, if the tool printed one.
    pub hex_tag: Option<u32>,
}

impl StreamIndex {
    /// Index of stream `slot` in the first input, without a tag.
    pub fn new(slot: u32) -> Self {
        Self {
            track: 0,
            slot,
            hex_tag: None,
        }
    }

    pub fn with_hex_tag(mut self, tag: Option<u32>) -> Self {
        self.hex_tag = tag;
        self
    }

    /// The canonical stream index.
    pub fn index(&self) -> u32 {
        self.slot
    }

    /// The `-map` specifier selecting this stream in ffmpeg.
    pub fn map_specifier(&self) -> String {
        format!("{}:{}", self.track, self.slot)
    }

    /// Parse a bare hex tag such as `0x1100` (as printed in ffprobe's `id`).
    pub fn parse_hex_tag(s: &str) -> Result<u32, StreamIndexError> {
        parse_hex(s.trim())
    }
}

impl FromStr for StreamIndex {
    type Err = StreamIndexError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let token = s.trim();
        let token = token.strip_prefix('#').unwrap_or(token);
        let token = token.strip_suffix(':').unwrap_or(token);
        if token.is_empty() {
            return Err(StreamIndexError::Empty);
        }

        let (numbers, hex_tag) = match token.find('[') {
            Some(open) => {
                let rest = &token[open + 1..];
                let inner = rest
                    .strip_suffix(']')
                    .ok_or_else(|| StreamIndexError::Malformed(s.to_string()))?;
                (&token[..open], Some(parse_hex(inner)?))
            }
            None => (token, None),
        };

        let mut parts = numbers.split(':');
        let first = parts.next().unwrap_or("");
        let second = parts.next();
        if parts.next().is_some() {
            return Err(StreamIndexError::Malformed(s.to_string()));
        }

        let (track, slot) = match second {
            Some(slot) => (parse_decimal(first)?, parse_decimal(slot)?),
            None => (0, parse_decimal(first)?),
        };

        Ok(Self {
            track,
            slot,
            hex_tag,
        })
    }
}

fn parse_decimal(s: &str) -> Result<u32, StreamIndexError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StreamIndexError::InvalidNumber(s.to_string()));
    }
    s.parse()
        .map_err(|_| StreamIndexError::InvalidNumber(s.to_string()))
}

fn parse_hex(s: &str) -> Result<u32, StreamIndexError> {
    let digits = s
        .strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s);
    if digits.is_empty() {
        return Err(StreamIndexError::InvalidHexTag(s.to_string()));
    }
    u32::from_str_radix(digits, 16).map_err(|_| StreamIndexError::InvalidHexTag(s.to_string()))
}

impl fmt::Display for StreamIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.track, self.slot)?;
        if let Some(tag) = self.hex_tag {
            write!(f, "[0x{tag:x}]")?;
        }
        Ok(())
    }
}

impl TryFrom<String> for StreamIndex {
    type Error = StreamIndexError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<StreamIndex> for String {
    fn from(index: StreamIndex) -> Self {
        index.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_table() {
        let cases: &[(&str, u32, u32, Option<u32>)] = &[
            ("0:0[0x1]", 0, 0, Some(0x1)),
            ("1:2", 1, 2, None),
            ("3", 0, 3, None),
            ("0:1[0x2]", 0, 1, Some(0x2)),
            ("#0:4[0x1100]:", 0, 4, Some(0x1100)),
            ("0:12", 0, 12, None),
            ("  7  ", 0, 7, None),
            ("2:0[1e1]", 2, 0, Some(0x1e1)),
        ];

        for &(token, track, slot, tag) in cases {
            let parsed: StreamIndex = token.parse().unwrap_or_else(|e| panic!("{token}: {e}"));
            assert_eq!(parsed.track, track, "track of {token}");
            assert_eq!(parsed.slot, slot, "slot of {token}");
            assert_eq!(parsed.index(), slot, "canonical index of {token}");
            assert_eq!(parsed.hex_tag, tag, "hex tag of {token}");
        }
    }

    #[test]
    fn hex_tag_is_not_the_index() {
        let parsed: StreamIndex = "0:0[0x5]".parse().unwrap();
        assert_eq!(parsed.index(), 0);
        assert_eq!(parsed.map_specifier(), "0:0");
    }

    #[test]
    fn rejects_malformed_tokens() {
        assert_eq!("".parse::<StreamIndex>(), Err(StreamIndexError::Empty));
        assert_eq!("#:".parse::<StreamIndex>(), Err(StreamIndexError::Empty));
        assert!(matches!(
            "0:x".parse::<StreamIndex>(),
            Err(StreamIndexError::InvalidNumber(_))
        ));
        assert!(matches!(
            "0:1[0xZZ]".parse::<StreamIndex>(),
            Err(StreamIndexError::InvalidHexTag(_))
        ));
        assert!(matches!(
            "0:1[0x2".parse::<StreamIndex>(),
            Err(StreamIndexError::Malformed(_))
        ));
        assert!(matches!(
            "0:1:2".parse::<StreamIndex>(),
            Err(StreamIndexError::Malformed(_))
        ));
        assert!(matches!(
            "-1".parse::<StreamIndex>(),
            Err(StreamIndexError::InvalidNumber(_))
        ));
    }

    #[test]
    fn bare_hex_tag() {
        assert_eq!(StreamIndex::parse_hex_tag("0x1100"), Ok(0x1100));
        assert!(StreamIndex::parse_hex_tag("N/A").is_err());
    }

    #[test]
    fn display_keeps_tag() {
        let idx: StreamIndex = "0:3[0x1f]".parse().unwrap();
        assert_eq!(idx.to_string(), "0:3[0x1f]");
        assert_eq!(StreamIndex::new(2).to_string(), "0:2");
    }

    #[test]
    fn serde_as_string() {
        let idx: StreamIndex = "1:2[0x3]".parse().unwrap();
        let json = serde_json::to_string(&idx).unwrap();
        assert_eq!(json, "\"1:2[0x3]\"");
        let back: StreamIndex = serde_json::from_str(&json).unwrap();
        assert_eq!(back, idx);
        assert!(serde_json::from_str::<StreamIndex>("\"nope\"").is_err());
    }
}
