//! Parsed title metadata.

use serde::{Deserialize, Serialize};

/// What a filename says about its content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ParsedTitle {
    /// A TV episode. `title` is the episode title when the name carries one.
    Tv {
        show: String,
        season: u32,
        episode: u32,
        title: Option<String>,
    },
    Movie {
        title: String,
        year: u16,
    },
    Unrecognized,
}

impl ParsedTitle {
    /// Human-readable title for a now-playing display.
    ///
    /// `Show S01E02 - Episode`, `Show S01E02`, the movie title, or
    /// `fallback` when nothing was recognized.
    pub fn display_title(&self, fallback: &str) -> String {
        match self {
            ParsedTitle::Tv {
                show,
                season,
                episode,
                title,
            } => {
                let base = format!("{show} S{season:02}E{episode:02}");
                match title {
                    Some(t) => format!("{base} - {t}"),
                    None => base,
                }
            }
            ParsedTitle::Movie { title, .. } => title.clone(),
            ParsedTitle::Unrecognized => fallback.to_string(),
        }
    }

    pub fn is_recognized(&self) -> bool {
        !matches!(self, ParsedTitle::Unrecognized)
    }
}
