//! rc-parser: title guessing for media filenames.
//!
//! Recognizes the two naming schemes that cover most libraries: scene-style
//! episode names (`Show.Name.S01E02.Episode.Title.1080p.WEB-DL.mkv`) and
//! movie names with a year (`Movie.Name.2024.1080p.BluRay.mkv`,
//! `Movie Name (2024).mkv`).
//!
//! # Quick start
//!
//! ```
//! use rc_parser::{parse_title, ParsedTitle};
//!
//! let t = parse_title("Show.Name.S01E02.Pilot.1080p.WEB-DL.mkv");
//! assert_eq!(t.display_title("fallback"), "Show Name S01E02 - Pilot");
//!
//! let m = parse_title("Movie Name (2024).mkv");
//! assert_eq!(m, ParsedTitle::Movie { title: "Movie Name".into(), year: 2024 });
//! ```

mod parser;
pub mod types;

pub use types::ParsedTitle;

/// Guess title metadata from a filename or path.
///
/// Only the final path component is considered. Never fails; names that
/// match no scheme come back as [`ParsedTitle::Unrecognized`].
pub fn parse_title(filename: &str) -> ParsedTitle {
    parser::parse(filename)
}
