use std::sync::LazyLock;

use regex::Regex;

use crate::types::ParsedTitle;

/// Compiled once on first use. `None` only if a literal below is invalid.
type Pattern = LazyLock<Option<Regex>>;

/// `Show.Name.S01E02.Episode.Title.1080p...`
static TV_WITH_TITLE: Pattern = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)[.\s]+S(\d{1,2})E(\d{1,2})[.\s]+(.+?)[.\s]+\d{3,4}p").ok()
});
/// `Show.Name.S01E02...`
static TV_BARE: Pattern =
    LazyLock::new(|| Regex::new(r"(?i)^(.+?)[.\s]+S(\d{1,2})E(\d{1,2})").ok());
/// `Movie.Name.2024.1080p...`
static MOVIE_DOTTED: Pattern =
    LazyLock::new(|| Regex::new(r"(?i)^(.+?)[.\s]+(\d{4})[.\s]+\d{3,4}p").ok());
/// `Movie Name (2024)`
static MOVIE_PAREN: Pattern = LazyLock::new(|| Regex::new(r"^(.+?)\s*\((\d{4})\)").ok());

pub(crate) fn parse(filename: &str) -> ParsedTitle {
    let basename = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    parse_tv(basename)
        .or_else(|| parse_movie(basename))
        .unwrap_or(ParsedTitle::Unrecognized)
}

fn parse_tv(name: &str) -> Option<ParsedTitle> {
    if let Some(re) = TV_WITH_TITLE.as_ref() {
        if let Some(caps) = re.captures(name) {
            return Some(ParsedTitle::Tv {
                show: clean(&caps[1]),
                season: caps[2].parse().ok()?,
                episode: caps[3].parse().ok()?,
                title: Some(clean(&caps[4])).filter(|t| !t.is_empty()),
            });
        }
    }

    if let Some(re) = TV_BARE.as_ref() {
        if let Some(caps) = re.captures(name) {
            return Some(ParsedTitle::Tv {
                show: clean(&caps[1]),
                season: caps[2].parse().ok()?,
                episode: caps[3].parse().ok()?,
                title: None,
            });
        }
    }

    None
}

fn parse_movie(name: &str) -> Option<ParsedTitle> {
    for pattern in [&MOVIE_DOTTED, &MOVIE_PAREN] {
        let Some(re) = pattern.as_ref() else {
            continue;
        };
        if let Some(caps) = re.captures(name) {
            return Some(ParsedTitle::Movie {
                title: clean(&caps[1]),
                year: caps[2].parse().ok()?,
            });
        }
    }
    None
}

/// Dots become spaces; separator debris at either end is dropped.
fn clean(raw: &str) -> String {
    raw.replace('.', " ")
        .trim_matches(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .to_string()
}
