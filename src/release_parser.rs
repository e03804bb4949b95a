//! Thin, testable boundary around release-name token extraction.
//!
//! The full token grammar (screen size, source, codec, audio, other
//! tags) belongs to the release-name parser itself, which is out of
//! scope here; this module only extracts what the identification
//! pipeline (C9) and show-structure matcher (C5) need: a cleaned
//! title, an optional year, and an optional season/episode pair.

use chrono::Datelike;
use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedRelease {
    pub title: String,
    pub year: Option<i32>,
    pub season: Option<u32>,
    pub episodes: Vec<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseHint {
    Movie,
    Episode,
    Any,
}

fn prefix_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(\[.*?\]|\(.*?\)|[\w.-]+\.[a-z]{2,6}\s+-\s+)\s*").unwrap()
    })
}

fn year_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}\b").unwrap())
}

fn year_range_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(19|20)\d{2}[\s-]+(19|20)\d{2}\b").unwrap())
}

fn stop_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b(1080p|720p|2160p|4k|s\d+e\d+|s\d+|seasons?\s*\d+|\d+\s*seasons?|\d+x\d+|episodes?\s*\d+|e\d+|parts?\s*\d+|vol(ume)?\s*\d+|bluray|web-dl|h264|h265|x264|x265|remux|dts|truehd|atmos|repack|complete)\b").unwrap()
    })
}

fn season_episode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)s(\d{1,2})[\s._-]?e(\d{1,3})(?:e(\d{1,3}))?").unwrap())
}

fn bare_season_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bs(\d{1,2})\b").unwrap())
}

/// Matches a lone episode marker with no adjacent season (`E18`,
/// `Ep06`, `Episode 18`) so season-pack files named by absolute episode
/// number alone still yield an episode number.
fn bare_episode_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\be(?:p(?:isode)?)?[\s._-]?(\d{1,3})\b").unwrap())
}

/// `parse(name, hint)`: a pure function of its input string.
pub fn parse(name: &str, _hint: ParseHint) -> ParsedRelease {
    let (season, episodes) = extract_season_episode(name);
    let (title, year) = clean_name(name);
    ParsedRelease {
        title,
        year: year.and_then(|y| y.parse().ok()),
        season,
        episodes,
    }
}

fn extract_season_episode(name: &str) -> (Option<u32>, Vec<u32>) {
    if let Some(caps) = season_episode_re().captures(name) {
        let season = caps.get(1).and_then(|m| m.as_str().parse().ok());
        let mut episodes = Vec::new();
        if let Some(m) = caps.get(2) {
            if let Ok(e) = m.as_str().parse() {
                episodes.push(e);
            }
        }
        if let Some(m) = caps.get(3) {
            if let Ok(e) = m.as_str().parse() {
                episodes.push(e);
            }
        }
        return (season, episodes);
    }
    let season = bare_season_re()
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok());
    let episodes = bare_episode_re()
        .captures(name)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .map(|e| vec![e])
        .unwrap_or_default();
    (season, episodes)
}

/// Strip extension, site-prefix junk, dot/underscore separators, quality
/// and codec stop-words, and truncate at a trailing year. Grounded in
/// `identification.rs::clean_name`.
pub fn clean_name(name: &str) -> (String, Option<String>) {
    let mut title = name.to_string();

    if let Some(pos) = title.rfind('.') {
        let ext = title[pos..].to_lowercase();
        const VIDEO_EXT: &[&str] = &[
            ".mkv", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".webm", ".m4v", ".mpg", ".mpeg",
            ".ts", ".vob", ".m2ts", ".iso",
        ];
        if VIDEO_EXT.contains(&ext.as_str()) {
            title.truncate(pos);
        }
    }

    if let Some(m) = prefix_re().find(&title) {
        title = title[m.end()..]
            .trim_start_matches(|c: char| !c.is_alphanumeric())
            .to_string();
    }

    title = title.replace(['.', '_'], " ");

    if let Some(pos) = title.to_lowercase().find(" aka ") {
        let after_aka = &title[pos + 5..];
        if !after_aka.trim().is_empty() {
            title = after_aka.to_string();
        }
    }

    let year = year_re().find(&title).map(|m| m.as_str().to_string());

    while let Some(m) = stop_re().find(&title) {
        if m.start() == 0 {
            title = title[m.end()..].to_string();
            title = title
                .trim_start_matches(|c: char| !c.is_alphanumeric())
                .to_string();
            if title.is_empty() {
                break;
            }
        } else {
            title.truncate(m.start());
            break;
        }
    }

    if let Some(m) = year_re().find(&title) {
        if m.start() > 0 && !year_range_re().is_match(&title) {
            title.truncate(m.start());
        }
    }

    title = title
        .trim_end_matches(|c: char| !c.is_alphanumeric() && c != ')' && c != ']')
        .to_string();

    (title.trim().to_string(), year)
}

/// A title is meaningless if all digits, all non-word characters, or
/// length <= 2. Grounded in `constants.py::_MEANINGLESS_TITLE`.
pub fn is_meaningless(title: &str) -> bool {
    let trimmed = title.trim();
    if trimmed.len() <= 2 {
        return true;
    }
    if trimmed.chars().all(|c| c.is_ascii_digit()) {
        return true;
    }
    if trimmed.chars().all(|c| !c.is_alphanumeric()) {
        return true;
    }
    false
}

/// A year is valid iff in `[1920, current_year + 1]` and, when a
/// reference text is given, it appears literally in that text. The
/// literal-substring check is a deliberate hack preserved from the
/// original `validate_year` (prevents catching years embedded in
/// episode titles rather than the folder/file name).
pub fn is_valid_year(year: i32, reference_text: Option<&str>) -> bool {
    let current_year = chrono::Utc::now().year();
    if year < 1920 || year > current_year + 1 {
        return false;
    }
    if let Some(text) = reference_text {
        if !text.contains(&year.to_string()) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_site_prefix_and_stop_words() {
        let (title, year) = clean_name("Arrival.2016.1080p.BluRay.x264.mkv");
        assert_eq!(title, "Arrival");
        assert_eq!(year.as_deref(), Some("2016"));
    }

    #[test]
    fn preserves_year_range() {
        let (title, _) = clean_name("Cosmos.1980-1999.Anthology.mkv");
        assert!(title.contains("1980"));
    }

    #[test]
    fn meaningless_title_detects_short_and_numeric() {
        assert!(is_meaningless("00000"));
        assert!(is_meaningless("1"));
        assert!(is_meaningless("--"));
        assert!(!is_meaningless("Inception"));
        assert!(is_meaningless("2012"));
    }

    #[test]
    fn year_validation_rejects_out_of_range() {
        assert!(!is_valid_year(1919, None));
        assert!(is_valid_year(1920, None));
    }

    #[test]
    fn year_validation_requires_literal_substring_in_reference() {
        assert!(!is_valid_year(1994, Some("Some.Episode.Title.S01E02")));
        assert!(is_valid_year(1994, Some("Movie.1994.1080p")));
    }

    #[test]
    fn extracts_multi_episode() {
        let parsed = parse("The.Show.S01E01E02.mkv", ParseHint::Episode);
        assert_eq!(parsed.season, Some(1));
        assert_eq!(parsed.episodes, vec![1, 2]);
    }

    #[test]
    fn extracts_bare_season() {
        let parsed = parse("The.Show.S02.Complete/E18.mkv", ParseHint::Episode);
        assert_eq!(parsed.season, Some(2));
        assert_eq!(parsed.episodes, vec![18]);
    }

    #[test]
    fn extracts_bare_episode_with_no_season_marker() {
        let parsed = parse("The.Show.E06.mkv", ParseHint::Episode);
        assert_eq!(parsed.season, None);
        assert_eq!(parsed.episodes, vec![6]);
    }
}
