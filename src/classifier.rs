//! Movie vs TV-episode decision for a mount entry.
//!
//! Grounded in `organiser.py::_classify_torrent` and
//! `constants.py::SHOW_PATTERNS`.

use regex::Regex;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Movie,
    Show,
}

fn show_patterns() -> &'static Vec<Regex> {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"[Ss]\d{1,2}[Ee]\d{1,3}").unwrap(),
            Regex::new(r"[Ss]\d{1,2}").unwrap(),
            Regex::new(r"(?i)[Ss]eason[\s._-]?\d").unwrap(),
            Regex::new(r"[Ee]\d{2,3}").unwrap(),
            Regex::new(r"(?i)Episode[\s._-]?\d").unwrap(),
            Regex::new(r"(?i)\bComplete[\s._-]?Series\b").unwrap(),
            Regex::new(r"(?i)\bBatch\b").unwrap(),
            Regex::new(r"\b\d{1,2}x\d{2}\b").unwrap(),
        ]
    })
}

fn matches_show_pattern(text: &str) -> bool {
    show_patterns().iter().any(|p| p.is_match(text))
}

const VIDEO_EXTENSIONS: &[&str] = &[
    ".mkv", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".webm", ".m4v", ".mpg", ".mpeg", ".ts",
    ".vob", ".m2ts", ".iso",
];

fn is_video_extension(filename: &str) -> bool {
    let lower = filename.to_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// `classify(entry_name, video_files) -> {movie|show}`.
pub fn classify(entry_name: &str, video_file_names: &[String]) -> MediaKind {
    if matches_show_pattern(entry_name) {
        return MediaKind::Show;
    }

    if !video_file_names.is_empty() {
        let sample: Vec<&String> = video_file_names.iter().take(20).collect();
        let episode_like = sample
            .iter()
            .filter(|name| matches_show_pattern(name))
            .count();
        if episode_like * 2 > sample.len() {
            return MediaKind::Show;
        }

        let video_count = video_file_names
            .iter()
            .filter(|n| is_video_extension(n))
            .count();
        if video_count > 3 {
            return MediaKind::Show;
        }
    }

    MediaKind::Movie
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_name_pattern_wins_immediately() {
        assert_eq!(
            classify("The.Show.S01E01.1080p.mkv", &[]),
            MediaKind::Show
        );
    }

    #[test]
    fn majority_of_sampled_files_triggers_show() {
        let files = vec![
            "Show.S01E01.mkv".to_string(),
            "Show.S01E02.mkv".to_string(),
            "random.nfo".to_string(),
        ];
        assert_eq!(classify("Some.Pack", &files), MediaKind::Show);
    }

    #[test]
    fn more_than_three_video_files_is_show() {
        let files = vec![
            "a.mkv".to_string(),
            "b.mkv".to_string(),
            "c.mkv".to_string(),
            "d.mkv".to_string(),
        ];
        assert_eq!(classify("Some.Release", &files), MediaKind::Show);
    }

    #[test]
    fn single_file_with_no_show_markers_is_movie() {
        let files = vec!["Arrival.2016.1080p.BluRay.mkv".to_string()];
        assert_eq!(
            classify("Arrival.2016.1080p.BluRay", &files),
            MediaKind::Movie
        );
    }
}
