//! Deterministic integer quality score for a release name.
//!
//! Grounded in `original_source/scoring.py`; the tables here match it
//! (and spec.md §4.3) exactly. Unlike the original, token extraction
//! is done directly against the name via regex rather than through a
//! full release-name parser, since `score` is specified as a pure
//! function of the name string alone.

use regex::Regex;

const RESOLUTION_SCORES: &[(&str, i64)] = &[
    ("4320p", 100),
    ("2160p", 90),
    ("1080p", 70),
    ("1080i", 65),
    ("720p", 50),
    ("576p", 30),
    ("480p", 20),
    ("360p", 10),
];

const SOURCE_SCORES: &[(&str, i64)] = &[
    ("UHD.BLU-RAY", 65),
    ("UHD.BLURAY", 65),
    ("UHD BLURAY", 65),
    ("ULTRA HD BLU-RAY", 65),
    ("ULTRA HD BLURAY", 65),
    ("BLU-RAY", 60),
    ("BLURAY", 60),
    ("HD-DVD", 55),
    ("HDDVD", 55),
    ("WEB-DL", 40),
    ("WEBRIP", 40),
    ("WEB", 40),
    ("HDTV", 35),
    ("DVD", 30),
    ("PDTV", 25),
    ("SDTV", 20),
    ("TELECINE", 10),
    ("TELESYNC", 8),
    ("VHS", 5),
    ("WORKPRINT", 3),
    ("CAMERA", 1),
    ("CAM", 1),
];

const CODEC_SCORES: &[(&str, i64)] = &[
    ("AV1", 35),
    ("HEVC", 30),
    ("H.265", 30),
    ("H265", 30),
    ("X265", 30),
    ("AVC", 20),
    ("H.264", 20),
    ("H264", 20),
    ("X264", 20),
    ("VP9", 18),
    ("MPEG-2", 5),
    ("MPEG2", 5),
    ("XVID", 3),
    ("DIVX", 3),
];

const REMUX_BONUS: i64 = 25;
const HDR_BONUS: i64 = 15;
const ATMOS_BONUS: i64 = 10;
const LOSSLESS_AUDIO_BONUS: i64 = 8;

fn hdr_terms() -> &'static [&'static str] {
    &["HDR10+", "HDR10", "HDR", "DOLBY.VISION", "DOLBY VISION", "DV", "HLG"]
}

fn lossless_audio_terms() -> &'static [&'static str] {
    &["DTS-HD", "DTS-HD MA", "TRUEHD", "TRUE HD", "FLAC", "PCM", "LPCM"]
}

fn best_match(name_upper: &str, table: &[(&str, i64)]) -> i64 {
    table
        .iter()
        .filter(|(token, _)| name_upper.contains(token))
        .map(|(_, score)| *score)
        .max()
        .unwrap_or(0)
}

fn word_boundary_re(token: &str) -> Regex {
    Regex::new(&format!(r"\b{}\b", regex::escape(token))).unwrap()
}

/// `score(name) -> int`. Referentially transparent, never negative.
pub fn score(name: &str) -> i64 {
    let upper = name.to_uppercase();

    let mut total = 0;
    total += best_match(&upper, RESOLUTION_SCORES);
    total += best_match(&upper, SOURCE_SCORES);
    total += best_match(&upper, CODEC_SCORES);

    if word_boundary_re("REMUX").is_match(&upper) {
        total += REMUX_BONUS;
    }

    if hdr_terms().iter().any(|t| upper.contains(t)) {
        total += HDR_BONUS;
    }

    if lossless_audio_terms().iter().any(|t| upper.contains(t)) {
        total += LOSSLESS_AUDIO_BONUS;
    }

    if upper.contains("ATMOS") || upper.contains("DTS:X") || upper.contains("DTS-X") {
        total += ATMOS_BONUS;
    }

    total
}

/// Stable human-readable label.
pub fn format_score(score: i64) -> String {
    if score >= 200 {
        format!("★★★★★ ({score})")
    } else if score >= 150 {
        format!("★★★★ ({score})")
    } else if score >= 100 {
        format!("★★★ ({score})")
    } else if score >= 50 {
        format!("★★ ({score})")
    } else {
        format!("★ ({score})")
    }
}
