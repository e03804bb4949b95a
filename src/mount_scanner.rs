//! Walks the debrid mount root into `{ entry name → video files }`.
//!
//! Grounded in `original_source/organiser.py::_scan_zurg_mount` and
//! `media_resolver.py::get_video_files`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const VIDEO_EXTENSIONS: &[&str] = &[
    ".mkv", ".mp4", ".avi", ".mov", ".wmv", ".flv", ".webm", ".m4v", ".mpg", ".mpeg", ".ts",
    ".vob", ".m2ts", ".iso",
];

pub fn is_video_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_lowercase();
    VIDEO_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
}

/// Each top-level entry under the mount root becomes one key: a
/// directory is walked recursively for video files, a loose video file
/// is its own single-element entry.
pub fn scan(mount_root: &Path) -> BTreeMap<String, Vec<PathBuf>> {
    let mut entries = BTreeMap::new();

    let dir_iter = match std::fs::read_dir(mount_root) {
        Ok(it) => it,
        Err(e) => {
            warn!("mount_scanner: failed to read mount root {}: {e}", mount_root.display());
            return entries;
        }
    };

    for item in dir_iter {
        let item = match item {
            Ok(i) => i,
            Err(e) => {
                warn!("mount_scanner: failed to read directory entry: {e}");
                continue;
            }
        };
        let path = item.path();
        let name = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };

        let file_type = match item.file_type() {
            Ok(t) => t,
            Err(e) => {
                warn!("mount_scanner: failed to stat {}: {e}", path.display());
                continue;
            }
        };

        if file_type.is_dir() {
            let mut files = Vec::new();
            walk_dir(&path, &mut files);
            entries.insert(name, files);
        } else if file_type.is_file() && is_video_file(&path) {
            entries.insert(name, vec![path]);
        }
    }

    entries
}

fn walk_dir(dir: &Path, out: &mut Vec<PathBuf>) {
    let iter = match std::fs::read_dir(dir) {
        Ok(it) => it,
        Err(e) => {
            warn!("mount_scanner: failed to walk {}: {e}", dir.display());
            return;
        }
    };
    for item in iter {
        let Ok(item) = item else { continue };
        let path = item.path();
        match item.file_type() {
            Ok(t) if t.is_dir() => walk_dir(&path, out),
            Ok(t) if t.is_file() && is_video_file(&path) => out.push(path),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn scans_nested_directory_and_loose_file() {
        let tmp = std::env::temp_dir().join(format!("mount_scanner_test_{}", std::process::id()));
        let show_dir = tmp.join("Show.Pack").join("Season 01");
        fs::create_dir_all(&show_dir).unwrap();
        fs::write(show_dir.join("Show.S01E01.mkv"), b"x").unwrap();
        fs::write(show_dir.join("notes.nfo"), b"x").unwrap();
        fs::write(tmp.join("Loose.Movie.2020.mkv"), b"x").unwrap();

        let entries = scan(&tmp);
        assert_eq!(entries.get("Show.Pack").map(Vec::len), Some(1));
        assert_eq!(entries.get("Loose.Movie.2020.mkv").map(Vec::len), Some(1));

        fs::remove_dir_all(&tmp).ok();
    }

    #[test]
    fn missing_mount_root_returns_empty_map() {
        let entries = scan(Path::new("/nonexistent/does/not/exist"));
        assert!(entries.is_empty());
    }
}
