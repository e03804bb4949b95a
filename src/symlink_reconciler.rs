//! Symlink Reconciler (C11): builds the desired on-disk symlink tree
//! from the store and applies the minimum diff against what's
//! currently there.
//!
//! Grounded in `original_source/organiser.py::_compute_desired_state`/
//! `phase_d_build_symlinks`/`_prune_empty_dirs`/`_find_best_video_file`/
//! `_match_episode_file`, and `original_source/formatting.py` for name
//! sanitisation.

use regex::Regex;
use std::collections::{BTreeMap, HashMap};
use std::os::unix::fs::symlink;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::metadata_client::MetadataClient;
use crate::mount_scanner;
use crate::show_structure;
use crate::store::Store;

pub struct ReconcileOutcome {
    pub films_changed: bool,
    pub shows_changed: bool,
}

fn unsafe_chars_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"[<>:"/\\|?*]"#).unwrap())
}

pub fn sanitise(name: &str) -> String {
    let stripped = unsafe_chars_re().replace_all(name, "");
    let collapsed = stripped.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed.trim_end_matches(['.', ' ']).to_string()
}

pub fn format_media_name(title: &str, year: Option<i32>, tmdb_id: Option<i64>) -> String {
    let mut parts = vec![sanitise(title)];
    if let Some(y) = year.filter(|&y| y != 0) {
        parts.push(format!("({y})"));
    }
    if let Some(id) = tmdb_id.filter(|&id| id != 0) {
        parts.push(format!("[tmdbid={id}]"));
    }
    parts.join(" ")
}

pub fn format_episode(title: &str, year: Option<i32>, season: u32, episode: u32) -> String {
    let mut base = sanitise(title);
    if let Some(y) = year.filter(|&y| y != 0) {
        base = format!("{base} ({y})");
    }
    format!("{base} S{season:02}E{episode:02}")
}

fn find_best_video_file(files: &[PathBuf]) -> Option<PathBuf> {
    if files.is_empty() {
        return None;
    }
    if files.len() == 1 {
        return Some(files[0].clone());
    }
    files
        .iter()
        .max_by_key(|f| std::fs::metadata(f).map(|m| m.len()).unwrap_or(0))
        .cloned()
}

/// Rewrites a host-side mount path to its consumer-side equivalent via
/// a pure prefix substitution; falls back to the raw path when the
/// source doesn't live under `mount_root`.
fn resolve_link_target(source: &Path, mount_root: &Path, consumer_mount_root: &Path) -> String {
    match source.strip_prefix(mount_root) {
        Ok(rel) => consumer_mount_root.join(rel).to_string_lossy().into_owned(),
        Err(_) => source.to_string_lossy().into_owned(),
    }
}

fn collect_existing_symlinks(directory: &Path) -> HashMap<PathBuf, String> {
    let mut existing = HashMap::new();
    if !directory.exists() {
        return existing;
    }
    walk_symlinks(directory, &mut existing);
    existing
}

fn walk_symlinks(dir: &Path, out: &mut HashMap<PathBuf, String>) {
    let Ok(iter) = std::fs::read_dir(dir) else { return };
    for entry in iter.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_symlink() => {
                if let Ok(target) = std::fs::read_link(&path) {
                    out.insert(path, target.to_string_lossy().into_owned());
                }
            }
            Ok(t) if t.is_dir() => walk_symlinks(&path, out),
            _ => {}
        }
    }
}

fn prune_empty_dirs(directory: &Path) {
    if !directory.exists() {
        return;
    }
    let mut dirs = Vec::new();
    collect_dirs(directory, &mut dirs);
    dirs.sort();
    dirs.reverse();
    for dir in dirs {
        if std::fs::read_dir(&dir).map(|mut it| it.next().is_none()).unwrap_or(false) {
            let _ = std::fs::remove_dir(&dir);
        }
    }
}

fn collect_dirs(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(iter) = std::fs::read_dir(dir) else { return };
    for entry in iter.flatten() {
        let path = entry.path();
        if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
            collect_dirs(&path, out);
            out.push(path);
        }
    }
}

pub struct Paths<'a> {
    pub mount_root: &'a Path,
    pub consumer_mount_root: &'a Path,
    pub films_dir: &'a Path,
    pub shows_dir: &'a Path,
}

async fn compute_desired_state(store: &Store, metadata: &MetadataClient, paths: &Paths<'_>) -> BTreeMap<PathBuf, String> {
    let mut desired = BTreeMap::new();

    for film in store.list_all_films().await {
        if film.torrent.is_empty() {
            continue;
        }
        let Some(torrent) = store.get_torrent_by_id(&film.torrent).await else {
            continue;
        };
        let video_files = collect_video_files_under(Path::new(&torrent.path));
        let Some(main_file) = find_best_video_file(&video_files) else {
            continue;
        };

        let name = format_media_name(&film.title, Some(film.year), Some(film.tmdb_id));
        let ext = main_file.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
        let target_path = paths.films_dir.join(&name).join(format!("{name}{ext}"));
        let link_target = resolve_link_target(&main_file, paths.mount_root, paths.consumer_mount_root);
        desired.insert(target_path, link_target);
    }

    let mut torrent_files_cache: HashMap<String, Vec<PathBuf>> = HashMap::new();

    for episode in store.list_all_episodes().await {
        if episode.torrent.is_empty() {
            continue;
        }
        let Some(torrent) = store.get_torrent_by_id(&episode.torrent).await else {
            continue;
        };

        let video_files = torrent_files_cache
            .entry(episode.torrent.clone())
            .or_insert_with(|| collect_video_files_under(Path::new(&torrent.path)))
            .clone();

        let structure = if episode.tmdb_id != 0 {
            metadata.get_show_structure(episode.tmdb_id).await
        } else {
            None
        };

        let Some(matched_file) =
            match_episode_file(&video_files, episode.season, episode.episode, Path::new(&torrent.path), structure.as_ref())
        else {
            continue;
        };

        let show_name = format_media_name(&episode.title, Some(episode.year), Some(episode.tmdb_id));
        let season_dir = paths.shows_dir.join(&show_name).join(format!("Season {:02}", episode.season));
        let episode_name = format_episode(&episode.title, Some(episode.year), episode.season, episode.episode);
        let ext = matched_file.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
        let target_path = season_dir.join(format!("{episode_name}{ext}"));
        let link_target = resolve_link_target(&matched_file, paths.mount_root, paths.consumer_mount_root);
        desired.insert(target_path, link_target);
    }

    desired
}

fn collect_video_files_under(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return if mount_scanner::is_video_file(root) { vec![root.to_path_buf()] } else { vec![] };
    }
    let mut out = Vec::new();
    collect_video_files_recursive(root, &mut out);
    out
}

fn collect_video_files_recursive(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(iter) = std::fs::read_dir(dir) else { return };
    for entry in iter.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_dir() => collect_video_files_recursive(&path, out),
            Ok(t) if t.is_file() && mount_scanner::is_video_file(&path) => out.push(path),
            _ => {}
        }
    }
}

fn match_episode_file(
    video_files: &[PathBuf],
    season: u32,
    episode: u32,
    torrent_root: &Path,
    structure: Option<&show_structure::ShowStructure>,
) -> Option<PathBuf> {
    for vf in video_files {
        let file_name = vf.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let parsed = crate::release_parser::parse(file_name, crate::release_parser::ParseHint::Episode);
        let mut file_season = parsed.season;
        if file_season.is_none() {
            file_season = crate::identifier::extract_season_from_path(vf, torrent_root);
        }

        if let Some(structure) = structure {
            let matched = show_structure::match_file_to_episode(file_name, file_season, &parsed.episodes, structure);
            if let Some(pairs) = matched {
                if pairs.contains(&(season, episode)) {
                    return Some(vf.clone());
                }
                continue;
            }
        }

        if parsed.episodes.contains(&episode) && (file_season.is_none() || file_season == Some(season)) {
            return Some(vf.clone());
        }
    }
    None
}

/// Diffs `desired` against what's on disk and applies the minimum set
/// of changes. Never unlinks-then-recreates a symlink whose target
/// already matches — the inode must survive untouched so an actively
/// playing file isn't disrupted.
pub async fn reconcile(store: &Store, metadata: &MetadataClient, paths: &Paths<'_>) -> ReconcileOutcome {
    info!("symlink_reconciler: syncing symlinks");
    let desired = compute_desired_state(store, metadata, paths).await;

    let mut on_disk = collect_existing_symlinks(paths.films_dir);
    on_disk.extend(collect_existing_symlinks(paths.shows_dir));

    let mut created = 0;
    let mut updated = 0;
    let mut removed = 0;
    let mut films_changed = false;
    let mut shows_changed = false;

    for (target_path, link_target) in &desired {
        let is_films = target_path.starts_with(paths.films_dir);
        match on_disk.get(target_path) {
            Some(existing_target) if existing_target == link_target => continue,
            Some(_) => {
                if std::fs::remove_file(target_path).is_err() {
                    warn!("symlink_reconciler: failed to unlink {}", target_path.display());
                    continue;
                }
                if symlink(link_target, target_path).is_err() {
                    warn!("symlink_reconciler: failed to relink {}", target_path.display());
                    continue;
                }
                info!("symlink_reconciler: updated {} -> {link_target}", target_path.display());
                updated += 1;
            }
            None => {
                if let Some(parent) = target_path.parent() {
                    if std::fs::create_dir_all(parent).is_err() {
                        warn!("symlink_reconciler: failed to create {}", parent.display());
                        continue;
                    }
                }
                if symlink(link_target, target_path).is_err() {
                    warn!("symlink_reconciler: failed to create {}", target_path.display());
                    continue;
                }
                info!("symlink_reconciler: created {} -> {link_target}", target_path.display());
                created += 1;
            }
        }
        if is_films {
            films_changed = true;
        } else {
            shows_changed = true;
        }
    }

    for target_path in on_disk.keys() {
        if desired.contains_key(target_path) {
            continue;
        }
        let is_films = target_path.starts_with(paths.films_dir);
        if std::fs::remove_file(target_path).is_err() {
            warn!("symlink_reconciler: failed to remove stale {}", target_path.display());
            continue;
        }
        info!("symlink_reconciler: removed {}", target_path.display());
        removed += 1;
        if is_films {
            films_changed = true;
        } else {
            shows_changed = true;
        }
    }

    prune_empty_dirs(paths.films_dir);
    prune_empty_dirs(paths.shows_dir);

    if created + updated + removed > 0 {
        info!("symlink_reconciler: {created} created, {updated} updated, {removed} removed");
    } else {
        info!("symlink_reconciler: up to date, no changes");
    }

    ReconcileOutcome { films_changed, shows_changed }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitise_strips_unsafe_characters_and_trailing_dots() {
        assert_eq!(sanitise(r#"Weird: Title? / Name*.. "#), "Weird Title Name");
    }

    #[test]
    fn sanitise_collapses_internal_whitespace() {
        assert_eq!(sanitise("Too   Many   Spaces"), "Too Many Spaces");
    }

    #[test]
    fn format_media_name_includes_year_and_tmdb_id() {
        assert_eq!(format_media_name("Arrival", Some(2016), Some(329865)), "Arrival (2016) [tmdbid=329865]");
    }

    #[test]
    fn format_episode_omits_tmdb_id() {
        assert_eq!(format_episode("The Show", Some(2020), 2, 6), "The Show (2020) S02E06");
    }

    #[test]
    fn resolve_link_target_rewrites_prefix() {
        let source = Path::new("/mnt/zurg/Show/ep.mkv");
        let target = resolve_link_target(source, Path::new("/mnt/zurg"), Path::new("/remote/zurg"));
        assert_eq!(target, "/remote/zurg/Show/ep.mkv");
    }

    #[test]
    fn resolve_link_target_falls_back_when_outside_mount_root() {
        let source = Path::new("/other/place/ep.mkv");
        let target = resolve_link_target(source, Path::new("/mnt/zurg"), Path::new("/remote/zurg"));
        assert_eq!(target, "/other/place/ep.mkv");
    }
}
