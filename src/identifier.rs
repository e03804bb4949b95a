//! Identification + duplicate resolution (C9): classify an
//! unidentified torrent, resolve it against the metadata catalogue,
//! and reconcile the result against whatever already occupies that
//! film/episode slot in the store.
//!
//! Grounded in `original_source/organiser.py::phase_b_identify`/
//! `_identify_film`/`_identify_show` and `media_resolver.py`'s
//! `resolve_film_duplicate`/`resolve_episode_duplicate`/
//! `maybe_archive_orphan`.

use regex::Regex;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use tracing::{info, warn};

use crate::classifier::{self, MediaKind};
use crate::metadata_client::MetadataClient;
use crate::release_parser::{self, ParseHint};
use crate::show_structure;
use crate::store::{Store, Torrent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Created,
    Relinked,
    Won,
    Lost,
}

fn season_dir_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)(?:Season|S)\s*(\d+)").unwrap())
}

/// Attempts identification as `classified` first, falling back to the
/// other media kind on failure. Marks the torrent `manual` if both fail.
pub async fn identify(
    store: &Store,
    metadata: &MetadataClient,
    folder_name: &str,
    torrent: &Torrent,
    video_files: &[PathBuf],
) {
    let video_names: Vec<String> = video_files
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(String::from))
        .collect();
    let classified = classifier::classify(folder_name, &video_names);

    let identified = match classified {
        MediaKind::Movie => identify_film(store, metadata, folder_name, torrent).await,
        MediaKind::Show => identify_show(store, metadata, folder_name, video_files, torrent).await,
    };

    let identified = if identified {
        true
    } else {
        match classified {
            MediaKind::Movie => identify_show(store, metadata, folder_name, video_files, torrent).await,
            MediaKind::Show => identify_film(store, metadata, folder_name, torrent).await,
        }
    };

    if !identified {
        store.update_torrent(&torrent.id, json!({ "manual": true })).await;
        warn!("identifier: could not identify {folder_name} — marked for manual resolution");
    }
}

pub async fn identify_film(store: &Store, metadata: &MetadataClient, folder_name: &str, torrent: &Torrent) -> bool {
    let parsed = release_parser::parse(folder_name, ParseHint::Movie);
    let mut title = parsed.title.clone();
    let mut year = parsed.year.filter(|y| release_parser::is_valid_year(*y, Some(folder_name)));

    let mut hit = metadata.search_film(&title, year).await;

    if hit.is_none() && release_parser::is_meaningless(&title) && !torrent.rd_filename.is_empty() {
        info!("identifier: falling back to debrid filename for film: {}", torrent.rd_filename);
        let reparsed = release_parser::parse(&torrent.rd_filename, ParseHint::Movie);
        title = reparsed.title;
        year = reparsed.year.filter(|y| release_parser::is_valid_year(*y, Some(&torrent.rd_filename)));
        hit = metadata.search_film(&title, year).await;
    }

    let Some(matched) = hit else { return false };

    resolve_film_duplicate(store, &torrent.id, torrent.score, matched.tmdb_id, &matched.title, matched.year).await;
    true
}

pub async fn identify_show(
    store: &Store,
    metadata: &MetadataClient,
    folder_name: &str,
    video_files: &[PathBuf],
    torrent: &Torrent,
) -> bool {
    let folder_parsed = release_parser::parse(folder_name, ParseHint::Episode);
    let mut title = folder_parsed.title.clone();
    let mut year = folder_parsed.year.filter(|y| release_parser::is_valid_year(*y, Some(folder_name)));

    let mut hit = metadata.search_tv(&title, year).await;

    if hit.is_none() && release_parser::is_meaningless(&title) && !torrent.rd_filename.is_empty() {
        info!("identifier: falling back to debrid filename for show: {}", torrent.rd_filename);
        let reparsed = release_parser::parse(&torrent.rd_filename, ParseHint::Episode);
        title = reparsed.title;
        year = reparsed.year.filter(|y| release_parser::is_valid_year(*y, Some(&torrent.rd_filename)));
        hit = metadata.search_tv(&title, year).await;
    }

    let Some(matched) = hit else { return false };
    let tmdb_id = matched.tmdb_id;
    title = matched.title;
    year = Some(matched.year);

    let structure = metadata.get_show_structure(tmdb_id).await;
    let torrent_root = PathBuf::from(&torrent.path);

    let mut any_found = false;
    let mut all_lost = true;

    for video_path in video_files {
        let file_name = video_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let file_parsed = release_parser::parse(file_name, ParseHint::Episode);

        let mut season = file_parsed.season;
        if season.is_none() {
            season = extract_season_from_path(video_path, &torrent_root);
        }

        let mut matched_pairs: Option<Vec<(u32, u32)>> = None;
        if let Some(ref structure) = structure {
            matched_pairs = show_structure::match_file_to_episode(file_name, season, &file_parsed.episodes, structure);
        }

        let pairs = if let Some(pairs) = matched_pairs.take() {
            pairs
        } else {
            let season = season.unwrap_or(1);
            if file_parsed.episodes.is_empty() {
                warn!("identifier: skipping {file_name} (no episode detected)");
                continue;
            }
            file_parsed.episodes.iter().map(|&ep| (season, ep)).collect()
        };

        for (season, episode) in pairs {
            any_found = true;
            let outcome = resolve_episode_duplicate(store, &torrent.id, torrent.score, tmdb_id, &title, year, season, episode).await;
            if outcome != ResolveOutcome::Lost {
                all_lost = false;
            }
        }
    }

    if !any_found {
        return false;
    }

    if all_lost {
        store.update_torrent(&torrent.id, json!({ "archived": true })).await;
        info!("identifier: torrent archived (all episodes superseded): {folder_name}");
    }

    true
}

pub fn extract_season_from_path(video_path: &Path, torrent_root: &Path) -> Option<u32> {
    let rel = video_path.strip_prefix(torrent_root).ok()?;
    let mut components: Vec<_> = rel.components().collect();
    components.pop(); // drop the filename itself
    for component in components {
        if let Some(part) = component.as_os_str().to_str() {
            if let Some(caps) = season_dir_re().captures(part) {
                if let Ok(season) = caps[1].parse() {
                    return Some(season);
                }
            }
        }
    }
    None
}

pub async fn resolve_film_duplicate(
    store: &Store,
    torrent_id: &str,
    torrent_score: i64,
    tmdb_id: i64,
    title: &str,
    year: Option<i32>,
) -> ResolveOutcome {
    let year = year.unwrap_or(0);
    let existing = store.get_film_by_tmdb(tmdb_id).await;

    let Some(existing) = existing else {
        store.create_film(torrent_id, tmdb_id, title, year).await;
        info!("identifier: film created: {title} ({year}) [tmdbid={tmdb_id}] {}", crate::scoring::format_score(torrent_score));
        return ResolveOutcome::Created;
    };

    if existing.torrent.is_empty() {
        store.update_film(&existing.id, json!({ "torrent": torrent_id })).await;
        info!("identifier: film re-linked: {title} ({year})");
        return ResolveOutcome::Relinked;
    }

    let existing_score = store
        .get_torrent_by_id(&existing.torrent)
        .await
        .map(|t| t.score)
        .unwrap_or(0);

    if torrent_score > existing_score {
        store.update_film(&existing.id, json!({ "torrent": torrent_id })).await;
        store.update_torrent(&existing.torrent, json!({ "archived": true })).await;
        info!("identifier: film new torrent wins: {title} ({year})");
        ResolveOutcome::Won
    } else {
        store.update_torrent(torrent_id, json!({ "archived": true })).await;
        info!("identifier: film existing torrent wins, archiving new: {title} ({year})");
        ResolveOutcome::Lost
    }
}

pub async fn resolve_episode_duplicate(
    store: &Store,
    torrent_id: &str,
    torrent_score: i64,
    tmdb_id: i64,
    title: &str,
    year: Option<i32>,
    season: u32,
    episode: u32,
) -> ResolveOutcome {
    let year = year.unwrap_or(0);
    let existing = store.get_episode(tmdb_id, season, episode).await;

    let Some(existing) = existing else {
        store.create_episode(torrent_id, tmdb_id, title, year, season, episode).await;
        info!("identifier: episode created: {title} S{season:02}E{episode:02} [tmdbid={tmdb_id}]");
        return ResolveOutcome::Created;
    };

    if existing.torrent.is_empty() {
        store.update_episode(&existing.id, json!({ "torrent": torrent_id })).await;
        info!("identifier: episode re-linked: {title} S{season:02}E{episode:02}");
        return ResolveOutcome::Relinked;
    }

    let existing_score = store
        .get_torrent_by_id(&existing.torrent)
        .await
        .map(|t| t.score)
        .unwrap_or(0);

    if torrent_score > existing_score {
        store.update_episode(&existing.id, json!({ "torrent": torrent_id })).await;
        info!("identifier: episode new torrent wins: {title} S{season:02}E{episode:02}");
        maybe_archive_orphan(store, &existing.torrent).await;
        ResolveOutcome::Won
    } else {
        info!("identifier: episode existing wins: {title} S{season:02}E{episode:02}");
        ResolveOutcome::Lost
    }
}

/// Archives a torrent once it no longer provides any film or episode.
pub async fn maybe_archive_orphan(store: &Store, torrent_id: &str) {
    if !store.list_films_by_torrent(torrent_id).await.is_empty() {
        return;
    }
    if !store.list_episodes_by_torrent(torrent_id).await.is_empty() {
        return;
    }
    store.update_torrent(torrent_id, json!({ "archived": true })).await;
    info!("identifier: torrent archived (no media remaining): {torrent_id}");
}
