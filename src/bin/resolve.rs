//! Manual resolve CLI: force-identify a torrent that the orchestrator
//! left `manual` against a known catalogue ID.
//!
//! Grounded in `original_source/resolve.py`. The next scan cycle picks
//! up whatever this writes and builds symlinks for it.

use clap::{Parser, ValueEnum};
use mulecolt_organiser::config::Config;
use mulecolt_organiser::identifier::{self, extract_season_from_path};
use mulecolt_organiser::metadata_client::{MediaType, MetadataClient};
use mulecolt_organiser::mount_scanner;
use mulecolt_organiser::release_parser::{self, ParseHint};
use mulecolt_organiser::show_structure;
use mulecolt_organiser::store::Store;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TypeArg {
    Film,
    Show,
}

/// Manually assign a catalogue ID to a torrent that couldn't be identified automatically.
#[derive(Parser, Debug)]
#[command(name = "resolve")]
struct Args {
    /// Record store ID of the torrent.
    torrent_id: String,
    /// Catalogue ID to assign (movie or TV show).
    tmdb_id: i64,
    /// Force the type when an ID collides between a movie and a show.
    #[arg(value_enum)]
    media_type: Option<TypeArg>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt::init();
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("config error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let store = Store::new(config.pocketbase_url.clone());
    let metadata = MetadataClient::new(config.tmdb_api_key.clone(), config.tmdb_base.clone());

    let Some(torrent) = store.get_torrent_by_id(&args.torrent_id).await else {
        eprintln!("torrent '{}' not found in the record store", args.torrent_id);
        return ExitCode::FAILURE;
    };

    println!("Torrent: {} (score: {})", torrent.name, torrent.score);
    println!("Path:    {}", torrent.path);

    let hint = args.media_type.map(|t| match t {
        TypeArg::Film => MediaType::Film,
        TypeArg::Show => MediaType::Show,
    });

    println!("Looking up catalogue ID {}...", args.tmdb_id);
    let Some((media_type, matched)) = metadata.lookup_by_id(args.tmdb_id, hint).await else {
        eprintln!("could not find catalogue ID {}", args.tmdb_id);
        return ExitCode::FAILURE;
    };
    println!("Found:   {} ({}) [{media_type:?}]", matched.title, matched.year);

    let existing_films = store.list_films_by_torrent(&args.torrent_id).await;
    let existing_episodes = store.list_episodes_by_torrent(&args.torrent_id).await;
    if !existing_films.is_empty() || !existing_episodes.is_empty() {
        println!(
            "Removing {} existing film(s) and {} existing episode(s)...",
            existing_films.len(),
            existing_episodes.len()
        );
        for film in existing_films {
            store.delete_film(&film.id).await;
        }
        for episode in existing_episodes {
            store.delete_episode(&episode.id).await;
        }
    }

    match media_type {
        MediaType::Film => {
            let outcome = identifier::resolve_film_duplicate(
                &store,
                &torrent.id,
                torrent.score,
                matched.tmdb_id,
                &matched.title,
                Some(matched.year),
            )
            .await;
            println!("Film resolution: {outcome:?}");
        }
        MediaType::Show => {
            resolve_as_show(&store, &metadata, &torrent, matched.tmdb_id, &matched.title, matched.year).await;
        }
    }

    store.update_torrent(&torrent.id, json!({ "manual": false })).await;
    println!("Done. The next scan will build symlinks.");
    ExitCode::SUCCESS
}

async fn resolve_as_show(
    store: &Store,
    metadata: &MetadataClient,
    torrent: &mulecolt_organiser::store::Torrent,
    tmdb_id: i64,
    title: &str,
    year: i32,
) {
    let torrent_root = PathBuf::from(&torrent.path);
    let video_files = get_video_files(&torrent_root);
    if video_files.is_empty() {
        eprintln!("no video files found at {}", torrent.path);
        return;
    }

    let structure = metadata.get_show_structure(tmdb_id).await;
    if let Some(ref structure) = structure {
        let summary = structure
            .season_numbers()
            .iter()
            .map(|s| format!("S{s:02}x{}", structure.episodes_in_season(*s)))
            .collect::<Vec<_>>()
            .join(", ");
        println!("Catalogue structure: {} episodes ({summary})", structure.total_episodes());
    }

    let mut episodes_found = 0;
    for video_path in &video_files {
        let file_name = video_path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let parsed = release_parser::parse(file_name, ParseHint::Episode);

        let mut season = parsed.season;
        if season.is_none() {
            season = extract_season_from_path(video_path, &torrent_root);
        }

        let matched_pairs = structure
            .as_ref()
            .and_then(|s| show_structure::match_file_to_episode(file_name, season, &parsed.episodes, s));

        let pairs = if let Some(pairs) = matched_pairs {
            pairs
        } else {
            let season = season.unwrap_or(1);
            if parsed.episodes.is_empty() {
                println!("  Skipping (no episode detected): {file_name}");
                continue;
            }
            parsed.episodes.iter().map(|&ep| (season, ep)).collect()
        };

        for (season, episode) in pairs {
            episodes_found += 1;
            let outcome =
                identifier::resolve_episode_duplicate(store, &torrent.id, torrent.score, tmdb_id, title, Some(year), season, episode)
                    .await;
            println!("  S{season:02}E{episode:02}: {outcome:?}");
        }
    }

    if episodes_found == 0 {
        eprintln!("no episodes could be parsed from the video files");
    }
}

fn get_video_files(root: &Path) -> Vec<PathBuf> {
    if root.is_file() {
        return if mount_scanner::is_video_file(root) { vec![root.to_path_buf()] } else { vec![] };
    }
    let mut out = Vec::new();
    walk(root, &mut out);
    out
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(iter) = std::fs::read_dir(dir) else { return };
    for entry in iter.flatten() {
        let path = entry.path();
        match entry.file_type() {
            Ok(t) if t.is_dir() => walk(&path, out),
            Ok(t) if t.is_file() && mount_scanner::is_video_file(&path) => out.push(path),
            _ => {}
        }
    }
}
