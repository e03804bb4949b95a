//! Scan Orchestrator (C12): sequences one reconciliation cycle and
//! drives the outer loop that waits on a scan interval or a webhook
//! trigger, whichever comes first.
//!
//! Grounded in `original_source/organiser.py::run_scan`'s phase
//! ordering; the background-loop shape is kept from the teacher's
//! `tasks.rs::run_scan_loop` (`tokio::spawn`, `buffer_unordered(1)`
//! concurrency style for per-torrent identification work).

use futures_util::stream::{self, StreamExt};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::config::Config;
use crate::debrid_client::DebridClient;
use crate::identifier;
use crate::media_refresh::MediaRefreshClient;
use crate::metadata_client::MetadataClient;
use crate::mount_scanner;
use crate::release_parser;
use crate::repair;
use crate::scoring;
use crate::store::{Store, Torrent};
use crate::symlink_reconciler::{self, Paths};

#[derive(Debug, Clone, Default)]
struct RdMeta {
    hash: String,
    rd_id: String,
    rd_filename: String,
}

pub struct Orchestrator {
    config: Config,
    store: Store,
    metadata: MetadataClient,
    debrid: Option<DebridClient>,
    media_refresh: Option<MediaRefreshClient>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        store: Store,
        metadata: MetadataClient,
        debrid: Option<DebridClient>,
        media_refresh: Option<MediaRefreshClient>,
    ) -> Self {
        Self { config, store, metadata, debrid, media_refresh }
    }

    /// Runs forever, waking on the earlier of the scan interval or the
    /// webhook's single-shot signal; the signal is cleared right after
    /// the wait returns so triggers during a cycle must be re-sent.
    pub async fn run_loop(&self, scan_signal: Arc<Notify>) {
        loop {
            self.run_cycle().await;

            let interval = Duration::from_secs(self.config.scan_interval_secs);
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = scan_signal.notified() => {
                    info!("orchestrator: woken by webhook trigger");
                }
            }
        }
    }

    pub async fn run_cycle(&self) {
        info!("orchestrator: scan cycle starting");

        let entries = mount_scanner::scan(&PathBuf::from(&self.config.mount_root));
        let to_identify = self.phase_a_sync(&entries).await;
        self.phase_b_identify(to_identify, &entries).await;
        self.phase_c_detect_removed().await;

        let paths = Paths {
            mount_root: Path::new(&self.config.mount_root),
            consumer_mount_root: Path::new(&self.config.consumer_mount_root),
            films_dir: Path::new(&self.config.films_dir),
            shows_dir: Path::new(&self.config.shows_dir),
        };
        let outcome = symlink_reconciler::reconcile(&self.store, &self.metadata, &paths).await;

        if let Some(media_refresh) = &self.media_refresh {
            media_refresh.trigger_refresh(outcome.films_changed, outcome.shows_changed).await;
        }

        if self.config.cleanup_archived {
            self.phase_e_cleanup_archived().await;
        }

        info!("orchestrator: scan cycle complete");
    }

    async fn phase_a_sync(&self, entries: &BTreeMap<String, Vec<PathBuf>>) -> Vec<(String, Torrent)> {
        let mut to_identify = Vec::new();
        let (rd_primary, rd_reverse) = build_rd_lookup(self.debrid.as_ref(), entries).await;

        for (folder_name, video_files) in entries {
            let torrent_path = PathBuf::from(&self.config.mount_root).join(folder_name);
            let torrent_path_str = torrent_path.to_string_lossy().into_owned();
            let existing = self.store.get_torrent_by_path(&torrent_path_str).await;

            let rd_meta = match rd_primary.get(folder_name) {
                Some(meta) => Some(meta),
                None => match rd_reverse.get(folder_name) {
                    Some(meta) => {
                        info!("orchestrator: RD reverse match: {folder_name} -> {}", meta.rd_filename);
                        Some(meta)
                    }
                    None => None,
                },
            };

            let Some(mut existing) = existing else {
                let score_name = rd_meta
                    .map(|m| m.rd_filename.as_str())
                    .filter(|s| !s.is_empty())
                    .or_else(|| video_files.first().and_then(|p| p.file_name()).and_then(|n| n.to_str()))
                    .unwrap_or(folder_name);
                let score = scoring::score(score_name);
                if let Some(torrent) = self.store.create_torrent(folder_name, &torrent_path_str).await {
                    let fields = json!({
                        "score": score,
                        "hash": rd_meta.map(|m| m.hash.clone()).unwrap_or_default(),
                        "rd_id": rd_meta.map(|m| m.rd_id.clone()).unwrap_or_default(),
                        "rd_filename": rd_meta.map(|m| m.rd_filename.clone()).unwrap_or_default(),
                    });
                    self.store.update_torrent(&torrent.id, fields).await;
                    info!("orchestrator: new torrent {folder_name} {}", scoring::format_score(score));
                    to_identify.push((folder_name.clone(), torrent));
                }
                continue;
            };

            let mut updates = Map::new();
            if let Some(meta) = rd_meta {
                if !meta.hash.is_empty() && existing.hash != meta.hash {
                    updates.insert("hash".into(), json!(meta.hash));
                    existing.hash = meta.hash.clone();
                }
                if !meta.rd_id.is_empty() && existing.rd_id != meta.rd_id {
                    updates.insert("rd_id".into(), json!(meta.rd_id));
                    existing.rd_id = meta.rd_id.clone();
                }
                if !meta.rd_filename.is_empty() && existing.rd_filename != meta.rd_filename {
                    updates.insert("rd_filename".into(), json!(meta.rd_filename));
                    existing.rd_filename = meta.rd_filename.clone();
                    let new_score = scoring::score(&meta.rd_filename);
                    if new_score > existing.score {
                        updates.insert("score".into(), json!(new_score));
                        existing.score = new_score;
                    }
                }
            }
            if existing.repair_attempts > 0 {
                updates.insert("repair_attempts".into(), json!(0));
                existing.repair_attempts = 0;
            }
            if !updates.is_empty() {
                self.store.update_torrent(&existing.id, Value::Object(updates)).await;
            }

            if existing.archived || existing.manual {
                continue;
            }

            let has_films = !self.store.list_films_by_torrent(&existing.id).await.is_empty();
            let has_episodes = !self.store.list_episodes_by_torrent(&existing.id).await.is_empty();
            if has_films || has_episodes {
                continue;
            }

            to_identify.push((folder_name.clone(), existing));
        }

        to_identify
    }

    async fn phase_b_identify(
        &self,
        to_identify: Vec<(String, crate::store::Torrent)>,
        entries: &std::collections::BTreeMap<String, Vec<PathBuf>>,
    ) {
        if to_identify.is_empty() {
            info!("orchestrator: no torrents need identification");
            return;
        }
        info!("orchestrator: identifying {} torrent(s)", to_identify.len());

        stream::iter(to_identify)
            .for_each_concurrent(1, |(folder_name, torrent)| async move {
                let video_files = entries.get(&folder_name).cloned().unwrap_or_default();
                identifier::identify(&self.store, &self.metadata, &folder_name, &torrent, &video_files).await;
            })
            .await;
    }

    async fn phase_c_detect_removed(&self) {
        for torrent in self.store.list_all_torrents().await {
            if torrent.archived {
                continue;
            }
            if Path::new(&torrent.path).exists() {
                continue;
            }
            repair::handle_missing_torrent(
                &self.store,
                self.debrid.as_ref(),
                &torrent,
                self.config.repair_enabled,
                self.config.max_repair_attempts,
            )
            .await;
        }
    }

    async fn phase_e_cleanup_archived(&self) {
        let Some(debrid) = &self.debrid else { return };
        for torrent in self.store.list_archived_torrents().await {
            if !torrent.rd_id.is_empty() {
                debrid.delete_torrent(&torrent.rd_id).await;
            }
            if self.store.delete_torrent(&torrent.id).await {
                info!("orchestrator: cleaned up archived torrent {}", torrent.name);
            } else {
                warn!("orchestrator: failed to delete archived torrent {}", torrent.name);
            }
        }
    }
}

/// Lists RD's torrents once per cycle and builds two lookup maps: by
/// `rd_filename` (the common case) and, for entries whose title looks
/// meaningless or that don't match any mount entry by name, a reverse
/// index by each file's basename pulled from `/torrents/info`.
///
/// Grounded in `organiser.py::_build_rd_lookup`.
async fn build_rd_lookup(
    debrid: Option<&DebridClient>,
    entries: &BTreeMap<String, Vec<PathBuf>>,
) -> (HashMap<String, RdMeta>, HashMap<String, RdMeta>) {
    let Some(debrid) = debrid else {
        return (HashMap::new(), HashMap::new());
    };

    let mut primary: HashMap<String, RdMeta> = HashMap::new();
    let mut needs_info: Vec<RdMeta> = Vec::new();

    for t in debrid.list_all_torrents().await {
        if t.filename.is_empty() {
            continue;
        }
        let meta = RdMeta { hash: t.hash.clone(), rd_id: t.id.clone(), rd_filename: t.filename.clone() };

        let stem = Path::new(&t.filename).file_stem().and_then(|s| s.to_str()).unwrap_or(&t.filename);
        let is_meaningless = release_parser::is_meaningless(stem);
        let is_unmatched = !entries.contains_key(&t.filename);
        if is_meaningless || is_unmatched {
            needs_info.push(meta.clone());
        }
        primary.insert(t.filename, meta);
    }
    info!("orchestrator: RD API fetched {} torrent(s) for hash hydration", primary.len());

    let mut reverse: HashMap<String, RdMeta> = HashMap::new();
    if !needs_info.is_empty() {
        info!("orchestrator: RD API enriching {} torrent(s) via /torrents/info", needs_info.len());
        for mut meta in needs_info {
            let Some(info) = debrid.get_torrent_info(&meta.rd_id).await else { continue };

            if !info.original_filename.is_empty() && info.original_filename != meta.rd_filename {
                info!("orchestrator: RD API: original_filename for {:?} -> {:?}", meta.rd_filename, info.original_filename);
                meta.rd_filename = info.original_filename;
            }

            for f in &info.files {
                if let Some(basename) = Path::new(&f.path).file_name().and_then(|n| n.to_str()) {
                    reverse.entry(basename.to_string()).or_insert_with(|| meta.clone());
                }
            }
        }
        if !reverse.is_empty() {
            info!("orchestrator: RD API reverse index has {} file-name mapping(s)", reverse.len());
        }
    }

    (primary, reverse)
}
