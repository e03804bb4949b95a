//! Repair state machine (C10): what happens to a torrent row once its
//! path disappears from the mount.
//!
//! Grounded in the teacher's `repair.rs` for the `addMagnet` →
//! `selectVideoFiles` → `delete(old)` step sequence and log phrasing,
//! but restructured per spec.md §4.10: state lives on the store's
//! `repair_attempts` field rather than in an in-process health map —
//! there is no served filesystem here to hide a torrent from while it
//! repairs.

use serde_json::json;
use tracing::{info, warn};

use crate::debrid_client::DebridClient;
use crate::store::{Store, Torrent};

/// Routes one torrent whose path no longer exists on the mount through
/// repair-or-delete. Leaves the row untouched on a successful or
/// retryable attempt; clears media relations and deletes the row once
/// repair is disabled, unavailable, or exhausted.
pub async fn handle_missing_torrent(
    store: &Store,
    debrid: Option<&DebridClient>,
    torrent: &Torrent,
    repair_enabled: bool,
    max_repair_attempts: u32,
) {
    let can_attempt =
        repair_enabled && debrid.is_some() && !torrent.hash.is_empty() && torrent.repair_attempts < max_repair_attempts;

    if can_attempt {
        let debrid = debrid.expect("checked above");
        let succeeded = attempt_repair(debrid, torrent).await;
        let attempts = torrent.repair_attempts + 1;
        store.update_torrent(&torrent.id, json!({ "repair_attempts": attempts })).await;

        if succeeded {
            info!("repair: succeeded for {} — next scan will rediscover the folder", torrent.name);
            return;
        }

        if attempts < max_repair_attempts {
            warn!(
                "repair: attempt {attempts}/{max_repair_attempts} failed for {}, retries remain",
                torrent.name
            );
            return;
        }

        warn!("repair: exhausted {max_repair_attempts} attempts for {}, deleting", torrent.name);
    } else if !torrent.hash.is_empty() && repair_enabled {
        warn!("repair: attempts exhausted for {}, deleting", torrent.name);
    } else {
        info!("repair: skipped for {} (no hash cached or repair disabled), deleting", torrent.name);
    }

    delete_torrent_row(store, torrent).await;
}

async fn attempt_repair(debrid: &DebridClient, torrent: &Torrent) -> bool {
    let Some(new_id) = debrid.add_magnet(&torrent.hash).await else {
        warn!("repair: addMagnet returned nothing for {}", torrent.name);
        return false;
    };

    debrid.select_video_files(&new_id).await;

    if !torrent.rd_id.is_empty() && torrent.rd_id != new_id {
        debrid.delete_torrent(&torrent.rd_id).await;
    }

    true
}

async fn delete_torrent_row(store: &Store, torrent: &Torrent) {
    for film in store.list_films_by_torrent(&torrent.id).await {
        store.update_film(&film.id, json!({ "torrent": "" })).await;
    }
    for episode in store.list_episodes_by_torrent(&torrent.id).await {
        store.update_episode(&episode.id, json!({ "torrent": "" })).await;
    }
    store.delete_torrent(&torrent.id).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn torrent(hash: &str, repair_attempts: u32) -> Torrent {
        Torrent {
            id: "t1".into(),
            name: "Example".into(),
            path: "/mnt/zurg/Example".into(),
            hash: hash.into(),
            repair_attempts,
            ..Default::default()
        }
    }

    #[test]
    fn eligible_when_hash_present_and_attempts_below_max() {
        let t = torrent("abc123", 1);
        let eligible = !t.hash.is_empty() && t.repair_attempts < 3;
        assert!(eligible);
    }

    #[test]
    fn ineligible_once_attempts_reach_max() {
        let t = torrent("abc123", 3);
        let eligible = !t.hash.is_empty() && t.repair_attempts < 3;
        assert!(!eligible);
    }

    #[test]
    fn ineligible_without_a_cached_hash() {
        let t = torrent("", 0);
        let eligible = !t.hash.is_empty() && t.repair_attempts < 3;
        assert!(!eligible);
    }
}
