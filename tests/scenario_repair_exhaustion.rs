//! End-to-end scenario 5 from spec.md §8: a torrent whose path has
//! disappeared and whose repair attempts are exhausted gets its media
//! relations cleared and its row deleted.

mod common;

use mulecolt_organiser::debrid_client::DebridClient;
use mulecolt_organiser::identifier;
use mulecolt_organiser::repair;
use mulecolt_organiser::store::Store;
use serde_json::json;

#[tokio::test]
async fn exhausted_repair_clears_relations_and_deletes_the_row() {
    let store_server = common::start().await;
    let store = Store::new(store_server.base_url());

    let torrent = store.create_torrent("Vanished.Show.S01", "/mnt/zurg/Vanished.Show.S01").await.unwrap();
    store
        .update_torrent(
            &torrent.id,
            json!({ "hash": "deadbeef", "repair_attempts": 3 }),
        )
        .await;
    let torrent = store.get_torrent_by_id(&torrent.id).await.unwrap();

    let outcome = identifier::resolve_episode_duplicate(&store, &torrent.id, torrent.score, 9001, "Vanished Show", Some(2019), 1, 1).await;
    assert_eq!(outcome, mulecolt_organiser::identifier::ResolveOutcome::Created);

    repair::handle_missing_torrent(&store, None::<&DebridClient>, &torrent, true, 3).await;

    assert!(store.get_torrent_by_id(&torrent.id).await.is_none(), "exhausted torrent row should be deleted");

    let episodes = store.list_all_episodes().await;
    assert_eq!(episodes.len(), 1);
    assert!(episodes[0].torrent.is_empty(), "the surviving episode should be orphaned, not deleted");
}
