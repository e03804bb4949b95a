//! End-to-end scenarios 2 and 6 from spec.md §8: a higher-scoring
//! duplicate film displaces the torrent that used to hold the slot,
//! and a torrent nobody can identify gets marked for manual resolution.

mod common;

use mulecolt_organiser::identifier::{self, ResolveOutcome};
use mulecolt_organiser::metadata_client::MetadataClient;
use mulecolt_organiser::store::{Store, Torrent};
use serde_json::json;

#[tokio::test]
async fn higher_scoring_duplicate_wins_the_film_slot() {
    let store_server = common::start().await;
    let store = Store::new(store_server.base_url());

    let torrent_a = store.create_torrent("Arrival.2016.720p", "/mnt/zurg/Arrival.A").await.unwrap();
    store.update_torrent(&torrent_a.id, json!({ "score": 120 })).await;
    let torrent_a = store.get_torrent_by_id(&torrent_a.id).await.unwrap();

    let outcome = identifier::resolve_film_duplicate(&store, &torrent_a.id, torrent_a.score, 329865, "Arrival", Some(2016)).await;
    assert_eq!(outcome, ResolveOutcome::Created);

    let torrent_b = store.create_torrent("Arrival.2016.2160p.Remux", "/mnt/zurg/Arrival.B").await.unwrap();
    store.update_torrent(&torrent_b.id, json!({ "score": 210 })).await;
    let torrent_b = store.get_torrent_by_id(&torrent_b.id).await.unwrap();

    let outcome = identifier::resolve_film_duplicate(&store, &torrent_b.id, torrent_b.score, 329865, "Arrival", Some(2016)).await;
    assert_eq!(outcome, ResolveOutcome::Won);

    let films = store.list_all_films().await;
    assert_eq!(films.len(), 1);
    assert_eq!(films[0].torrent, torrent_b.id);

    let torrent_a_after = store.get_torrent_by_id(&torrent_a.id).await.unwrap();
    assert!(torrent_a_after.archived, "the losing torrent should be archived");

    let torrent_b_after = store.get_torrent_by_id(&torrent_b.id).await.unwrap();
    assert!(!torrent_b_after.archived);
}

#[tokio::test]
async fn unidentifiable_torrent_is_marked_for_manual_resolution() {
    let store_server = common::start().await;
    let tmdb_server = common::start().await;

    let store = Store::new(store_server.base_url());
    let metadata = MetadataClient::new("test-key".into(), tmdb_server.base_url());

    let torrent = Torrent {
        name: "asdkjqwe.123.xyz".into(),
        path: "/mnt/zurg/asdkjqwe.123.xyz".into(),
        rd_filename: "asdkjqwe.123.xyz.mkv".into(),
        ..Default::default()
    };
    let torrent = store.create_torrent(&torrent.name, &torrent.path).await.unwrap();
    store.update_torrent(&torrent.id, json!({ "rd_filename": "asdkjqwe.123.xyz.mkv" })).await;
    let torrent = store.get_torrent_by_id(&torrent.id).await.unwrap();

    let video_files = vec![std::path::PathBuf::from(&torrent.path).join("asdkjqwe.123.xyz.mkv")];
    identifier::identify(&store, &metadata, &torrent.name, &torrent, &video_files).await;

    let reloaded = store.get_torrent_by_id(&torrent.id).await.unwrap();
    assert!(reloaded.manual, "an unmatched torrent must be flagged manual");
    assert!(store.list_all_films().await.is_empty());
    assert!(store.list_all_episodes().await.is_empty());
}
