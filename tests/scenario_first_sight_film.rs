//! End-to-end scenario 1 from spec.md §8: a loose first-sight film is
//! identified against the catalogue and gets a symlink built for it.

mod common;

use mulecolt_organiser::identifier;
use mulecolt_organiser::metadata_client::MetadataClient;
use mulecolt_organiser::store::Store;
use mulecolt_organiser::symlink_reconciler::{self, Paths};
use serde_json::json;
use std::path::Path;

#[tokio::test]
async fn first_sight_film_gets_identified_and_symlinked() {
    let store_server = common::start().await;
    let tmdb_server = common::start().await;

    {
        let mut state = tmdb_server.state.lock().unwrap();
        state.movies.insert(
            329865,
            json!({
                "id": 329865,
                "title": "Arrival",
                "release_date": "2016-11-10",
                "popularity": 50.0,
                "_query_key": "Arrival",
            }),
        );
    }

    let store = Store::new(store_server.base_url());
    let metadata = MetadataClient::new("test-key".into(), tmdb_server.base_url());

    let tmp = std::env::temp_dir().join(format!("scenario1_{}", std::process::id()));
    let mount_root = tmp.join("mount");
    std::fs::create_dir_all(&mount_root).unwrap();
    let video_path = mount_root.join("Arrival.2016.1080p.BluRay.x264.mkv");
    std::fs::write(&video_path, b"fake video bytes").unwrap();

    let folder_name = "Arrival.2016.1080p.BluRay.x264.mkv";
    let torrent = store
        .create_torrent(folder_name, &video_path.to_string_lossy())
        .await
        .expect("torrent created");
    store.update_torrent(&torrent.id, json!({ "score": 70 })).await;
    let torrent = store.get_torrent_by_id(&torrent.id).await.expect("torrent refetched");

    let identified = identifier::identify_film(&store, &metadata, folder_name, &torrent).await;
    assert!(identified, "film should have been identified against the catalogue");

    let films = store.list_all_films().await;
    assert_eq!(films.len(), 1);
    assert_eq!(films[0].tmdb_id, 329865);
    assert_eq!(films[0].year, 2016);

    let consumer_mount_root = tmp.join("remote_mount");
    let films_dir = tmp.join("films");
    let shows_dir = tmp.join("shows");
    let paths = Paths {
        mount_root: &mount_root,
        consumer_mount_root: &consumer_mount_root,
        films_dir: &films_dir,
        shows_dir: &shows_dir,
    };

    let outcome = symlink_reconciler::reconcile(&store, &metadata, &paths).await;
    assert!(outcome.films_changed);
    assert!(!outcome.shows_changed);

    let link_dir = films_dir.join("Arrival (2016) [tmdbid=329865]");
    let link_path = link_dir.join("Arrival (2016) [tmdbid=329865].mkv");
    assert!(link_path.is_symlink(), "expected symlink at {}", link_path.display());

    let target = std::fs::read_link(&link_path).unwrap();
    let expected_target = consumer_mount_root.join("Arrival.2016.1080p.BluRay.x264.mkv");
    assert_eq!(Path::new(&target), expected_target);

    std::fs::remove_dir_all(&tmp).ok();
}
