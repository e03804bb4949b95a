//! Typed CRUD + filter + pagination adapter over the external record
//! store (C1). Grounded in `original_source/pb_client.py`.
//!
//! All network errors are logged and converted to a sentinel absence
//! so callers treat the row as "unknown" and skip it this cycle, per
//! spec.md §4.1/§7 — none of this module's public methods return a
//! `Result`; they return `Option`/`Vec` and log on failure.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::warn;

const PAGE_SIZE: u32 = 200;

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Torrent {
    #[serde(default)]
    pub id: String,
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub score: i64,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub manual: bool,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub rd_id: String,
    #[serde(default)]
    pub rd_filename: String,
    #[serde(default)]
    pub repair_attempts: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Film {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub torrent: String,
    pub tmdb_id: i64,
    pub title: String,
    #[serde(default)]
    pub year: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Episode {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub torrent: String,
    pub tmdb_id: i64,
    pub title: String,
    #[serde(default)]
    pub year: i32,
    pub season: u32,
    pub episode: u32,
}

#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    #[serde(default)]
    items: Vec<T>,
    #[serde(default = "default_total_pages")]
    #[serde(rename = "totalPages")]
    total_pages: u32,
}

fn default_total_pages() -> u32 {
    1
}

pub struct Store {
    http: reqwest::Client,
    base_url: String,
}

impl Store {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(10))
                .build()
                .expect("failed to build record-store http client"),
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn collection_url(&self, collection: &str, record_id: Option<&str>) -> String {
        match record_id {
            Some(id) => format!("{}/api/collections/{}/records/{}", self.base_url, collection, id),
            None => format!("{}/api/collections/{}/records", self.base_url, collection),
        }
    }

    pub async fn health_check(&self) -> bool {
        match self.http.get(format!("{}/api/health", self.base_url)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    /// Escape a string for the backend's filter dialect (backslash then
    /// double-quote), grounded in `pb_client.py::_escape`.
    pub fn escape_filter(value: &str) -> String {
        value.replace('\\', "\\\\").replace('"', "\\\"")
    }

    async fn get_by_filter<T: for<'de> Deserialize<'de>>(
        &self,
        collection: &str,
        filter: &str,
        expand: Option<&str>,
    ) -> Option<T> {
        let mut query = vec![("filter", filter.to_string()), ("perPage", "1".to_string())];
        if let Some(e) = expand {
            query.push(("expand", e.to_string()));
        }
        let resp = self
            .http
            .get(self.collection_url(collection, None))
            .query(&query)
            .send()
            .await;
        match resp {
            Ok(r) if r.status().is_success() => {
                match r.json::<ListResponse<T>>().await {
                    Ok(list) => list.items.into_iter().next(),
                    Err(e) => {
                        warn!("store: decode failed for {collection}: {e}");
                        None
                    }
                }
            }
            Ok(r) => {
                warn!("store: {collection} query returned status {}", r.status());
                None
            }
            Err(e) => {
                warn!("store: {collection} query failed: {e}");
                None
            }
        }
    }

    async fn create<T: for<'de> Deserialize<'de>>(&self, collection: &str, body: Value) -> Option<T> {
        let resp = self
            .http
            .post(self.collection_url(collection, None))
            .json(&body)
            .send()
            .await;
        match resp {
            Ok(r) if r.status().is_success() => r.json::<T>().await.ok(),
            Ok(r) => {
                warn!("store: create {collection} returned status {}", r.status());
                None
            }
            Err(e) => {
                warn!("store: create {collection} failed: {e}");
                None
            }
        }
    }

    async fn update<T: for<'de> Deserialize<'de>>(
        &self,
        collection: &str,
        id: &str,
        body: Value,
    ) -> Option<T> {
        let resp = self
            .http
            .patch(self.collection_url(collection, Some(id)))
            .json(&body)
            .send()
            .await;
        match resp {
            Ok(r) if r.status().is_success() => r.json::<T>().await.ok(),
            Ok(r) => {
                warn!("store: update {collection}/{id} returned status {}", r.status());
                None
            }
            Err(e) => {
                warn!("store: update {collection}/{id} failed: {e}");
                None
            }
        }
    }

    async fn delete(&self, collection: &str, id: &str) -> bool {
        match self.http.delete(self.collection_url(collection, Some(id))).send().await {
            Ok(r) => r.status().is_success(),
            Err(e) => {
                warn!("store: delete {collection}/{id} failed: {e}");
                false
            }
        }
    }

    async fn paginate<T: for<'de> Deserialize<'de>>(
        &self,
        collection: &str,
        filter: Option<&str>,
        expand: Option<&str>,
    ) -> Vec<T> {
        let mut items = Vec::new();
        let mut page = 1;
        loop {
            let mut query = vec![
                ("perPage", PAGE_SIZE.to_string()),
                ("page", page.to_string()),
            ];
            if let Some(f) = filter {
                query.push(("filter", f.to_string()));
            }
            if let Some(e) = expand {
                query.push(("expand", e.to_string()));
            }
            let resp = self
                .http
                .get(self.collection_url(collection, None))
                .query(&query)
                .send()
                .await;
            match resp {
                Ok(r) if r.status().is_success() => match r.json::<ListResponse<T>>().await {
                    Ok(mut list) => {
                        let total_pages = list.total_pages;
                        items.append(&mut list.items);
                        if page >= total_pages {
                            break;
                        }
                        page += 1;
                    }
                    Err(e) => {
                        warn!("store: decode failed listing {collection} (page {page}): {e}");
                        break;
                    }
                },
                Ok(r) => {
                    warn!("store: list {collection} (page {page}) returned status {}", r.status());
                    break;
                }
                Err(e) => {
                    warn!("store: list {collection} (page {page}) failed: {e}");
                    break;
                }
            }
        }
        items
    }

    // -- torrents ---------------------------------------------------

    pub async fn get_torrent_by_path(&self, path: &str) -> Option<Torrent> {
        let filter = format!("path = \"{}\"", Self::escape_filter(path));
        self.get_by_filter("torrents", &filter, None).await
    }

    pub async fn get_torrent_by_id(&self, id: &str) -> Option<Torrent> {
        let resp = self.http.get(self.collection_url("torrents", Some(id))).send().await;
        match resp {
            Ok(r) if r.status().is_success() => r.json::<Torrent>().await.ok(),
            Ok(r) => {
                warn!("store: get_torrent_by_id({id}) returned status {}", r.status());
                None
            }
            Err(e) => {
                warn!("store: get_torrent_by_id({id}) failed: {e}");
                None
            }
        }
    }

    pub async fn create_torrent(&self, name: &str, path: &str) -> Option<Torrent> {
        self.create(
            "torrents",
            json!({
                "name": name, "path": path, "score": 0,
                "archived": false, "manual": false,
                "hash": "", "rd_id": "", "rd_filename": "",
                "repair_attempts": 0,
            }),
        )
        .await
    }

    pub async fn update_torrent(&self, id: &str, fields: Value) -> Option<Torrent> {
        self.update("torrents", id, fields).await
    }

    pub async fn delete_torrent(&self, id: &str) -> bool {
        self.delete("torrents", id).await
    }

    pub async fn list_all_torrents(&self) -> Vec<Torrent> {
        self.paginate("torrents", None, None).await
    }

    pub async fn list_archived_torrents(&self) -> Vec<Torrent> {
        self.paginate("torrents", Some("archived = true"), None).await
    }

    // -- films --------------------------------------------------------

    pub async fn get_film_by_tmdb(&self, tmdb_id: i64) -> Option<Film> {
        let filter = format!("tmdb_id = {tmdb_id}");
        self.get_by_filter("films", &filter, Some("torrent")).await
    }

    pub async fn create_film(&self, torrent_id: &str, tmdb_id: i64, title: &str, year: i32) -> Option<Film> {
        self.create(
            "films",
            json!({ "torrent": torrent_id, "tmdb_id": tmdb_id, "title": title, "year": year }),
        )
        .await
    }

    pub async fn update_film(&self, id: &str, fields: Value) -> Option<Film> {
        self.update("films", id, fields).await
    }

    pub async fn delete_film(&self, id: &str) -> bool {
        self.delete("films", id).await
    }

    pub async fn list_all_films(&self) -> Vec<Film> {
        self.paginate("films", None, Some("torrent")).await
    }

    pub async fn list_films_by_torrent(&self, torrent_id: &str) -> Vec<Film> {
        let filter = format!("torrent = \"{}\"", Self::escape_filter(torrent_id));
        self.paginate("films", Some(&filter), None).await
    }

    // -- episodes -----------------------------------------------------

    pub async fn get_episode(&self, tmdb_id: i64, season: u32, episode: u32) -> Option<Episode> {
        let filter = format!("tmdb_id = {tmdb_id} && season = {season} && episode = {episode}");
        self.get_by_filter("shows", &filter, Some("torrent")).await
    }

    pub async fn create_episode(
        &self,
        torrent_id: &str,
        tmdb_id: i64,
        title: &str,
        year: i32,
        season: u32,
        episode: u32,
    ) -> Option<Episode> {
        self.create(
            "shows",
            json!({
                "torrent": torrent_id, "tmdb_id": tmdb_id, "title": title,
                "year": year, "season": season, "episode": episode,
            }),
        )
        .await
    }

    pub async fn update_episode(&self, id: &str, fields: Value) -> Option<Episode> {
        self.update("shows", id, fields).await
    }

    pub async fn delete_episode(&self, id: &str) -> bool {
        self.delete("shows", id).await
    }

    pub async fn list_all_episodes(&self) -> Vec<Episode> {
        self.paginate("shows", None, Some("torrent")).await
    }

    pub async fn list_episodes_by_torrent(&self, torrent_id: &str) -> Vec<Episode> {
        let filter = format!("torrent = \"{}\"", Self::escape_filter(torrent_id));
        self.paginate("shows", Some(&filter), None).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_backslash_before_quote() {
        assert_eq!(Store::escape_filter(r#"a\b"c"#), r#"a\\b\"c"#);
    }

    #[test]
    fn escape_is_idempotent_on_plain_strings() {
        assert_eq!(Store::escape_filter("Arrival (2016)"), "Arrival (2016)");
    }
}
