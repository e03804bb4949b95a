//! Real-Debrid REST client (C6), scoped to what repair needs: list
//! torrents, add a magnet from an info-hash, select qualifying video
//! files, delete a dead entry.
//!
//! Grounded in the teacher's `rd_client.rs` for the client/struct shape
//! and in `original_source/rd_api.py` for the exact endpoint set and
//! retry/backoff formula (`2 * 2^attempt` seconds, 3 retries on
//! 429/503), which differs from the teacher's own jittered scheme.

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::warn;

const RD_BASE: &str = "https://api.real-debrid.com/rest/1.0";
const MAX_RETRIES: u32 = 3;
const BACKOFF_BASE_SECS: f64 = 2.0;

const VIDEO_EXTENSIONS: &[&str] = &[
    "mkv", "mp4", "avi", "mov", "wmv", "flv", "webm", "m4v", "mpg", "mpeg", "ts", "vob", "m2ts",
    "iso",
];

#[derive(Debug, Clone, Deserialize)]
pub struct RdTorrent {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub bytes: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RdTorrentInfo {
    pub id: String,
    #[serde(default)]
    pub filename: String,
    #[serde(default)]
    pub original_filename: String,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub files: Vec<RdFile>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RdFile {
    pub id: u32,
    pub path: String,
    #[serde(default)]
    pub bytes: u64,
    #[serde(default)]
    pub selected: u32,
}

#[derive(Debug, Deserialize)]
struct AddMagnetResponse {
    id: String,
}

pub struct DebridClient {
    http: reqwest::Client,
    min_file_size_bytes: u64,
}

impl DebridClient {
    pub fn new(api_key: &str, min_video_file_size_mb: u64) -> Self {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}")).expect("valid bearer header");
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(15))
            .build()
            .expect("failed to build debrid http client");

        Self {
            http,
            min_file_size_bytes: min_video_file_size_mb * 1024 * 1024,
        }
    }

    pub async fn list_all_torrents(&self) -> Vec<RdTorrent> {
        let mut all = Vec::new();
        let mut page = 1u32;
        loop {
            let url = format!("{RD_BASE}/torrents?page={page}&limit=100");
            match self.request::<Vec<RdTorrent>>(reqwest::Method::GET, &url, None).await {
                Some(batch) => {
                    let got = batch.len();
                    all.extend(batch);
                    if got < 100 {
                        break;
                    }
                    page += 1;
                }
                None => break,
            }
        }
        all
    }

    pub async fn get_torrent_info(&self, torrent_id: &str) -> Option<RdTorrentInfo> {
        let url = format!("{RD_BASE}/torrents/info/{torrent_id}");
        self.request(reqwest::Method::GET, &url, None).await
    }

    /// Adds a magnet built from a bare info-hash; returns the new RD
    /// torrent id. RD's "already active" error is treated as success
    /// with no new id to report.
    pub async fn add_magnet(&self, info_hash: &str) -> Option<String> {
        let magnet = format!("magnet:?xt=urn:btih:{info_hash}");
        let url = format!("{RD_BASE}/torrents/addMagnet");
        let body: Option<AddMagnetResponse> = self
            .request(reqwest::Method::POST, &url, Some(&[("magnet", magnet.as_str())]))
            .await;
        body.map(|r| r.id)
    }

    /// Selects every file above the configured size threshold with a
    /// known video extension. Returns true if at least one was selected.
    pub async fn select_video_files(&self, torrent_id: &str) -> bool {
        let Some(info) = self.get_torrent_info(torrent_id).await else {
            return false;
        };

        let video_ids: Vec<u32> = info
            .files
            .iter()
            .filter(|f| {
                let ext = f.path.rsplit('.').next().unwrap_or("").to_lowercase();
                VIDEO_EXTENSIONS.contains(&ext.as_str()) && f.bytes >= self.min_file_size_bytes
            })
            .map(|f| f.id)
            .collect();

        if video_ids.is_empty() {
            warn!("debrid: no qualifying video files on torrent {torrent_id}");
            return false;
        }

        let file_str = video_ids.iter().map(u32::to_string).collect::<Vec<_>>().join(",");
        let url = format!("{RD_BASE}/torrents/selectFiles/{torrent_id}");
        self.request::<serde_json::Value>(reqwest::Method::POST, &url, Some(&[("files", file_str.as_str())]))
            .await
            .is_some()
    }

    pub async fn delete_torrent(&self, torrent_id: &str) -> bool {
        let url = format!("{RD_BASE}/torrents/delete/{torrent_id}");
        self.request::<serde_json::Value>(reqwest::Method::DELETE, &url, None)
            .await
            .is_some()
    }

    /// Retry on 429/503 with `2 * 2^attempt` second backoff, up to
    /// three retries; any other failure or exhaustion yields `None`.
    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: reqwest::Method,
        url: &str,
        form: Option<&[(&str, &str)]>,
    ) -> Option<T> {
        for attempt in 0..=MAX_RETRIES {
            let mut builder = self.http.request(method.clone(), url);
            if let Some(f) = form {
                builder = builder.form(f);
            }

            let resp = match builder.send().await {
                Ok(r) => r,
                Err(e) => {
                    if attempt < MAX_RETRIES {
                        let wait = BACKOFF_BASE_SECS * 2f64.powi(attempt as i32);
                        warn!("debrid: request error on {method} {url}: {e}, retrying in {wait:.0}s");
                        tokio::time::sleep(Duration::from_secs_f64(wait)).await;
                        continue;
                    }
                    warn!("debrid: {method} {url} failed after {MAX_RETRIES} retries: {e}");
                    return None;
                }
            };

            let status = resp.status();
            if (status == reqwest::StatusCode::TOO_MANY_REQUESTS || status == reqwest::StatusCode::SERVICE_UNAVAILABLE)
                && attempt < MAX_RETRIES
            {
                let wait = BACKOFF_BASE_SECS * 2f64.powi(attempt as i32);
                warn!("debrid: {status} on {method} {url}, retrying in {wait:.0}s (attempt {}/{MAX_RETRIES})", attempt + 1);
                tokio::time::sleep(Duration::from_secs_f64(wait)).await;
                continue;
            }

            if status == reqwest::StatusCode::NO_CONTENT {
                return serde_json::from_str("{}").ok();
            }

            if !status.is_success() {
                warn!("debrid: {method} {url} returned status {status}");
                return None;
            }

            return match resp.json::<T>().await {
                Ok(val) => Some(val),
                Err(e) => {
                    warn!("debrid: failed to decode response from {method} {url}: {e}");
                    None
                }
            };
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_file_size_converts_mb_to_bytes() {
        let client = DebridClient::new("token", 100);
        assert_eq!(client.min_file_size_bytes, 100 * 1024 * 1024);
    }

    #[test]
    fn video_extensions_match_mount_scanner_list() {
        for ext in ["mkv", "mp4", "iso"] {
            assert!(VIDEO_EXTENSIONS.contains(&ext));
        }
        assert!(!VIDEO_EXTENSIONS.contains(&"nfo"));
    }
}
