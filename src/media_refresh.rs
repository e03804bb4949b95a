//! Targeted media-server library refresh, fired after a scan cycle
//! changed symlinks under the films or shows root.
//!
//! Grounded in `original_source/jellyfin.py::trigger_refresh`; retry
//! shape kept from the teacher's `jellyfin_client.rs`.

use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

const MAX_RETRIES: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct VirtualFolder {
    #[serde(rename = "CollectionType", default)]
    collection_type: Option<String>,
    #[serde(rename = "ItemId", default)]
    item_id: Option<String>,
    #[serde(rename = "Name", default)]
    name: String,
}

pub struct MediaRefreshClient {
    url: String,
    api_key: String,
    http: reqwest::Client,
}

impl MediaRefreshClient {
    pub fn new(url: String, api_key: String) -> Self {
        Self {
            url: url.trim_end_matches('/').to_string(),
            api_key,
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build media-refresh http client"),
        }
    }

    fn auth_header(&self) -> String {
        format!(r#"MediaBrowser Token="{}""#, self.api_key)
    }

    pub async fn trigger_refresh(&self, films_changed: bool, shows_changed: bool) {
        if !films_changed && !shows_changed {
            return;
        }

        let libraries = match self.list_libraries().await {
            Some(libs) => libs,
            None => {
                warn!("media_refresh: failed to query libraries, skipping refresh");
                return;
            }
        };

        let mut changed_types = Vec::new();
        if films_changed {
            changed_types.push("movies");
        }
        if shows_changed {
            changed_types.push("tvshows");
        }

        let mut refreshed = Vec::new();
        for lib in libraries {
            let collection_type = lib.collection_type.unwrap_or_default().to_lowercase();
            let Some(item_id) = lib.item_id else { continue };
            if !changed_types.contains(&collection_type.as_str()) {
                continue;
            }
            if self.refresh_library(&item_id).await {
                refreshed.push(lib.name);
            } else {
                warn!("media_refresh: failed to refresh library '{}'", lib.name);
            }
        }

        if !refreshed.is_empty() {
            info!("media_refresh: refresh triggered for {}", refreshed.join(", "));
        }
    }

    async fn list_libraries(&self) -> Option<Vec<VirtualFolder>> {
        let url = format!("{}/Library/VirtualFolders", self.url);
        let resp = self.http.get(&url).header("Authorization", self.auth_header()).send().await;
        match resp {
            Ok(r) if r.status().is_success() => r.json::<Vec<VirtualFolder>>().await.ok(),
            Ok(r) => {
                warn!("media_refresh: library query returned status {}", r.status());
                None
            }
            Err(e) => {
                warn!("media_refresh: library query failed: {e}");
                None
            }
        }
    }

    async fn refresh_library(&self, item_id: &str) -> bool {
        let url = format!("{}/Items/{}/Refresh", self.url, item_id);
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(RETRY_DELAY).await;
            }
            let result = self
                .http
                .post(&url)
                .header("Authorization", self.auth_header())
                .query(&[
                    ("Recursive", "true"),
                    ("MetadataRefreshMode", "Default"),
                    ("ImageRefreshMode", "Default"),
                    ("ReplaceAllMetadata", "false"),
                    ("ReplaceAllImages", "false"),
                ])
                .send()
                .await;

            match result {
                Ok(r) if r.status().is_success() => return true,
                Ok(r) => warn!("media_refresh: refresh attempt {} returned status {}", attempt + 1, r.status()),
                Err(e) => warn!("media_refresh: refresh attempt {} failed: {e}", attempt + 1),
            }
        }
        false
    }
}
