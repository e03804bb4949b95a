//! TMDB-shaped metadata catalogue client (C4): title search with
//! candidate scoring, and process-lifetime show-structure caching.
//!
//! Grounded in the teacher's `tmdb_client.rs` for the client/retry
//! shape and in `original_source/organiser.py::_score_tmdb_result` for
//! the exact scoring weights, and `original_source/tmdb_utils.py` for
//! the show/season fetch sequence and structure cache.

use chrono::Datelike;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{error, warn};

use crate::show_structure::{ShowStructure, TmdbEpisode};

#[derive(Debug, Deserialize, Clone)]
pub struct SearchResult {
    pub id: i64,
    #[serde(alias = "name")]
    pub title: String,
    #[serde(alias = "original_name", alias = "original_title")]
    pub original_title: Option<String>,
    #[serde(alias = "first_air_date")]
    pub release_date: Option<String>,
    #[serde(default)]
    pub popularity: f64,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    results: Vec<SearchResult>,
}

#[derive(Debug, Clone)]
pub struct MatchedTitle {
    pub tmdb_id: i64,
    pub title: String,
    pub year: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Film,
    Show,
}

#[derive(Debug, Deserialize)]
struct MovieMeta {
    id: i64,
    title: String,
    #[serde(default)]
    release_date: String,
}

#[derive(Debug, Deserialize)]
struct ShowLookupMeta {
    id: i64,
    name: String,
    #[serde(default)]
    first_air_date: String,
}

#[derive(Debug, Deserialize)]
struct ShowMeta {
    seasons: Vec<SeasonMeta>,
}

#[derive(Debug, Deserialize)]
struct SeasonMeta {
    season_number: u32,
}

#[derive(Debug, Deserialize)]
struct SeasonDetail {
    episodes: Vec<EpisodeMeta>,
}

#[derive(Debug, Deserialize)]
struct EpisodeMeta {
    episode_number: u32,
    #[serde(default)]
    name: String,
}

pub struct MetadataClient {
    http: Client,
    api_key: String,
    base_url: String,
    structure_cache: Arc<RwLock<HashMap<i64, Option<ShowStructure>>>>,
}

impl MetadataClient {
    pub fn new(api_key: String, base_url: String) -> Self {
        Self {
            http: Client::builder()
                .timeout(Duration::from_secs(10))
                .build()
                .expect("failed to build metadata http client"),
            api_key,
            base_url,
            structure_cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    pub async fn search_film(&self, title: &str, year: Option<i32>) -> Option<MatchedTitle> {
        let url = format!("{}/search/movie", self.base_url);
        let year_str = year.map(|y| y.to_string());
        let mut params = vec![("api_key", self.api_key.as_str()), ("query", title)];
        if let Some(y) = year_str.as_deref() {
            params.push(("year", y));
        }
        let results = self.search(&url, params).await;
        self.best_candidate(title, year, &results, "release_date")
    }

    pub async fn search_tv(&self, title: &str, year: Option<i32>) -> Option<MatchedTitle> {
        let url = format!("{}/search/tv", self.base_url);
        let year_str = year.map(|y| y.to_string());
        let mut params = vec![("api_key", self.api_key.as_str()), ("query", title)];
        if let Some(y) = year_str.as_deref() {
            params.push(("first_air_date_year", y));
        }
        let results = self.search(&url, params).await;
        self.best_candidate(title, year, &results, "first_air_date")
    }

    fn best_candidate(
        &self,
        query_title: &str,
        query_year: Option<i32>,
        results: &[SearchResult],
        _date_key: &str,
    ) -> Option<MatchedTitle> {
        let mut best: Option<(f64, &SearchResult)> = None;
        for (rank, result) in results.iter().enumerate() {
            let s = score_candidate(query_title, query_year, result, rank);
            if best.is_none() || s > best.unwrap().0 {
                best = Some((s, result));
            }
        }
        best.map(|(_, r)| {
            let year = r
                .release_date
                .as_deref()
                .filter(|d| d.len() >= 4)
                .and_then(|d| d[..4].parse().ok())
                .or(query_year)
                .unwrap_or(0);
            MatchedTitle {
                tmdb_id: r.id,
                title: r.title.clone(),
                year,
            }
        })
    }

    /// Looks up a known catalogue ID directly, trying both the film and
    /// show endpoints unless `hint` narrows it to one. Used by the manual
    /// resolve path, where the caller already has an ID rather than a
    /// title to search for.
    pub async fn lookup_by_id(&self, tmdb_id: i64, hint: Option<MediaType>) -> Option<(MediaType, MatchedTitle)> {
        if hint != Some(MediaType::Show) {
            let url = format!("{}/movie/{}", self.base_url, tmdb_id);
            if let Ok(meta) = self
                .fetch_with_retry::<MovieMeta>(|| self.http.get(&url).query(&[("api_key", self.api_key.as_str())]))
                .await
            {
                let year = meta.release_date.get(..4).and_then(|y| y.parse().ok()).unwrap_or(0);
                return Some((MediaType::Film, MatchedTitle { tmdb_id: meta.id, title: meta.title, year }));
            }
        }

        if hint != Some(MediaType::Film) {
            let url = format!("{}/tv/{}", self.base_url, tmdb_id);
            if let Ok(meta) = self
                .fetch_with_retry::<ShowLookupMeta>(|| self.http.get(&url).query(&[("api_key", self.api_key.as_str())]))
                .await
            {
                let year = meta.first_air_date.get(..4).and_then(|y| y.parse().ok()).unwrap_or(0);
                return Some((MediaType::Show, MatchedTitle { tmdb_id: meta.id, title: meta.name, year }));
            }
        }

        None
    }

    /// Fetches and caches a show's full season/episode structure for
    /// the lifetime of the process, so repeated lookups for the same
    /// show across a scan are free.
    pub async fn get_show_structure(&self, tmdb_id: i64) -> Option<ShowStructure> {
        if let Some(cached) = self.structure_cache.read().await.get(&tmdb_id) {
            return cached.clone();
        }

        let structure = self.fetch_show_structure(tmdb_id).await;
        self.structure_cache.write().await.insert(tmdb_id, structure.clone());
        structure
    }

    async fn fetch_show_structure(&self, tmdb_id: i64) -> Option<ShowStructure> {
        let url = format!("{}/tv/{}", self.base_url, tmdb_id);
        let meta: ShowMeta = self
            .fetch_with_retry(|| self.http.get(&url).query(&[("api_key", self.api_key.as_str())]))
            .await
            .ok()?;

        let mut episodes = Vec::new();
        for season in meta.seasons {
            if season.season_number == 0 {
                continue;
            }
            let season_url = format!("{}/tv/{}/season/{}", self.base_url, tmdb_id, season.season_number);
            let detail: SeasonDetail = match self
                .fetch_with_retry(|| self.http.get(&season_url).query(&[("api_key", self.api_key.as_str())]))
                .await
            {
                Ok(d) => d,
                Err(e) => {
                    warn!("metadata: failed to fetch season {} for show {tmdb_id}: {e}", season.season_number);
                    continue;
                }
            };
            for ep in detail.episodes {
                episodes.push(TmdbEpisode {
                    season: season.season_number,
                    episode: ep.episode_number,
                    title: ep.name,
                });
            }
        }

        if episodes.is_empty() {
            return None;
        }
        Some(ShowStructure::new(tmdb_id, episodes))
    }

    async fn search(&self, url: &str, params: Vec<(&str, &str)>) -> Vec<SearchResult> {
        match self.fetch_with_retry(|| self.http.get(url).query(&params)).await {
            Ok(resp) => {
                let resp: SearchResponse = resp;
                resp.results
            }
            Err(e) => {
                error!("metadata: search failed: {e}");
                Vec::new()
            }
        }
    }

    async fn fetch_with_retry<T: for<'de> Deserialize<'de>>(
        &self,
        make_request: impl Fn() -> RequestBuilder,
    ) -> Result<T, reqwest::Error> {
        let mut last_error: Option<reqwest::Error> = None;
        let max_attempts = 10;

        for attempt in 1..=max_attempts {
            if attempt > 1 {
                let backoff = 2u64.pow(attempt as u32 - 2) * 1000;
                let jitter = (std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_nanos()
                    % 500) as u64;
                tokio::time::sleep(Duration::from_millis(backoff + jitter)).await;
            }

            match make_request().send().await {
                Ok(resp) => {
                    let status = resp.status();
                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                        || status == reqwest::StatusCode::SERVICE_UNAVAILABLE
                        || status == reqwest::StatusCode::BAD_GATEWAY
                        || status == reqwest::StatusCode::GATEWAY_TIMEOUT
                    {
                        let retry_after = resp
                            .headers()
                            .get(reqwest::header::RETRY_AFTER)
                            .and_then(|h| h.to_str().ok())
                            .and_then(|s| s.parse::<u64>().ok())
                            .unwrap_or(1);
                        warn!("metadata: {status} (attempt {attempt}/{max_attempts}), waiting {retry_after}s");
                        tokio::time::sleep(Duration::from_secs(retry_after)).await;
                    }

                    match resp.error_for_status() {
                        Ok(resp) => return resp.json::<T>().await,
                        Err(e) => {
                            warn!("metadata: API error (attempt {attempt}/{max_attempts}): {e}");
                            last_error = Some(e);
                        }
                    }
                }
                Err(e) => {
                    warn!("metadata: request failed (attempt {attempt}/{max_attempts}): {e}");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.expect("retry loop exits only after recording an error"))
    }
}

fn words(text: &str) -> HashSet<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(String::from)
        .collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

/// `title_score + year_score + recency_bonus + pop_score + rank_bonus`,
/// reproducing `_score_tmdb_result` exactly.
fn score_candidate(query_title: &str, query_year: Option<i32>, result: &SearchResult, rank: usize) -> f64 {
    let query_words = words(query_title);
    if query_words.is_empty() {
        return 0.0;
    }

    let name_words = words(&result.title);
    let orig_words = result.original_title.as_deref().map(words).unwrap_or_default();
    let title_score = jaccard(&query_words, &name_words).max(jaccard(&query_words, &orig_words));

    let result_year = result
        .release_date
        .as_deref()
        .filter(|d| d.len() >= 4)
        .and_then(|d| d[..4].parse::<i32>().ok());

    let mut year_score = 0.0;
    if let (Some(qy), Some(ry)) = (query_year, result_year) {
        let diff = (ry - qy).abs();
        year_score = if diff == 0 {
            0.3
        } else if diff <= 1 {
            0.15
        } else if diff <= 2 {
            0.10
        } else {
            -0.5
        };
    }

    let mut recency_bonus = 0.0;
    if query_year.is_none() {
        if let Some(ry) = result_year {
            let years_ago = chrono::Utc::now().year() - ry;
            recency_bonus = if years_ago <= 2 {
                0.06
            } else if years_ago <= 5 {
                0.04
            } else if years_ago <= 10 {
                0.02
            } else {
                0.0
            };
        }
    }

    let pop_score = (result.popularity / 500.0).min(0.10);
    let rank_bonus = (0.04 - rank as f64 * 0.002).max(0.0);

    title_score + year_score + recency_bonus + pop_score + rank_bonus
}
