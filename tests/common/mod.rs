//! Shared test fixture: a tiny in-process HTTP stub standing in for
//! both the record store and the metadata catalogue, built on the same
//! `hyper` server-loop shape the crate already uses in `webhook.rs`.
//! Driven entirely from synthetic, in-memory state — no live network
//! access or secrets required.

use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;

#[derive(Default)]
pub struct FakeState {
    pub collections: HashMap<String, Vec<Value>>,
    pub next_id: u64,
    pub movies: HashMap<i64, Value>,
    pub shows: HashMap<i64, Value>,
    pub seasons: HashMap<(i64, u32), Value>,
}

impl FakeState {
    fn fresh_id(&mut self) -> String {
        self.next_id += 1;
        format!("rec{}", self.next_id)
    }
}

pub struct FakeServer {
    pub addr: std::net::SocketAddr,
    pub state: Arc<Mutex<FakeState>>,
}

impl FakeServer {
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }
}

/// Starts the stub server on an ephemeral port, returning its base URL
/// and a handle to the shared state so the test can seed catalogue
/// fixtures before exercising the client under test.
pub async fn start() -> FakeServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind ephemeral port");
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(Mutex::new(FakeState::default()));
    let state_for_server = state.clone();

    tokio::spawn(async move {
        loop {
            let (stream, _) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let io = TokioIo::new(stream);
            let state = state_for_server.clone();
            tokio::task::spawn(async move {
                let _ = http1::Builder::new()
                    .serve_connection(io, service_fn(move |req| handle(req, state.clone())))
                    .await;
            });
        }
    });

    FakeServer { addr, state }
}

fn json_response(status: StatusCode, body: Value) -> Response<Full<Bytes>> {
    Response::builder()
        .status(status)
        .header("content-type", "application/json")
        .body(Full::new(Bytes::from(body.to_string())))
        .unwrap()
}

async fn handle(req: Request<Incoming>, state: Arc<Mutex<FakeState>>) -> Result<Response<Full<Bytes>>, hyper::Error> {
    let method = req.method().clone();
    let uri = req.uri().clone();
    let path = uri.path().to_string();
    let query: HashMap<String, String> = uri
        .query()
        .map(|q| {
            q.split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), urldecode(v)))
                .collect()
        })
        .unwrap_or_default();

    let body_bytes = req.into_body().collect().await.map(|b| b.to_bytes()).unwrap_or_default();
    let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(json!({}));

    let segments: Vec<&str> = path.trim_matches('/').split('/').collect();

    let response = match (&method, segments.as_slice()) {
        (&Method::GET, ["api", "health"]) => json_response(StatusCode::OK, json!({"status": "ok"})),

        (&Method::GET, ["api", "collections", coll, "records", id]) => {
            let st = state.lock().unwrap();
            match st.collections.get(*coll).and_then(|items| items.iter().find(|r| r["id"] == *id)) {
                Some(record) => json_response(StatusCode::OK, record.clone()),
                None => json_response(StatusCode::NOT_FOUND, json!({"error": "not found"})),
            }
        }

        (&Method::GET, ["api", "collections", coll, "records"]) => {
            let st = state.lock().unwrap();
            let items = st.collections.get(*coll).cloned().unwrap_or_default();
            let filtered: Vec<Value> = match query.get("filter") {
                Some(f) => items.into_iter().filter(|r| matches_filter(r, f)).collect(),
                None => items,
            };
            json_response(StatusCode::OK, json!({"items": filtered, "totalPages": 1}))
        }

        (&Method::POST, ["api", "collections", coll, "records"]) => {
            let mut st = state.lock().unwrap();
            let id = st.fresh_id();
            let mut record = body.clone();
            record["id"] = json!(id);
            st.collections.entry(coll.to_string()).or_default().push(record.clone());
            json_response(StatusCode::OK, record)
        }

        (&Method::PATCH, ["api", "collections", coll, "records", id]) => {
            let mut st = state.lock().unwrap();
            let items = st.collections.entry(coll.to_string()).or_default();
            match items.iter_mut().find(|r| r["id"] == *id) {
                Some(record) => {
                    if let Value::Object(fields) = &body {
                        for (k, v) in fields {
                            record[k] = v.clone();
                        }
                    }
                    json_response(StatusCode::OK, record.clone())
                }
                None => json_response(StatusCode::NOT_FOUND, json!({"error": "not found"})),
            }
        }

        (&Method::DELETE, ["api", "collections", coll, "records", id]) => {
            let mut st = state.lock().unwrap();
            if let Some(items) = st.collections.get_mut(*coll) {
                items.retain(|r| r["id"] != *id);
            }
            json_response(StatusCode::NO_CONTENT, json!({}))
        }

        (&Method::GET, ["search", "movie"]) | (&Method::GET, ["search", "tv"]) => {
            let st = state.lock().unwrap();
            let key = query.get("query").cloned().unwrap_or_default();
            let results: Vec<Value> = st
                .movies
                .values()
                .chain(st.shows.values())
                .filter(|m| m["_query_key"] == key)
                .cloned()
                .collect();
            json_response(StatusCode::OK, json!({"results": results}))
        }

        (&Method::GET, ["movie", id]) => {
            let st = state.lock().unwrap();
            let id: i64 = id.parse().unwrap_or(-1);
            match st.movies.get(&id) {
                Some(m) => json_response(StatusCode::OK, m.clone()),
                None => json_response(StatusCode::NOT_FOUND, json!({"error": "not found"})),
            }
        }

        (&Method::GET, ["tv", id]) => {
            let st = state.lock().unwrap();
            let id: i64 = id.parse().unwrap_or(-1);
            match st.shows.get(&id) {
                Some(m) => json_response(StatusCode::OK, m.clone()),
                None => json_response(StatusCode::NOT_FOUND, json!({"error": "not found"})),
            }
        }

        (&Method::GET, ["tv", id, "season", season]) => {
            let st = state.lock().unwrap();
            let id: i64 = id.parse().unwrap_or(-1);
            let season: u32 = season.parse().unwrap_or(0);
            match st.seasons.get(&(id, season)) {
                Some(m) => json_response(StatusCode::OK, m.clone()),
                None => json_response(StatusCode::NOT_FOUND, json!({"error": "not found"})),
            }
        }

        _ => json_response(StatusCode::NOT_FOUND, json!({"error": "no route"})),
    };

    Ok(response)
}

fn urldecode(s: &str) -> String {
    s.replace('+', " ")
}

/// Evaluates the narrow set of filter expressions `store.rs` actually
/// generates: `field = "value"`, `field = N`, and `&&`-joined clauses.
fn matches_filter(record: &Value, filter: &str) -> bool {
    filter.split("&&").map(str::trim).all(|clause| {
        let Some((field, raw_value)) = clause.split_once('=') else { return true };
        let field = field.trim();
        let raw_value = raw_value.trim();
        if raw_value == "true" || raw_value == "false" {
            return record[field].as_bool() == Some(raw_value == "true");
        }
        if let Some(stripped) = raw_value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
            let unescaped = stripped.replace("\\\"", "\"").replace("\\\\", "\\");
            return record[field].as_str() == Some(unescaped.as_str());
        }
        raw_value.parse::<i64>().ok() == record[field].as_i64()
    })
}
