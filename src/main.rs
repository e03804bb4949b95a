use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info};

use mulecolt_organiser::config::Config;
use mulecolt_organiser::debrid_client::DebridClient;
use mulecolt_organiser::media_refresh::MediaRefreshClient;
use mulecolt_organiser::metadata_client::MetadataClient;
use mulecolt_organiser::orchestrator::Orchestrator;
use mulecolt_organiser::store::Store;
use mulecolt_organiser::webhook;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = Config::from_env()?;
    info!("configuration loaded: mount={} films={} shows={}", config.mount_root, config.films_dir, config.shows_dir);

    let store = Store::new(config.pocketbase_url.clone());
    if !store.health_check().await {
        error!("record store health check failed at startup — continuing, scans will retry");
    }

    let metadata = MetadataClient::new(config.tmdb_api_key.clone(), config.tmdb_base.clone());
    let debrid = Some(DebridClient::new(&config.real_debrid_api_key, config.min_video_file_size_mb));

    let media_refresh = match (&config.jellyfin_url, &config.jellyfin_api_key) {
        (Some(url), Some(key)) => Some(MediaRefreshClient::new(url.clone(), key.clone())),
        _ => {
            info!("media refresh disabled (JELLYFIN_URL/JELLYFIN_API_KEY not set)");
            None
        }
    };

    let scan_signal = Arc::new(Notify::new());
    let webhook_port = config.webhook_port;
    let webhook_signal = scan_signal.clone();
    tokio::spawn(async move {
        if let Err(e) = webhook::run(webhook_port, webhook_signal).await {
            error!("webhook server exited: {e}");
        }
    });

    let orchestrator = Orchestrator::new(config, store, metadata, debrid, media_refresh);
    orchestrator.run_loop(scan_signal).await;

    Ok(())
}
