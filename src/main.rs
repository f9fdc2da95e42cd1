mod config;
mod downloads;
mod error;
mod handlers;
mod simulator;
mod state;
mod store;

use axum::{
    Router,
    routing::{get, post},
};
use local_ip_address::local_ip;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::Mutex;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{Level, info};

use crate::config::Settings;
use crate::downloads::DownloadManager;
use crate::handlers::api;
use crate::state::AppState;
use crate::store::ItemStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let settings = Settings::new().expect("Failed to load configuration");

    tracing_subscriber::fmt()
        .with_env_filter(&settings.log_level)
        .init();

    info!("Starting realtime-list with {} items...", settings.item_count);

    let local_ip = local_ip().unwrap_or_else(|_| [127, 0, 0, 1].into());
    let host_url = format!("http://{}:{}", local_ip, settings.server_port);

    let state = AppState::new(settings.clone(), host_url.clone());
    log_completions(&state.store);

    let app = create_app(state.clone());

    let port = settings.server_port;
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on http://{}", addr);
    info!("Network address: {}", host_url);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind listener");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.downloads.clone()))
        .await
        .expect("Server error");
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/api/info", get(api::server_info))
        .route("/api/items", get(api::list_items))
        .route("/api/items/{id}", get(api::get_item))
        .route("/api/items/{id}/download", post(api::start_download))
        .route("/api/downloads", get(api::list_downloads))
        .route("/events", get(api::sse_handler))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(tower_http::trace::DefaultMakeSpan::new().level(Level::INFO))
                .on_response(tower_http::trace::DefaultOnResponse::new().level(Level::INFO)),
        )
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn log_completions(store: &ItemStore) {
    let total = store.len();
    let completed = Mutex::new(HashSet::new());
    store.subscribe(move |snapshot| {
        let mut completed = completed.lock().unwrap_or_else(|e| e.into_inner());
        for item in snapshot.iter().filter(|i| i.is_downloaded()) {
            if completed.insert(item.id) {
                info!("{} downloaded ({}/{})", item.title, completed.len(), total);
            }
        }
    });
}

async fn shutdown_signal(downloads: std::sync::Arc<DownloadManager>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested.");
    downloads.shutdown();
}
