use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::{Stream, StreamExt};
use tokio_stream::wrappers::WatchStream;
use tracing::{debug, info};

use crate::downloads::{ActiveDownloadView, StartOutcome};
use crate::error::{Error, Result};
use crate::state::AppState;
use crate::store::Item;

pub async fn server_info(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "host": state.host_url,
        "port": state.settings.server_port,
        "item_count": state.store.len(),
        "tick_interval_ms": state.settings.tick_interval_ms,
        "active_downloads": state.downloads.active_count(),
    }))
}

pub async fn list_items(State(state): State<AppState>) -> Json<Vec<Item>> {
    Json(state.store.snapshot().to_vec())
}

pub async fn get_item(
    Path(id): Path<u32>,
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>> {
    let item = state.store.get(id).ok_or(Error::ItemNotFound(id))?;
    let phase = state.downloads.phase(id)?;

    Ok(Json(serde_json::json!({
        "item": item,
        "phase": phase,
    })))
}

pub async fn start_download(
    Path(id): Path<u32>,
    State(state): State<AppState>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let outcome = state.downloads.start(id)?;
    let status = match outcome {
        StartOutcome::Started => StatusCode::ACCEPTED,
        StartOutcome::AlreadyRunning | StartOutcome::AlreadyCompleted => {
            debug!("Ignoring download request for item {}: {:?}", id, outcome);
            StatusCode::OK
        }
    };

    Ok((status, Json(serde_json::json!({ "status": outcome }))))
}

pub async fn list_downloads(State(state): State<AppState>) -> Json<Vec<ActiveDownloadView>> {
    Json(state.downloads.active())
}

pub async fn sse_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, axum::Error>>> {
    info!("New snapshot subscriber.");
    let stream = WatchStream::new(state.store.watch()).map(|snapshot| {
        Event::default()
            .event("snapshot")
            .json_data(&*snapshot)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
