use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use rusqlite::Connection;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::error::ApiError;
use crate::merge::Submission;
use crate::service::{self, WebsiteView};

/// The one connection the server owns, shared across handlers. Holding the
/// lock for a whole submission serializes read-merge-write per domain.
pub type Db = Arc<Mutex<Connection>>;

pub fn router(db: Db) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/users", get(list_websites).post(submit_website))
        .route("/api/users/:id", get(show_website))
        .route("/api/stats", get(stats))
        .with_state(db)
}

pub async fn serve(addr: SocketAddr, db: Db) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on http://{}", addr);
    axum::serve(listener, router(db))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for ctrl-c: {}", e);
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            ApiError::Invalid(_) | ApiError::Malformed(_) => {
                (StatusCode::BAD_REQUEST, self.to_string())
            }
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "Website not found".to_string()),
            ApiError::Storage(e) => {
                error!("Storage failure: {:#}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

fn lock(db: &Db) -> Result<MutexGuard<'_, Connection>, ApiError> {
    db.lock()
        .map_err(|_| ApiError::Storage(anyhow!("database lock poisoned")))
}

/// Run `f` against the shared connection on the blocking pool so SQLite
/// work never stalls the async workers.
async fn with_conn<T, F>(db: Db, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&mut Connection) -> Result<T, ApiError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut conn = lock(&db)?;
        f(&mut conn)
    })
    .await
    .map_err(|e| ApiError::Storage(anyhow!("database task failed: {}", e)))?
}

async fn healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn submit_website(
    State(db): State<Db>,
    payload: Result<Json<Submission>, JsonRejection>,
) -> Result<(StatusCode, Json<Value>), ApiError> {
    let Json(sub) = payload.map_err(|e| ApiError::Malformed(e.body_text()))?;
    let done = with_conn(db, move |conn| service::submit(conn, &sub, Utc::now()))
        .await
        .inspect_err(|e| {
            if e.is_client_error() {
                warn!("Rejected submission: {}", e);
            }
        })?;

    let (status, message) = if done.created {
        (StatusCode::CREATED, "Website data created successfully")
    } else {
        (
            StatusCode::OK,
            "Website data updated successfully (appended new data)",
        )
    };
    Ok((
        status,
        Json(json!({
            "message": message,
            "websiteId": done.record.id,
            "website": WebsiteView::from(done.record),
        })),
    ))
}

async fn list_websites(State(db): State<Db>) -> Result<Json<Value>, ApiError> {
    let records = with_conn(db, |conn| service::list(conn)).await?;
    let websites: Vec<WebsiteView> = records.into_iter().map(WebsiteView::from).collect();
    Ok(Json(json!({
        "totalWebsites": websites.len(),
        "websites": websites,
    })))
}

async fn show_website(
    State(db): State<Db>,
    Path(id): Path<i64>,
) -> Result<Json<Value>, ApiError> {
    let record = with_conn(db, move |conn| service::show(conn, id)).await?;
    Ok(Json(json!({ "website": WebsiteView::from(record) })))
}

async fn stats(State(db): State<Db>) -> Result<Json<Value>, ApiError> {
    let stats = with_conn(db, |conn| service::stats(conn)).await?;
    Ok(Json(json!({ "stats": stats })))
}

/// Serve `router` on an ephemeral local port and return its base URL.
#[cfg(test)]
pub async fn spawn_local(db: Db) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router(db)).await.unwrap() });
    format!("http://{}", addr)
}

#[cfg(test)]
pub fn poison(db: &Db) {
    let db = db.clone();
    let _ = std::thread::spawn(move || {
        let _guard = db.lock().unwrap();
        panic!("poisoning database lock");
    })
    .join();
}
