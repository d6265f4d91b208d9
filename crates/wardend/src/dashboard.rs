//! Read-mostly web dashboard: recent access events, enrolled users, the
//! latest annotated camera frame, and user removal.

use axum::{
    extract::{Path as UrlPath, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinError;
use warden_core::gallery::{self, GalleryError};
use warden_store::{Store, StoreError};

/// Log rows shown on the HTML page.
const PAGE_LOG_LIMIT: usize = 20;
/// Log rows returned by `/api/logs`.
const API_LOG_LIMIT: usize = 100;

/// Latest annotated frame as JPEG, `None` until the engine publishes one.
pub type FrameReceiver = watch::Receiver<Option<Vec<u8>>>;

/// Shared state for the dashboard routes
#[derive(Clone)]
pub struct DashboardState {
    pub store: Arc<Store>,
    pub gallery_dir: PathBuf,
    pub frames: FrameReceiver,
}

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Gallery(#[from] GalleryError),
    #[error("blocking task failed: {0}")]
    Join(#[from] JoinError),
}

/// A user as shown on the dashboard: everyone with a store row or an
/// embedding file. `trained` is set when the embedding file exists.
#[derive(Debug, Clone, Serialize)]
pub struct RegisteredUser {
    pub name: String,
    pub trained: bool,
    pub created_at: Option<String>,
    pub last_seen: Option<String>,
    pub access_count: i64,
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        let status = match &self {
            DashboardError::Gallery(GalleryError::InvalidName(_)) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::warn!(error = %self, %status, "dashboard request failed");
        let body = serde_json::json!({ "status": "error", "message": self.to_string() });
        (status, Json(body)).into_response()
    }
}

pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/api/logs", get(logs_handler))
        .route("/api/users", get(users_handler))
        .route("/api/users/:name", delete(delete_user_handler))
        .route("/frame.jpg", get(frame_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

/// Bind `addr` and serve until the task is dropped.
pub async fn serve(addr: &str, state: DashboardState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| anyhow::anyhow!("failed to bind dashboard on {addr}: {e}"))?;
    tracing::info!(addr, "dashboard listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Run store and gallery I/O on the blocking pool.
async fn blocking<T, F>(state: DashboardState, work: F) -> Result<T, DashboardError>
where
    T: Send + 'static,
    F: FnOnce(&DashboardState) -> Result<T, DashboardError> + Send + 'static,
{
    tokio::task::spawn_blocking(move || work(&state)).await?
}

/// Store rows merged with gallery files, sorted by name.
fn registered_users(store: &Store, gallery_dir: &Path) -> Result<Vec<RegisteredUser>, DashboardError> {
    let mut users: BTreeMap<String, RegisteredUser> = gallery::list_names(gallery_dir)?
        .into_iter()
        .map(|name| {
            let user = RegisteredUser {
                name: name.clone(),
                trained: true,
                created_at: None,
                last_seen: None,
                access_count: 0,
            };
            (name, user)
        })
        .collect();

    for row in store.list_users()? {
        let entry = users.entry(row.name.clone()).or_insert_with(|| RegisteredUser {
            name: row.name.clone(),
            trained: false,
            created_at: None,
            last_seen: None,
            access_count: 0,
        });
        entry.created_at = Some(row.created_at);
        entry.last_seen = row.last_seen;
        entry.access_count = row.access_count;
    }

    Ok(users.into_values().collect())
}

async fn index_handler(State(state): State<DashboardState>) -> Result<Html<String>, DashboardError> {
    let (logs, users) = blocking(state, |s| {
        let logs = s.store.recent_logs(PAGE_LOG_LIMIT)?;
        let users = registered_users(&s.store, &s.gallery_dir)?;
        Ok((logs, users))
    })
    .await?;

    let mut page = String::from(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Warden</title>\
         <meta http-equiv=\"refresh\" content=\"10\"></head><body>\n\
         <h1>Door Access</h1>\n<img src=\"/frame.jpg\" alt=\"camera\" width=\"640\">\n\
         <h2>Recent events</h2>\n<table border=\"1\">\
         <tr><th>Time</th><th>Event</th><th>Person</th><th>Details</th></tr>\n",
    );
    for log in &logs {
        let _ = writeln!(
            page,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&log.timestamp),
            escape_html(&log.event_type),
            escape_html(log.person_name.as_deref().unwrap_or("")),
            escape_html(log.details.as_deref().unwrap_or("")),
        );
    }
    page.push_str(
        "</table>\n<h2>Users</h2>\n<table border=\"1\">\
         <tr><th>Name</th><th>Trained</th><th>Enrolled</th><th>Last seen</th><th>Accesses</th></tr>\n",
    );
    for user in &users {
        let _ = writeln!(
            page,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape_html(&user.name),
            if user.trained { "yes" } else { "no" },
            escape_html(user.created_at.as_deref().unwrap_or("")),
            escape_html(user.last_seen.as_deref().unwrap_or("never")),
            user.access_count,
        );
    }
    page.push_str("</table>\n</body></html>\n");

    Ok(Html(page))
}

async fn logs_handler(State(state): State<DashboardState>) -> Result<impl IntoResponse, DashboardError> {
    let logs = blocking(state, |s| Ok(s.store.recent_logs(API_LOG_LIMIT)?)).await?;
    Ok(Json(logs))
}

async fn users_handler(State(state): State<DashboardState>) -> Result<impl IntoResponse, DashboardError> {
    let users = blocking(state, |s| registered_users(&s.store, &s.gallery_dir)).await?;
    Ok(Json(users))
}

/// Remove the embedding file and the store row. 404 when neither existed.
async fn delete_user_handler(
    State(state): State<DashboardState>,
    UrlPath(name): UrlPath<String>,
) -> Result<Response, DashboardError> {
    let target = name.clone();
    let (removed_file, removed_row) = blocking(state, move |s| {
        let removed_file = gallery::remove_identity(&s.gallery_dir, &target)?;
        let removed_row = s.store.delete_user(&target)?;
        Ok((removed_file, removed_row))
    })
    .await?;

    if !removed_file && !removed_row {
        let body = serde_json::json!({ "status": "error", "message": format!("User {name} not found") });
        return Ok((StatusCode::NOT_FOUND, Json(body)).into_response());
    }

    tracing::info!(name = %name, removed_file, removed_row, "user deleted from dashboard");
    let body = serde_json::json!({ "status": "success", "message": format!("User {name} deleted") });
    Ok(Json(body).into_response())
}

async fn frame_handler(State(state): State<DashboardState>) -> Response {
    let latest = state.frames.borrow().clone();
    match latest {
        Some(jpeg) => (
            [
                (header::CONTENT_TYPE, "image/jpeg"),
                (header::CACHE_CONTROL, "no-cache, private"),
            ],
            jpeg,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no frame captured yet").into_response(),
    }
}

async fn health_handler(State(state): State<DashboardState>) -> impl IntoResponse {
    let frame_available = state.frames.borrow().is_some();
    let users = blocking(state, |s| Ok(s.store.list_users()?.len())).await.ok();
    Json(serde_json::json!({
        "status": if users.is_some() { "healthy" } else { "degraded" },
        "frame_available": frame_available,
        "users": users,
    }))
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Method, Request};
    use tower::ServiceExt;
    use warden_core::{AccessEventKind, Embedding, EnrolledIdentity};

    struct Fixture {
        _dir: tempfile::TempDir,
        state: DashboardState,
        frames: watch::Sender<Option<Vec<u8>>>,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(Store::open_in_memory().unwrap());
        let (frames, rx) = watch::channel(None);
        let state = DashboardState {
            store,
            gallery_dir: dir.path().to_path_buf(),
            frames: rx,
        };
        Fixture { _dir: dir, state, frames }
    }

    async fn send(state: &DashboardState, method: Method, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = router(state.clone())
            .oneshot(Request::builder().method(method).uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_logs_newest_first() {
        let fx = fixture();
        fx.state.store.record_access_event(AccessEventKind::SystemStarted, None, None).unwrap();
        fx.state
            .store
            .record_access_event(AccessEventKind::AuthorizedAccess, Some("alice"), None)
            .unwrap();

        let (status, body) = send(&fx.state, Method::GET, "/api/logs").await;
        assert_eq!(status, StatusCode::OK);
        let logs: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(logs[0]["event_type"], "Authorized Access");
        assert_eq!(logs[0]["person_name"], "alice");
        assert_eq!(logs[1]["event_type"], "System Started");
    }

    fn enroll_file(dir: &Path, name: &str) {
        let identity = EnrolledIdentity {
            name: name.into(),
            embedding: Embedding::new(vec![0.1, 0.2]),
        };
        gallery::save_identity(dir, &identity).unwrap();
    }

    #[tokio::test]
    async fn test_users_listed() {
        let fx = fixture();
        fx.state.store.add_user("bob").unwrap();
        fx.state.store.add_user("alice").unwrap();

        let (status, body) = send(&fx.state, Method::GET, "/api/users").await;
        assert_eq!(status, StatusCode::OK);
        let users: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(users[0]["name"], "alice");
        assert_eq!(users[1]["access_count"], 0);
    }

    #[tokio::test]
    async fn test_users_merge_gallery_and_store() {
        let fx = fixture();
        fx.state.store.add_user("alice").unwrap();
        fx.state.store.add_user("bob").unwrap();
        enroll_file(&fx.state.gallery_dir, "alice");
        enroll_file(&fx.state.gallery_dir, "carol");

        let (status, body) = send(&fx.state, Method::GET, "/api/users").await;
        assert_eq!(status, StatusCode::OK);
        let users: serde_json::Value = serde_json::from_slice(&body).unwrap();
        let users = users.as_array().unwrap();
        assert_eq!(users.len(), 3);

        assert_eq!(users[0]["name"], "alice");
        assert_eq!(users[0]["trained"], true);
        assert!(users[0]["created_at"].is_string());

        // Store row with no embedding file.
        assert_eq!(users[1]["name"], "bob");
        assert_eq!(users[1]["trained"], false);

        // Embedding file with no store row.
        assert_eq!(users[2]["name"], "carol");
        assert_eq!(users[2]["trained"], true);
        assert!(users[2]["created_at"].is_null());
        assert_eq!(users[2]["access_count"], 0);
    }

    #[tokio::test]
    async fn test_store_work_runs_on_blocking_pool() {
        let fx = fixture();
        let caller = std::thread::current().id();
        let worker = blocking(fx.state.clone(), |_| Ok(std::thread::current().id()))
            .await
            .unwrap();
        assert_ne!(worker, caller);
    }

    #[tokio::test]
    async fn test_delete_user_removes_file_and_row() {
        let fx = fixture();
        fx.state.store.add_user("alice").unwrap();
        enroll_file(&fx.state.gallery_dir, "alice");

        let (status, body) = send(&fx.state, Method::DELETE, "/api/users/alice").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "success");
        assert!(!gallery::contains(&fx.state.gallery_dir, "alice"));
        assert!(fx.state.store.get_user("alice").unwrap().is_none());

        let (status, _) = send(&fx.state, Method::DELETE, "/api/users/alice").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_rejects_path_names() {
        let fx = fixture();
        let (status, _) = send(&fx.state, Method::DELETE, "/api/users/a%2Fb").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_frame_unavailable_then_served() {
        let fx = fixture();
        let (status, _) = send(&fx.state, Method::GET, "/frame.jpg").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

        fx.frames.send_replace(Some(vec![0xFF, 0xD8, 0xFF, 0xD9]));
        let (status, body) = send(&fx.state, Method::GET, "/frame.jpg").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, vec![0xFF, 0xD8, 0xFF, 0xD9]);
    }

    #[tokio::test]
    async fn test_index_escapes_names() {
        let fx = fixture();
        fx.state.store.add_user("<script>").unwrap();
        fx.state
            .store
            .record_access_event(AccessEventKind::DoorOpened, Some("<script>"), None)
            .unwrap();

        let (status, body) = send(&fx.state, Method::GET, "/").await;
        assert_eq!(status, StatusCode::OK);
        let html = String::from_utf8(body).unwrap();
        assert!(html.contains("&lt;script&gt;"));
        assert!(!html.contains("<script>"));
        assert!(html.contains("Door Opened"));
    }

    #[tokio::test]
    async fn test_health() {
        let fx = fixture();
        let (status, body) = send(&fx.state, Method::GET, "/health").await;
        assert_eq!(status, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["frame_available"], false);
    }
}
