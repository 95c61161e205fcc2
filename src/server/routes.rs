//! Asset server routes
//!
//! ```text
//! GET /          ──> index.html
//! GET /__data    ──> caller data as JSON
//! GET /<path>    ──> decode ──> normalize ──> find ──> expand (once per path) ──> bytes
//! ```

use crate::logger::SharedLogger;
use crate::template::TemplateSource;
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::{header, Method, Response, StatusCode, Uri};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use parking_lot::Mutex;
use percent_encoding::percent_decode_str;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tower_http::trace::TraceLayer;
use tracing::debug;

/// Path of the endpoint serving the caller's data object
pub const DATA_ENDPOINT: &str = "/__data";

/// File served for `/`
pub const INDEX_FILE: &str = "index.html";

/// Shared state of one asset server instance
pub struct AssetState {
    source: Arc<dyn TemplateSource>,
    data: Arc<Value>,
    cache: Mutex<HashMap<String, Arc<OnceCell<Bytes>>>>,
    logger: SharedLogger,
}

impl AssetState {
    /// Create state for a template tree and its data
    pub fn new(source: Arc<dyn TemplateSource>, data: Value, logger: SharedLogger) -> Self {
        Self {
            source,
            data: Arc::new(data),
            cache: Mutex::new(HashMap::new()),
            logger,
        }
    }

    /// Number of paths with a cache slot
    pub fn cached_paths(&self) -> usize {
        self.cache.lock().len()
    }

    fn slot(&self, path: &str) -> Arc<OnceCell<Bytes>> {
        self.cache
            .lock()
            .entry(path.to_string())
            .or_default()
            .clone()
    }

    /// Expanded content for `path`, expanding at most once
    async fn content(&self, path: &str) -> Option<Bytes> {
        let file = self.source.find(path)?;
        let slot = self.slot(path);
        let result = slot
            .get_or_try_init(|| async {
                debug!(path, "Expanding template file");
                self.source.expand(&file).map(Bytes::from)
            })
            .await;

        match result {
            Ok(bytes) => Some(bytes.clone()),
            Err(e) => {
                self.logger.error(&format!("Failed to expand {}: {}", path, e));
                None
            }
        }
    }
}

/// Build the router for an asset server
pub fn router(state: Arc<AssetState>) -> Router {
    Router::new()
        .route(DATA_ENDPOINT, get(serve_data))
        .fallback(serve_asset)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// GET /__data
async fn serve_data(State(state): State<Arc<AssetState>>) -> Json<Value> {
    Json(state.data.as_ref().clone())
}

/// Fallback handler resolving every other path against the template tree
async fn serve_asset(
    State(state): State<Arc<AssetState>>,
    method: Method,
    uri: Uri,
) -> Response<Body> {
    if method != Method::GET && method != Method::HEAD {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }

    let Ok(decoded) = percent_decode_str(uri.path()).decode_utf8() else {
        state
            .logger
            .warn(&format!("Asset path is not UTF-8: {}", uri.path()));
        return not_found();
    };

    let Some(path) = normalize_path(&decoded) else {
        state
            .logger
            .warn(&format!("Rejected asset path {}", uri.path()));
        return not_found();
    };

    match state.content(&path).await {
        Some(content) => {
            let mime = mime_guess::from_path(&path)
                .first_or_octet_stream()
                .to_string();
            let body = if method == Method::HEAD {
                Body::empty()
            } else {
                Body::from(content)
            };

            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, mime),
                    (header::CACHE_CONTROL, "no-cache".to_string()),
                ],
                body,
            )
                .into_response()
        }
        None => {
            state
                .logger
                .warn(&format!("Asset not found: {}", uri.path()));
            not_found()
        }
    }
}

fn not_found() -> Response<Body> {
    (StatusCode::NOT_FOUND, "Not found").into_response()
}

/// Map a request path to a logical template path
///
/// `/` becomes `index.html`, separators are normalized to `/`, and empty or
/// `.` segments are dropped. Paths containing `..` are rejected.
pub fn normalize_path(raw: &str) -> Option<String> {
    let mut segments = Vec::new();
    for segment in raw.split(['/', '\\']) {
        match segment {
            "" | "." => continue,
            ".." => return None,
            s => segments.push(s),
        }
    }

    if segments.is_empty() {
        return Some(INDEX_FILE.to_string());
    }
    Some(segments.join("/"))
}
