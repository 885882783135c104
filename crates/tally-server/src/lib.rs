//! Tally Web Server
//!
//! Axum-based REST API for the Tally conversational analytics engine.
//!
//! Security features:
//! - API key authentication (secure by default, use --no-auth for local dev)
//! - Restrictive CORS policy
//! - Dataset names validated against the data directory
//! - Sanitized error responses

use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::{set_header::SetResponseHeaderLayer, trace::TraceLayer, cors::CorsLayer};
use tracing::{error, info, warn};

use tally_core::{AnalyticsEngine, DatasetCache};

mod catalog;
mod handlers;

pub use catalog::{Catalog, DatasetEntry, Located};
pub use handlers::SessionManager;

/// Authorization header for API key auth
const AUTHORIZATION_HEADER: &str = "authorization";

/// Server configuration
#[derive(Clone)]
pub struct ServerConfig {
    /// Whether authentication is required (secure by default)
    pub require_auth: bool,
    /// Allowed CORS origins (empty = same-origin only)
    pub allowed_origins: Vec<String>,
    /// API keys accepted as "Bearer <key>" in the Authorization header
    pub api_keys: Vec<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            require_auth: true,
            allowed_origins: vec![],
            api_keys: vec![],
        }
    }
}

/// Shared application state
pub struct AppState {
    pub engine: AnalyticsEngine,
    pub cache: DatasetCache,
    pub catalog: Catalog,
    pub config: ServerConfig,
    /// Conversation history per session
    pub sessions: SessionManager,
}

/// Authentication middleware - validates API keys
///
/// Keys are compared in constant time to prevent timing attacks.
async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    if !state.config.require_auth {
        return next.run(request).await;
    }

    let api_key_valid = request
        .headers()
        .get(AUTHORIZATION_HEADER)
        .and_then(|v| v.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(|key| validate_api_key(key.trim(), &state.config.api_keys))
        .unwrap_or(false);

    if api_key_valid {
        tracing::debug!(path = %request.uri().path(), "Authenticated via API key");
        return next.run(request).await;
    }

    warn!(path = %request.uri().path(), "Unauthorized request - no valid API key");
    (
        StatusCode::UNAUTHORIZED,
        Json(serde_json::json!({
            "error": "Authentication required"
        })),
    )
        .into_response()
}

/// Validate an API key against the configured keys using constant-time comparison
fn validate_api_key(provided: &str, valid_keys: &[String]) -> bool {
    use subtle::ConstantTimeEq;

    let provided_bytes = provided.as_bytes();
    valid_keys.iter().any(|key| {
        let key_bytes = key.as_bytes();
        // Only compare if lengths match (constant-time for same-length keys)
        key_bytes.len() == provided_bytes.len() && bool::from(provided_bytes.ct_eq(key_bytes))
    })
}

/// Parse a comma-separated list of API keys (e.g. from TALLY_API_KEYS)
pub fn parse_api_keys(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Create the application router
pub fn create_router(engine: AnalyticsEngine, data_dir: impl Into<PathBuf>, config: ServerConfig) -> Router {
    let capacity = engine.config().engine.cache_capacity;
    let history_window = engine.config().engine.history_window;

    let state = Arc::new(AppState {
        engine,
        cache: DatasetCache::new(capacity),
        catalog: Catalog::new(data_dir),
        config: config.clone(),
        sessions: SessionManager::new(history_window),
    });

    let api_routes = Router::new()
        // Analytics
        .route("/advanced-analytics", post(handlers::advanced_analytics))
        .route("/system-status", get(handlers::system_status))
        // Datasets
        .route("/datasets", get(handlers::list_datasets))
        .route("/data-insights/:name", get(handlers::get_data_insights))
        // Conversation sessions
        .route("/session", post(handlers::create_session))
        .route(
            "/session/:id",
            get(handlers::get_session).delete(handlers::delete_session),
        );

    let methods = [Method::GET, Method::POST, Method::DELETE, Method::OPTIONS];
    let cors = if config.allowed_origins.is_empty() {
        // Restrictive default: only allow same-origin
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
    };

    Router::new()
        .nest("/api", api_routes)
        .layer(middleware::from_fn_with_state(state.clone(), auth_middleware))
        .with_state(state)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            header::CONTENT_SECURITY_POLICY,
            HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'"),
        ))
}

/// Start the server with custom configuration
pub async fn serve_with_config(
    engine: AnalyticsEngine,
    data_dir: PathBuf,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !config.require_auth {
        warn!("Authentication disabled - do not expose to network!");
    } else if config.api_keys.is_empty() {
        warn!("Authentication required but no API keys configured (set TALLY_API_KEYS)");
    }

    if !data_dir.is_dir() {
        warn!(path = %data_dir.display(), "Data directory does not exist yet");
    }

    let app = create_router(engine, data_dir.clone(), config);
    let addr = format!("{}:{}", host, port);

    info!(data_dir = %data_dir.display(), "Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    /// Hint for the caller (e.g. the closest column name)
    suggestion: Option<String>,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            suggestion: None,
            internal: None,
        }
    }

    pub fn not_found(msg: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.to_string(),
            suggestion: None,
            internal: None,
        }
    }

    pub fn unprocessable(msg: &str, suggestion: Option<String>) -> Self {
        Self {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: msg.to_string(),
            suggestion,
            internal: None,
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    /// Map an engine error to a response: caller mistakes become 4xx,
    /// everything else is logged and hidden behind a 500
    pub fn from_core(err: tally_core::Error) -> Self {
        use tally_core::Error;

        match err {
            Error::UnknownColumn { .. } => {
                Self::unprocessable(&err.to_string(), err.suggestion())
            }
            Error::InvalidData(_) | Error::Csv(_) => Self {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message: "Dataset could not be parsed".to_string(),
                suggestion: None,
                internal: Some(err.into()),
            },
            other => Self::from(other),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let mut body = serde_json::json!({
            "error": self.message
        });
        if let Some(suggestion) = self.suggestion {
            body["suggestion"] = serde_json::Value::String(suggestion);
        }

        (self.status, Json(body)).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        let err = err.into();
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            suggestion: None,
            // Keep full error for logging
            internal: Some(err),
        }
    }
}

#[cfg(test)]
mod tests;
