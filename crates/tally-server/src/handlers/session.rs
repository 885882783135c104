//! Conversation sessions
//!
//! A session keeps the last few turns of a conversation so short
//! follow-up queries ("and cost?") can continue the previous intent.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tally_core::Turn;
use tokio::sync::RwLock;
use tracing::debug;

use crate::{AppError, AppState};

/// Session timeout (30 minutes of inactivity)
const SESSION_TIMEOUT: Duration = Duration::from_secs(30 * 60);

#[derive(Debug, Clone)]
struct Session {
    created_at: Instant,
    last_activity: Instant,
    /// Oldest first
    turns: Vec<Turn>,
}

impl Session {
    fn new() -> Self {
        Self {
            created_at: Instant::now(),
            last_activity: Instant::now(),
            turns: Vec::new(),
        }
    }

    fn is_expired(&self, timeout: Duration) -> bool {
        self.last_activity.elapsed() > timeout
    }

    fn push_turn(&mut self, turn: Turn, max_turns: usize) {
        self.turns.push(turn);
        if self.turns.len() > max_turns {
            let excess = self.turns.len() - max_turns;
            self.turns.drain(..excess);
        }
        self.last_activity = Instant::now();
    }
}

/// In-memory session manager
#[derive(Debug)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Session>>,
    max_turns: usize,
    timeout: Duration,
    counter: AtomicU64,
}

impl SessionManager {
    pub fn new(max_turns: usize) -> Self {
        Self::with_timeout(max_turns, SESSION_TIMEOUT)
    }

    pub fn with_timeout(max_turns: usize, timeout: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_turns: max_turns.max(1),
            timeout,
            counter: AtomicU64::new(0),
        }
    }

    /// Create a new session and return its ID
    pub async fn create_session(&self) -> String {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let mut hasher = Sha256::new();
        hasher.update(timestamp.to_le_bytes());
        hasher.update(self.counter.fetch_add(1, Ordering::Relaxed).to_le_bytes());
        let session_id = format!("ses_{}", &hex::encode(hasher.finalize())[..16]);

        let mut sessions = self.sessions.write().await;

        // Clean up expired sessions while we're here
        sessions.retain(|_, s| !s.is_expired(self.timeout));

        sessions.insert(session_id.clone(), Session::new());
        session_id
    }

    /// Previous turns of a session (empty if not found or expired)
    pub async fn history(&self, session_id: &str) -> Vec<Turn> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|s| !s.is_expired(self.timeout))
            .map(|s| s.turns.clone())
            .unwrap_or_default()
    }

    /// Append a turn, creating the session if the client supplied an
    /// unknown ID. Expired sessions are purged first.
    pub async fn record_turn(&self, session_id: &str, turn: Turn) {
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| !s.is_expired(self.timeout));
        sessions
            .entry(session_id.to_string())
            .or_insert_with(Session::new)
            .push_turn(turn, self.max_turns);
    }

    pub async fn delete_session(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().await;
        sessions.remove(session_id).is_some()
    }

    pub async fn session_info(&self, session_id: &str) -> Option<SessionInfo> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .filter(|s| !s.is_expired(self.timeout))
            .map(|s| SessionInfo {
                session_id: session_id.to_string(),
                turn_count: s.turns.len(),
                last_intent: s.turns.last().map(|t| t.intent.to_string()),
                created_at_secs_ago: s.created_at.elapsed().as_secs(),
                last_activity_secs_ago: s.last_activity.elapsed().as_secs(),
            })
    }
}

/// Session info response
#[derive(Debug, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub turn_count: usize,
    pub last_intent: Option<String>,
    pub created_at_secs_ago: u64,
    pub last_activity_secs_ago: u64,
}

/// POST /api/session - Create a new conversation session
pub async fn create_session(State(state): State<Arc<AppState>>) -> Json<SessionInfo> {
    let session_id = state.sessions.create_session().await;
    debug!(session_id = %session_id, "Created session");

    Json(SessionInfo {
        session_id,
        turn_count: 0,
        last_intent: None,
        created_at_secs_ago: 0,
        last_activity_secs_ago: 0,
    })
}

/// GET /api/session/:id - Get session info
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, AppError> {
    let info = state
        .sessions
        .session_info(&session_id)
        .await
        .ok_or_else(|| AppError::not_found("Session not found or expired"))?;

    Ok(Json(info))
}

/// DELETE /api/session/:id - Delete a session
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Json<serde_json::Value> {
    let deleted = state.sessions.delete_session(&session_id).await;
    debug!(session_id = %session_id, deleted = deleted, "Deleted session");

    Json(serde_json::json!({ "deleted": deleted }))
}
