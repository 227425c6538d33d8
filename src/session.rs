use crate::command::CommandInvoker;
use crate::errors::{AppError, AppResult};
use crate::models::Requester;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use uuid::Uuid;

/// One logged-in caller and their private undo history.
#[derive(Debug)]
pub struct Session {
    pub token: String,
    pub requester: Requester,
    pub opened_at: DateTime<Utc>,
    history: Mutex<CommandInvoker>,
}

#[derive(Clone, Default)]
pub struct SessionManager {
    sessions: Arc<Mutex<HashMap<String, Arc<Session>>>>,
}

impl SessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_session(&self, requester: Requester, max_undo_depth: Option<usize>) -> String {
        let token = Uuid::new_v4().to_string();
        let session = Session {
            token: token.clone(),
            requester,
            opened_at: Utc::now(),
            history: Mutex::new(CommandInvoker::with_max_depth(max_undo_depth)),
        };

        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions.insert(token.clone(), Arc::new(session));
        tracing::info!(user_id = %requester.user_id, role = requester.role.as_str(), "session opened");

        token
    }

    pub fn session(&self, token: &str) -> AppResult<Arc<Session>> {
        let sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        sessions
            .get(token)
            .cloned()
            .ok_or_else(|| AppError::NotFound("No active session for token".to_string()))
    }

    pub fn requester(&self, token: &str) -> AppResult<Requester> {
        Ok(self.session(token)?.requester)
    }

    /// Runs `f` with exclusive access to the session's undo history.
    pub fn with_history<R>(&self, token: &str, f: impl FnOnce(&mut CommandInvoker) -> R) -> AppResult<R> {
        let session = self.session(token)?;
        let mut history = session.history.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(f(&mut history))
    }

    /// Returns false when the token was unknown.
    pub fn close_session(&self, token: &str) -> bool {
        let mut sessions = self.sessions.lock().unwrap_or_else(PoisonError::into_inner);
        let closed = sessions.remove(token).is_some();
        if closed {
            tracing::info!("session closed");
        }
        closed
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}
