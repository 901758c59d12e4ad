//! Conversation sessions.
//!
//! Tracks per-session question/answer exchanges so follow-up queries carry
//! recent context. History is bounded: once a session exceeds the configured
//! exchange count, the oldest exchanges fall off.

use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use uuid::Uuid;

pub struct SessionManager {
    sessions: RwLock<HashMap<String, VecDeque<(String, String)>>>,
    max_history: usize,
}

impl SessionManager {
    pub fn new(max_history: usize) -> Self {
        SessionManager {
            sessions: RwLock::new(HashMap::new()),
            max_history,
        }
    }

    /// Create a new empty session and return its id.
    pub fn create_session(&self) -> String {
        let session_id = format!("session_{}", Uuid::new_v4());
        self.sessions
            .write()
            .unwrap()
            .insert(session_id.clone(), VecDeque::new());
        session_id
    }

    /// Record one question/answer exchange. Unknown ids are created on the
    /// fly.
    pub fn add_exchange(&self, session_id: &str, question: &str, answer: &str) {
        let mut sessions = self.sessions.write().unwrap();
        let exchanges = sessions.entry(session_id.to_string()).or_default();
        exchanges.push_back((question.to_string(), answer.to_string()));
        while exchanges.len() > self.max_history {
            exchanges.pop_front();
        }
    }

    /// Formatted transcript of the retained exchanges, oldest first. None
    /// when the session is unknown or has no exchanges yet.
    pub fn get_history(&self, session_id: &str) -> Option<String> {
        let sessions = self.sessions.read().unwrap();
        let exchanges = sessions.get(session_id)?;
        if exchanges.is_empty() {
            return None;
        }
        let lines: Vec<String> = exchanges
            .iter()
            .map(|(question, answer)| format!("User: {}\nAssistant: {}", question, answer))
            .collect();
        Some(lines.join("\n"))
    }

    pub fn clear_session(&self, session_id: &str) {
        self.sessions.write().unwrap().remove(session_id);
    }
}
