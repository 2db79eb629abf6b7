use std::collections::{HashMap, VecDeque};

use tokio::sync::RwLock;

use tabletalk_core::intent::Turn;

/// Entries kept per session. One exchange is two entries, so this holds the
/// last ten exchanges.
const HISTORY_CAP: usize = 20;

/// In-memory conversation history, keyed by session id. Nothing here is
/// persisted; a restart forgets every session.
#[derive(Default)]
pub struct SessionStore {
    sessions: RwLock<HashMap<String, VecDeque<Turn>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// History for a session, oldest first. Unknown sessions are empty.
    pub async fn history(&self, session_id: &str) -> Vec<Turn> {
        let sessions = self.sessions.read().await;
        sessions
            .get(session_id)
            .map(|turns| turns.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Appends one question/response exchange and drops the oldest entries
    /// past the cap.
    pub async fn record_exchange(&self, session_id: &str, question: &str, response: &str) {
        let mut sessions = self.sessions.write().await;
        let turns = sessions.entry(session_id.to_string()).or_default();
        turns.push_back(Turn::user(question));
        turns.push_back(Turn::assistant(response));
        while turns.len() > HISTORY_CAP {
            turns.pop_front();
        }
    }
}
