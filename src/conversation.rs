use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::docs::types::Citation;

/// Turns considered by [`ConversationMemory::history_context`].
const HISTORY_WINDOW: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "User"),
            Role::Assistant => write!(f, "Assistant"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Only on user turns that triggered retrieval.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Citation>>,
}

impl ConversationTurn {
    fn line(&self) -> String {
        format!("{}: {}", self.role, self.content)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    /// Seconds since this memory was created.
    pub session_duration: f64,
    pub last_message_time: Option<DateTime<Utc>>,
}

/// Bounded FIFO of turns for one session. Oldest turns are evicted first.
#[derive(Debug)]
pub struct ConversationMemory {
    max_turns: usize,
    turns: VecDeque<ConversationTurn>,
    started_at: DateTime<Utc>,
}

impl ConversationMemory {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            turns: VecDeque::with_capacity(max_turns.min(64)),
            started_at: Utc::now(),
        }
    }

    pub fn append(&mut self, role: Role, content: impl Into<String>, sources: Option<Vec<Citation>>) {
        self.turns.push_back(ConversationTurn {
            role,
            content: content.into(),
            timestamp: Utc::now(),
            sources,
        });
        while self.turns.len() > self.max_turns {
            self.turns.pop_front();
        }
    }

    /// The last `last_n` turns as `"{Role}: {content}"` lines, oldest first.
    pub fn recent_context(&self, last_n: usize) -> String {
        let skip = self.turns.len().saturating_sub(last_n);
        self.turns
            .iter()
            .skip(skip)
            .map(ConversationTurn::line)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Like [`Self::recent_context`] but bounded by characters: walks back
    /// from the newest of the last ten turns and stops at the first turn that
    /// would overflow `max_chars`.
    pub fn history_context(&self, max_chars: usize) -> String {
        let skip = self.turns.len().saturating_sub(HISTORY_WINDOW);
        let mut kept: Vec<String> = Vec::new();
        let mut used = 0usize;
        for turn in self.turns.iter().skip(skip).rev() {
            let line = turn.line();
            let len = line.chars().count();
            if used + len > max_chars {
                break;
            }
            used += len;
            kept.push(line);
        }
        kept.reverse();
        kept.join("\n")
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn summary(&self) -> ConversationSummary {
        let user_messages = self.turns.iter().filter(|t| t.role == Role::User).count();
        let elapsed = Utc::now() - self.started_at;
        ConversationSummary {
            total_messages: self.turns.len(),
            user_messages,
            assistant_messages: self.turns.len() - user_messages,
            session_duration: elapsed.num_milliseconds().max(0) as f64 / 1000.0,
            last_message_time: self.turns.back().map(|t| t.timestamp),
        }
    }
}

/// Conversation memories keyed by session id. Independent of the session
/// store: a memory exists once something asks for it.
pub struct ConversationStore {
    max_turns: usize,
    conversations: Mutex<HashMap<String, Arc<Mutex<ConversationMemory>>>>,
}

impl ConversationStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            conversations: Mutex::new(HashMap::new()),
        }
    }

    /// Idempotent: returns the existing memory or creates an empty one.
    pub async fn get_or_create(&self, session_id: &str) -> Arc<Mutex<ConversationMemory>> {
        let mut conversations = self.conversations.lock().await;
        conversations
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!(session_id, "conversation memory created");
                Arc::new(Mutex::new(ConversationMemory::new(self.max_turns)))
            })
            .clone()
    }

    /// The existing memory, if any. Never creates one.
    pub async fn get(&self, session_id: &str) -> Option<Arc<Mutex<ConversationMemory>>> {
        self.conversations.lock().await.get(session_id).cloned()
    }

    pub async fn append(
        &self,
        session_id: &str,
        role: Role,
        content: impl Into<String>,
        sources: Option<Vec<Citation>>,
    ) {
        let memory = self.get_or_create(session_id).await;
        memory.lock().await.append(role, content, sources);
    }

    pub async fn recent_context(&self, session_id: &str, last_n: usize) -> String {
        let memory = self.get_or_create(session_id).await;
        let memory = memory.lock().await;
        memory.recent_context(last_n)
    }

    pub async fn history_context(&self, session_id: &str, max_chars: usize) -> String {
        let memory = self.get_or_create(session_id).await;
        let memory = memory.lock().await;
        memory.history_context(max_chars)
    }

    pub async fn clear(&self, session_id: &str) {
        let memory = self.get_or_create(session_id).await;
        memory.lock().await.clear();
        info!(session_id, "conversation cleared");
    }

    pub async fn summary(&self, session_id: &str) -> ConversationSummary {
        let memory = self.get_or_create(session_id).await;
        let memory = memory.lock().await;
        memory.summary()
    }

    /// Drop a session's memory entirely (used when the session is closed).
    pub async fn remove(&self, session_id: &str) {
        self.conversations.lock().await.remove(session_id);
    }

    /// Drop memories created more than `max_age` ago. Returns how many were dropped.
    pub async fn prune_older_than(&self, max_age: chrono::Duration) -> usize {
        let cutoff = Utc::now() - max_age;
        let mut conversations = self.conversations.lock().await;
        let mut stale = Vec::new();
        for (id, memory) in conversations.iter() {
            if memory.lock().await.started_at() < cutoff {
                stale.push(id.clone());
            }
        }
        for id in &stale {
            conversations.remove(id);
        }
        if !stale.is_empty() {
            info!(pruned = stale.len(), "old conversations pruned");
        }
        stale.len()
    }
}
