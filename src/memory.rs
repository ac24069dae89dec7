//! Dual conversational memory.
//!
//! Two cooperating stores with distinct roles:
//! - [`ConversationBuffer`] — the last N turns verbatim, in order. Recency.
//! - [`SemanticMemory`] — turns evicted from the buffer, embedded into the
//!   `memory` collection and recalled by similarity. Long-range relevance.
//!
//! A turn enters the buffer when it completes; when the buffer is full the
//! oldest turn is evicted and promoted into semantic memory, so no completed
//! turn is ever silently dropped.

use std::collections::VecDeque;

use anyhow::Result;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::embedding::{embed_query, Embedder};
use crate::vector_store::{QueryHit, VectorRecord, VectorStore};

/// Name of the vector collection that holds promoted turns.
pub const MEMORY_COLLECTION: &str = "memory";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
        }
    }
}

/// One completed conversation turn.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConversationTurn {
    pub turn_id: String,
    pub role: Role,
    pub text: String,
    /// Chunk ids cited by this turn, if it drew on indexed code.
    #[serde(default)]
    pub cited_chunk_ids: Vec<String>,
    pub timestamp: i64,
}

impl ConversationTurn {
    pub fn new(role: Role, text: impl Into<String>, cited_chunk_ids: Vec<String>) -> Self {
        Self {
            turn_id: Uuid::new_v4().to_string(),
            role,
            text: text.into(),
            cited_chunk_ids,
            timestamp: Utc::now().timestamp(),
        }
    }
}

/// Fixed-capacity window over the most recent turns.
#[derive(Debug)]
pub struct ConversationBuffer {
    turns: VecDeque<ConversationTurn>,
    capacity: usize,
}

impl ConversationBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            turns: VecDeque::with_capacity(capacity),
            capacity: capacity.max(1),
        }
    }

    /// Append a completed turn. Returns the evicted oldest turn when the
    /// buffer was already full; the caller promotes it into semantic memory.
    pub fn push(&mut self, turn: ConversationTurn) -> Option<ConversationTurn> {
        let evicted = if self.turns.len() == self.capacity {
            self.turns.pop_front()
        } else {
            None
        };
        self.turns.push_back(turn);
        evicted
    }

    /// Turns oldest-first.
    pub fn turns(&self) -> impl Iterator<Item = &ConversationTurn> {
        self.turns.iter()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

/// A recalled turn with its similarity score against the current query.
#[derive(Debug, Clone)]
pub struct RecalledTurn {
    pub turn: ConversationTurn,
    pub score: f32,
}

/// Similarity-addressed store of evicted turns.
pub struct SemanticMemory<'a> {
    store: &'a dyn VectorStore,
    embedder: &'a dyn Embedder,
}

impl<'a> SemanticMemory<'a> {
    pub fn new(store: &'a dyn VectorStore, embedder: &'a dyn Embedder) -> Self {
        Self { store, embedder }
    }

    /// Promote an evicted turn: embed its text and store it keyed by turn id.
    pub async fn insert(&self, turn: &ConversationTurn) -> Result<()> {
        let vector = embed_query(self.embedder, &turn.text).await?;
        self.store
            .upsert(VectorRecord {
                id: turn.turn_id.clone(),
                path: String::new(),
                vector,
                metadata: serde_json::to_value(turn)?,
            })
            .await
    }

    /// Recall the turns most similar to `query_text`, best first.
    pub async fn recall(&self, query_text: &str, top_n: usize) -> Result<Vec<RecalledTurn>> {
        if top_n == 0 {
            return Ok(Vec::new());
        }
        let vector = embed_query(self.embedder, query_text).await?;
        let hits = self.store.query(&vector, top_n).await?;
        Ok(hits.into_iter().filter_map(hit_to_turn).collect())
    }
}

fn hit_to_turn(hit: QueryHit) -> Option<RecalledTurn> {
    let turn: ConversationTurn = serde_json::from_value(hit.metadata).ok()?;
    Some(RecalledTurn {
        turn,
        score: hit.score,
    })
}
