//! Short-term conversation memory for the recommendation agent

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use uuid::Uuid;

/// Default number of memories returned by `/memory/recent`
pub const DEFAULT_RECENT_LIMIT: usize = 5;

const MAX_MEMORIES: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    Conversation,
}

/// One remembered interaction
#[derive(Debug, Clone, Serialize)]
pub struct Memory {
    pub id: String,
    pub content: String,
    pub memory_type: MemoryType,
    pub importance: f32,
    pub tags: Vec<String>,
    pub metadata: Value,
    pub created_at: DateTime<Utc>,
}

/// Bounded, newest-last memory list
#[derive(Default)]
pub struct MemoryStore {
    memories: Mutex<VecDeque<Memory>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a conversation memory and return its id
    pub fn add_conversation(
        &self,
        content: impl Into<String>,
        importance: f32,
        tags: Vec<String>,
        metadata: Value,
    ) -> String {
        let memory = Memory {
            id: Uuid::new_v4().to_string(),
            content: content.into(),
            memory_type: MemoryType::Conversation,
            importance,
            tags,
            metadata,
            created_at: Utc::now(),
        };
        let id = memory.id.clone();

        let mut memories = self.memories.lock().unwrap_or_else(PoisonError::into_inner);
        memories.push_back(memory);
        if memories.len() > MAX_MEMORIES {
            memories.pop_front();
        }
        id
    }

    /// Most recent memories, newest first
    pub fn recent(&self, limit: usize) -> Vec<Memory> {
        let memories = self.memories.lock().unwrap_or_else(PoisonError::into_inner);
        memories.iter().rev().take(limit).cloned().collect()
    }
}
