//! Persistence boundary for chat history.
//!
//! The engine never touches storage; callers load history through a
//! `MessageStore`, project it per platform with `history_for_platform`, and
//! save the final messages after the turn. The in-memory store backs the
//! CLI and tests; a database-backed store would implement the same trait.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use braid_abstraction::{ChatMessage, ClientType};

use crate::error::{EngineError, Result};

/// Character cap on auto-derived chat titles.
const TITLE_CHARS: usize = 50;

/// One stored message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned id; `0` until first saved.
    pub id: i64,
    /// Chat this message belongs to.
    pub chat_id: i64,
    /// Message text.
    pub content: String,
    /// `None` marks a user message; `Some` the platform that answered.
    pub platform: Option<ClientType>,
    /// Id of the user message an assistant reply answers.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub linked_message_id: Option<i64>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Creates an unsaved user message.
    #[must_use]
    pub fn user(chat_id: i64, content: impl Into<String>) -> Self {
        Self {
            id: 0,
            chat_id,
            content: content.into(),
            platform: None,
            linked_message_id: None,
            created_at: Utc::now(),
        }
    }

    /// Creates an unsaved assistant reply from `platform`.
    #[must_use]
    pub fn assistant(chat_id: i64, platform: ClientType, content: impl Into<String>) -> Self {
        Self {
            id: 0,
            chat_id,
            content: content.into(),
            platform: Some(platform),
            linked_message_id: None,
            created_at: Utc::now(),
        }
    }

    /// Links this reply to the user message it answers.
    #[must_use]
    pub const fn with_link(mut self, linked_message_id: i64) -> Self {
        self.linked_message_id = Some(linked_message_id);
        self
    }
}

/// One stored conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatRoom {
    /// Store-assigned id; `0` until first saved.
    pub id: i64,
    /// Display title. Derived from the first message when first saved.
    pub title: String,
    /// Platforms participating in this chat's fan-out.
    pub enabled_platforms: Vec<ClientType>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl ChatRoom {
    /// Creates an unsaved chat room.
    #[must_use]
    pub fn new(title: impl Into<String>, enabled_platforms: Vec<ClientType>) -> Self {
        Self { id: 0, title: title.into(), enabled_platforms, created_at: Utc::now() }
    }
}

/// Storage for chats and their messages.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// All chats, most recent first.
    async fn fetch_chat_list(&self) -> Result<Vec<ChatRoom>>;

    /// All messages of one chat, in conversation order.
    async fn fetch_messages(&self, chat_id: i64) -> Result<Vec<Message>>;

    /// Saves a chat and its full message list.
    ///
    /// A room with id `0` is created: it receives a fresh id, its messages
    /// are re-linked to it, and the title derives from the first message.
    /// An existing room is updated in place; messages with id `0` receive
    /// fresh ids, others keep theirs.
    async fn save_chat(&self, room: ChatRoom, messages: Vec<Message>) -> Result<ChatRoom>;
}

/// Projects a stored conversation into the history one platform sees: every
/// user message plus that platform's own replies, in creation order.
#[must_use]
pub fn history_for_platform(messages: &[Message], platform: ClientType) -> Vec<ChatMessage> {
    let mut visible: Vec<&Message> = messages
        .iter()
        .filter(|m| m.platform.is_none() || m.platform == Some(platform))
        .collect();
    visible.sort_by_key(|m| (m.created_at, m.id));
    visible
        .iter()
        .map(|m| {
            if m.platform.is_none() {
                ChatMessage::user(m.content.clone())
            } else {
                ChatMessage::assistant(m.content.clone())
            }
        })
        .collect()
}

#[derive(Default)]
struct StoreInner {
    rooms: Vec<ChatRoom>,
    messages: HashMap<i64, Vec<Message>>,
    next_chat_id: i64,
    next_message_id: i64,
}

impl StoreInner {
    fn alloc_chat_id(&mut self) -> i64 {
        self.next_chat_id += 1;
        self.next_chat_id
    }

    fn alloc_message_id(&mut self) -> i64 {
        self.next_message_id += 1;
        self.next_message_id
    }
}

/// In-memory `MessageStore`.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageStore for MemoryStore {
    async fn fetch_chat_list(&self) -> Result<Vec<ChatRoom>> {
        let inner = self.inner.read().await;
        let mut rooms = inner.rooms.clone();
        rooms.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(rooms)
    }

    async fn fetch_messages(&self, chat_id: i64) -> Result<Vec<Message>> {
        let inner = self.inner.read().await;
        if !inner.rooms.iter().any(|room| room.id == chat_id) {
            return Err(EngineError::ChatNotFound(chat_id));
        }
        Ok(inner.messages.get(&chat_id).cloned().unwrap_or_default())
    }

    async fn save_chat(&self, room: ChatRoom, messages: Vec<Message>) -> Result<ChatRoom> {
        let mut inner = self.inner.write().await;

        let mut room = room;
        if room.id == 0 {
            room.id = inner.alloc_chat_id();
            if let Some(first) = messages.first() {
                room.title = derive_title(&first.content);
            }
            inner.rooms.push(room.clone());
        } else {
            let position = inner
                .rooms
                .iter()
                .position(|existing| existing.id == room.id)
                .ok_or(EngineError::ChatNotFound(room.id))?;
            inner.rooms[position] = room.clone();
        }

        let chat_id = room.id;
        let mut stored = Vec::with_capacity(messages.len());
        for mut message in messages {
            message.chat_id = chat_id;
            if message.id == 0 {
                message.id = inner.alloc_message_id();
            }
            stored.push(message);
        }
        inner.messages.insert(chat_id, stored);

        Ok(room)
    }
}

/// First line's worth of a message, flattened and capped, as a chat title.
fn derive_title(content: &str) -> String {
    content.replace('\n', " ").chars().take(TITLE_CHARS).collect()
}
