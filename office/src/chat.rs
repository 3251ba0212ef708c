//! Chat history and speech bubbles.
//!
//! Broadcast delivery is at-least-once and unordered, so [`ChatLog`] dedupes
//! by message id. Both the ring and the seen-id set are bounded by the same
//! cap and evict together.

#[cfg(test)]
#[path = "chat_test.rs"]
mod chat_test;

use std::collections::{BTreeMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::presence::{ClientId, Participant};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub sender_client_id: ClientId,
    pub nickname: String,
    pub text: String,
    #[serde(deserialize_with = "crate::protocol::millis")]
    pub created_at: i64,
}

/// Trim and cap message text. `None` when nothing is left.
#[must_use]
pub fn sanitize_message_text(raw: &str, max_chars: usize) -> Option<String> {
    let text: String = raw.trim().chars().take(max_chars).collect();
    if text.is_empty() { None } else { Some(text) }
}

/// Bounded, deduplicated message history, oldest first.
#[derive(Debug, Clone)]
pub struct ChatLog {
    cap: usize,
    messages: VecDeque<ChatMessage>,
    seen: HashSet<String>,
}

impl ChatLog {
    #[must_use]
    pub fn new(cap: usize) -> Self {
        Self { cap: cap.max(1), messages: VecDeque::new(), seen: HashSet::new() }
    }

    /// Append unless the id was already seen. Returns `false` for duplicates.
    pub fn append(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.id.clone()) {
            return false;
        }
        self.messages.push_back(message);
        while self.messages.len() > self.cap {
            if let Some(evicted) = self.messages.pop_front() {
                self.seen.remove(&evicted.id);
            }
        }
        true
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        self.messages.iter()
    }

    #[must_use]
    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpeechBubble {
    pub client_id: ClientId,
    pub text: String,
    /// `created_at` of the message shown.
    pub created_at: i64,
    pub expires_at: i64,
}

/// Latest bubble per sender, swept lazily.
#[derive(Debug, Clone)]
pub struct BubbleBoard {
    ttl_ms: i64,
    bubbles: BTreeMap<ClientId, SpeechBubble>,
}

impl BubbleBoard {
    #[must_use]
    pub fn new(ttl_ms: i64) -> Self {
        Self { ttl_ms, bubbles: BTreeMap::new() }
    }

    /// Show `message` as its sender's bubble unless the current bubble holds
    /// a newer message. Returns whether the bubble changed.
    pub fn show(&mut self, client_id: &ClientId, message: &ChatMessage, now: i64) -> bool {
        if self.bubbles.get(client_id).is_some_and(|b| b.created_at > message.created_at) {
            return false;
        }
        let bubble = SpeechBubble {
            client_id: client_id.clone(),
            text: message.text.clone(),
            created_at: message.created_at,
            expires_at: now + self.ttl_ms,
        };
        self.bubbles.insert(client_id.clone(), bubble);
        true
    }

    /// Drop expired bubbles. Returns `true` only if something expired.
    pub fn sweep(&mut self, now: i64) -> bool {
        let before = self.bubbles.len();
        self.bubbles.retain(|_, b| b.expires_at > now);
        self.bubbles.len() != before
    }

    #[must_use]
    pub fn get(&self, client_id: &ClientId) -> Option<&SpeechBubble> {
        self.bubbles.get(client_id)
    }

    pub fn remove(&mut self, client_id: &ClientId) {
        self.bubbles.remove(client_id);
    }

    pub fn iter(&self) -> impl Iterator<Item = &SpeechBubble> {
        self.bubbles.values()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.bubbles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bubbles.is_empty()
    }
}

/// Who a message's bubble belongs to.
///
/// A known sender id wins. Otherwise a nickname matching exactly one
/// participant (case-insensitive). Ambiguous or unknown names get no bubble.
pub fn resolve_sender<'a>(
    message: &ChatMessage,
    participants: impl IntoIterator<Item = &'a Participant>,
) -> Option<ClientId> {
    let mut by_name = None;
    let mut name_hits = 0;
    let wanted = message.nickname.trim().to_lowercase();
    for p in participants {
        if p.client_id == message.sender_client_id {
            return Some(p.client_id.clone());
        }
        if !wanted.is_empty() && p.name.trim().to_lowercase() == wanted {
            name_hits += 1;
            by_name = Some(p.client_id.clone());
        }
    }
    if name_hits == 1 { by_name } else { None }
}
