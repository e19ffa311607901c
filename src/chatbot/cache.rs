//! Bounded, idle-expiring store of per-conversation history.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use log::debug;

use crate::config::ContextConfig;
use crate::types::{ConversationKey, MessageRole};

/// Alternating user/assistant turns of one conversation, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationHistory {
    turns: Vec<String>,
}

impl ConversationHistory {
    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Turns paired with their role, oldest first.
    pub fn turns(&self) -> impl Iterator<Item = (MessageRole, &str)> {
        self.turns
            .iter()
            .enumerate()
            .map(|(idx, text)| (MessageRole::for_turn(idx), text.as_str()))
    }

    /// Role the next appended turn will take.
    #[must_use]
    pub fn next_role(&self) -> MessageRole {
        MessageRole::for_turn(self.turns.len())
    }

    fn push(&mut self, role: MessageRole, text: String, max_turns: usize) {
        match role {
            MessageRole::User if self.next_role() == MessageRole::Assistant => {
                // The previous exchange failed and left an unanswered user turn.
                debug!("Replacing unanswered user turn");
                self.turns.pop();
            }
            MessageRole::Assistant if self.next_role() == MessageRole::User => {
                debug!("Dropping assistant turn without a preceding user turn");
                return;
            }
            _ => {}
        }
        self.turns.push(text);

        if self.turns.len() > max_turns {
            self.turns.drain(..2);
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    history: ConversationHistory,
    last_touch: Instant,
    touch_seq: u64,
}

/// Owns the history of every conversation the bot is taking part in.
///
/// Entries idle for longer than `max_idle_time` are dropped on the next access,
/// and when more than `max_conversations` keys are tracked the least recently
/// touched one makes room for the new one.
#[derive(Debug)]
pub struct ContextCache {
    entries: HashMap<ConversationKey, CacheEntry>,
    max_conversations: usize,
    max_idle_time: Duration,
    interactions_limit: usize,
    next_seq: u64,
}

impl ContextCache {
    #[must_use]
    pub fn new(
        max_conversations: usize,
        max_idle_time: Duration,
        interactions_limit: usize,
    ) -> Self {
        Self {
            entries: HashMap::new(),
            max_conversations: max_conversations.max(1),
            max_idle_time,
            interactions_limit: interactions_limit.max(1),
            next_seq: 0,
        }
    }

    #[must_use]
    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.max_users, config.max_idle_time(), config.interactions)
    }

    /// Number of live conversations, expired ones included until the next access.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get_or_create(&mut self, key: &ConversationKey) -> &mut ConversationHistory {
        self.get_or_create_at(key, Instant::now())
    }

    /// Appends the next turn of `key` and returns the resulting history.
    pub fn append(
        &mut self,
        key: &ConversationKey,
        role: MessageRole,
        text: impl Into<String>,
    ) -> &ConversationHistory {
        self.append_at(key, role, text.into(), Instant::now())
    }

    fn append_at(
        &mut self,
        key: &ConversationKey,
        role: MessageRole,
        text: String,
        now: Instant,
    ) -> &ConversationHistory {
        let max_turns = self.interactions_limit * 2;
        let history = self.get_or_create_at(key, now);
        history.push(role, text, max_turns);
        history
    }

    fn get_or_create_at(
        &mut self,
        key: &ConversationKey,
        now: Instant,
    ) -> &mut ConversationHistory {
        self.expire(now);

        if !self.entries.contains_key(key) && self.entries.len() >= self.max_conversations {
            self.evict_least_recent();
        }

        let seq = self.next_seq;
        self.next_seq += 1;

        let entry = self.entries.entry(key.clone()).or_insert_with(|| {
            debug!("Starting conversation {key}");
            CacheEntry {
                history: ConversationHistory::default(),
                last_touch: now,
                touch_seq: seq,
            }
        });
        entry.last_touch = now;
        entry.touch_seq = seq;
        &mut entry.history
    }

    fn expire(&mut self, now: Instant) {
        let max_idle_time = self.max_idle_time;
        self.entries.retain(|key, entry| {
            let alive = now.saturating_duration_since(entry.last_touch) <= max_idle_time;
            if !alive {
                debug!("Conversation {key} expired");
            }
            alive
        });
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| (entry.last_touch, entry.touch_seq))
            .map(|(key, _)| key.clone());

        if let Some(key) = oldest {
            debug!("Evicting conversation {key} to make room");
            self.entries.remove(&key);
        }
    }
}
