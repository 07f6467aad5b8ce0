//! Per-user conversation history.
//!
//! Every user id is its own thread: turns are kept in a bounded window and
//! used to rewrite follow-up questions before retrieval.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::rag::core::ids::UserId;

/// One question/answer exchange.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    /// Question as asked by the user.
    pub question: String,
    /// Answer returned to the user.
    pub answer: String,
    /// Time of the exchange.
    pub at: DateTime<Utc>,
}

impl ConversationTurn {
    /// Create a turn stamped with the current time.
    #[must_use]
    pub fn new(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            at: Utc::now(),
        }
    }
}

/// Bounded history for every user.
pub struct ConversationStore {
    window: usize,
    threads: DashMap<UserId, VecDeque<ConversationTurn>>,
}

impl ConversationStore {
    /// Create a store keeping at most `window` turns per user.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            window: window.max(1),
            threads: DashMap::new(),
        }
    }

    /// Append a turn, dropping the oldest one beyond the window.
    pub fn record(&self, user: &UserId, turn: ConversationTurn) {
        let mut thread = self.threads.entry(user.clone()).or_default();
        thread.push_back(turn);
        while thread.len() > self.window {
            thread.pop_front();
        }
    }

    /// Recent turns, oldest first.
    #[must_use]
    pub fn recent(&self, user: &UserId) -> Vec<ConversationTurn> {
        self.threads
            .get(user)
            .map(|thread| thread.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Forget a user's history. Returns whether anything was removed.
    pub fn clear(&self, user: &UserId) -> bool {
        self.threads.remove(user).is_some()
    }

    /// Number of users with at least one turn.
    #[must_use]
    pub fn users(&self) -> usize {
        self.threads.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(name: &str) -> UserId {
        UserId::new(name).unwrap()
    }

    #[test]
    fn test_window_keeps_latest_turns() {
        let store = ConversationStore::new(2);
        let alice = user("alice");
        for i in 0..3 {
            store.record(&alice, ConversationTurn::new(format!("q{i}"), format!("a{i}")));
        }

        let questions: Vec<String> = store
            .recent(&alice)
            .into_iter()
            .map(|turn| turn.question)
            .collect();
        assert_eq!(questions, ["q1", "q2"]);
    }

    #[test]
    fn test_threads_are_per_user() {
        let store = ConversationStore::new(6);
        store.record(&user("alice"), ConversationTurn::new("q", "a"));

        assert_eq!(store.recent(&user("alice")).len(), 1);
        assert!(store.recent(&user("bob")).is_empty());
        assert_eq!(store.users(), 1);
    }

    #[test]
    fn test_clear() {
        let store = ConversationStore::new(6);
        let alice = user("alice");
        store.record(&alice, ConversationTurn::new("q", "a"));

        assert!(store.clear(&alice));
        assert!(!store.clear(&alice));
        assert!(store.recent(&alice).is_empty());
    }
}
