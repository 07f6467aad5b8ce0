//! Per-user conversation threads.

pub mod history;

pub use history::{ConversationStore, ConversationTurn};
