//! Query normalization and conversational rewriting.

use crate::rag::conversation::history::ConversationTurn;
use crate::rag::core::hashing::normalize_text;
use crate::rag::retrieval::tokenize::words;

/// Words that usually point back at an earlier question.
const REFERRING_WORDS: &[&str] = &[
    "he", "her", "him", "it", "its", "she", "that", "them", "there", "these", "they", "this",
    "those",
];

/// Questions with at most this many words are treated as follow-ups.
const SHORT_QUESTION_WORDS: usize = 3;

/// Normalize a query for cache keys and usage counting.
#[must_use]
pub fn normalize_query(text: &str) -> String {
    normalize_text(text)
}

/// Whether a question depends on earlier turns to be understood.
#[must_use]
pub fn is_follow_up(question: &str) -> bool {
    let words = words(question);
    words.len() <= SHORT_QUESTION_WORDS
        || words
            .iter()
            .any(|word| REFERRING_WORDS.contains(&word.as_str()))
}

/// Build the text used for retrieval and caching.
///
/// Follow-up questions are prefixed with the previous question of the
/// same user so that "and its license?" still retrieves the right chunks.
#[must_use]
pub fn rewrite_query(question: &str, history: &[ConversationTurn]) -> String {
    let question = question.trim();
    match history.last() {
        Some(previous) if is_follow_up(question) => {
            format!("{} {question}", previous.question.trim())
        }
        _ => question.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn turn(question: &str) -> ConversationTurn {
        ConversationTurn {
            question: question.to_string(),
            answer: "answer".to_string(),
            at: Utc::now(),
        }
    }

    #[test]
    fn test_follow_up_detection() {
        assert!(is_follow_up("and the license?"));
        assert!(is_follow_up("Who maintains it these days?"));
        assert!(!is_follow_up("How does reciprocal rank fusion combine rankings?"));
    }

    #[test]
    fn test_rewrite_without_history_is_identity() {
        assert_eq!(rewrite_query("  why?  ", &[]), "why?");
    }

    #[test]
    fn test_rewrite_prefixes_previous_question() {
        let history = vec![turn("old question"), turn("What is the tokio runtime?")];
        assert_eq!(
            rewrite_query("Is it multithreaded?", &history),
            "What is the tokio runtime? Is it multithreaded?"
        );
    }

    #[test]
    fn test_standalone_question_not_rewritten() {
        let history = vec![turn("What is the tokio runtime?")];
        let question = "How does BM25 normalize document length?";
        assert_eq!(rewrite_query(question, &history), question);
    }

    #[test]
    fn test_normalize_query() {
        assert_eq!(normalize_query(" What  is RRF "), "what is rrf");
    }
}
