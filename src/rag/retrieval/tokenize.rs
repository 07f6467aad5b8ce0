//! Keyword tokenizer shared by the BM25 index and query rewriting.

/// Terms too common to carry ranking signal.
const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "do", "does", "for", "from", "how", "in",
    "is", "of", "on", "or", "the", "to", "was", "what", "when", "where", "which", "who", "why",
    "with",
];

/// Minimum token length in characters.
const MIN_TOKEN_CHARS: usize = 2;

/// Split text into lowercase alphanumeric terms, dropping stopwords and one-letter tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|raw| raw.chars().count() >= MIN_TOKEN_CHARS)
        .map(str::to_lowercase)
        .filter(|token| !is_stopword(token))
        .collect()
}

/// Split text into lowercase alphanumeric words without filtering.
#[must_use]
pub fn words(text: &str) -> Vec<String> {
    text.split(|ch: char| !ch.is_alphanumeric())
        .filter(|raw| !raw.is_empty())
        .map(str::to_lowercase)
        .collect()
}

fn is_stopword(token: &str) -> bool {
    STOPWORDS.binary_search(&token).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stopword_list_is_sorted() {
        let mut sorted = STOPWORDS.to_vec();
        sorted.sort_unstable();
        assert_eq!(sorted, STOPWORDS);
    }

    #[test]
    fn test_tokenize_lowercases_and_filters() {
        assert_eq!(
            tokenize("What is the BM25 ranking-function? A x"),
            vec!["bm25", "ranking", "function"]
        );
    }

    #[test]
    fn test_tokenize_keeps_unicode_letters() {
        assert_eq!(tokenize("Café déjà-vu"), vec!["café", "déjà", "vu"]);
    }

    #[test]
    fn test_words_keeps_everything() {
        assert_eq!(words("Is it ok?"), vec!["is", "it", "ok"]);
    }
}
