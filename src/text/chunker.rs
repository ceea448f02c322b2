//! Sentence-aware chunking of dialogue for the TTS backend
//!
//! A line that fits the backend's word and character ceilings is sent as-is.
//! Longer lines are split into sentences, sentences are greedily packed up to
//! the prosody target, and a sentence that alone exceeds a ceiling is cut at
//! the last clause mark inside the window, or at a word boundary when there is
//! none. Words are never split.

use crate::production::Chunk;
use crate::script::ScriptLine;
use tracing::debug;

/// Marks that end a sentence when they close a word
const SENTENCE_TERMINATORS: &[char] = &['.', '!', '?', '…'];

/// Marks used as a fallback split point inside an oversized sentence
const CLAUSE_DELIMITERS: &[char] = &[',', ';', ':', '—', '–'];

/// Trailing characters ignored when looking for punctuation (`"Stop."`)
const CLOSING_MARKS: &[char] = &['"', '\'', '”', '’', ')', ']', '»'];

/// Size limits of the active backend
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChunkLimits {
    /// Hard ceiling; a chunk above it is rejected or mangled by the backend
    pub max_words: usize,

    /// Preferred chunk size for natural prosody
    pub target_words: usize,

    /// Hard character ceiling, counted with single spaces between words
    pub max_chars: usize,
}

impl ChunkLimits {
    /// Create word limits, forcing `1 <= target_words <= max_words`
    ///
    /// The character ceiling starts unbounded.
    pub fn new(max_words: usize, target_words: usize) -> Self {
        let max_words = max_words.max(1);
        Self {
            max_words,
            target_words: target_words.clamp(1, max_words),
            max_chars: usize::MAX,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars.max(1);
        self
    }

    fn fits(&self, words: usize, chars: usize) -> bool {
        words <= self.max_words && chars <= self.max_chars
    }
}

/// Number of whitespace separated words
pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split text into backend-sized chunks by word limits only
///
/// Chunks are trimmed and non-empty. Joining them with single spaces gives
/// back the original word sequence.
pub fn chunk_text(text: &str, max_words: usize, target_words: usize) -> Vec<String> {
    chunk_text_with(text, ChunkLimits::new(max_words, target_words))
}

/// Split text into chunks that respect every ceiling in `limits`
///
/// A single word longer than `max_chars` becomes a chunk of its own.
pub fn chunk_text_with(text: &str, limits: ChunkLimits) -> Vec<String> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Vec::new();
    }

    let words: Vec<&str> = trimmed.split_whitespace().collect();
    if limits.fits(words.len(), trimmed.chars().count()) {
        return vec![trimmed.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current: Vec<&str> = Vec::with_capacity(limits.max_words.min(words.len()));
    let mut current_chars = 0;

    for sentence in split_sentences(&words) {
        for piece in split_oversized(sentence, limits) {
            let piece_chars = span_chars(piece);
            if !current.is_empty()
                && (current.len() + piece.len() > limits.target_words
                    || current_chars + 1 + piece_chars > limits.max_chars)
            {
                chunks.push(current.join(" "));
                current.clear();
                current_chars = 0;
            }
            if !current.is_empty() {
                current_chars += 1;
            }
            current_chars += piece_chars;
            current.extend_from_slice(piece);
        }
    }

    if !current.is_empty() {
        chunks.push(current.join(" "));
    }

    debug!(
        "Chunked {} words into {} chunks (max {}, target {}, max chars {})",
        words.len(),
        chunks.len(),
        limits.max_words,
        limits.target_words,
        limits.max_chars
    );

    chunks
}

/// Chunk one script line into numbered chunks
pub fn chunk_line(line: &ScriptLine, limits: ChunkLimits) -> Vec<Chunk> {
    chunk_text_with(&line.text, limits)
        .into_iter()
        .enumerate()
        .map(|(sequence_index, text)| Chunk::new(line.order_index, sequence_index, text))
        .collect()
}

fn split_sentences<'a>(words: &'a [&'a str]) -> Vec<&'a [&'a str]> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (i, word) in words.iter().enumerate() {
        if ends_with_mark(word, SENTENCE_TERMINATORS) {
            sentences.push(&words[start..=i]);
            start = i + 1;
        }
    }

    if start < words.len() {
        sentences.push(&words[start..]);
    }

    sentences
}

fn split_oversized<'a>(sentence: &'a [&'a str], limits: ChunkLimits) -> Vec<&'a [&'a str]> {
    let mut pieces = Vec::new();
    let mut rest = sentence;

    while !limits.fits(rest.len(), span_chars(rest)) {
        let window = fitting_prefix(rest, limits);
        let cut = rest[..window]
            .iter()
            .rposition(|word| ends_with_mark(word, CLAUSE_DELIMITERS))
            .map(|i| i + 1)
            .unwrap_or(window);

        let (head, tail) = rest.split_at(cut);
        pieces.push(head);
        rest = tail;
    }

    if !rest.is_empty() {
        pieces.push(rest);
    }

    pieces
}

/// Longest prefix of `words` within both ceilings, at least one word
fn fitting_prefix(words: &[&str], limits: ChunkLimits) -> usize {
    let mut chars = 0;
    for (i, word) in words.iter().enumerate().take(limits.max_words) {
        chars += word.chars().count() + usize::from(i > 0);
        if chars > limits.max_chars {
            return i.max(1);
        }
    }
    words.len().min(limits.max_words)
}

/// Characters of `words` joined by single spaces
fn span_chars(words: &[&str]) -> usize {
    let chars: usize = words.iter().map(|w| w.chars().count()).sum();
    chars + words.len().saturating_sub(1)
}

fn ends_with_mark(word: &str, marks: &[char]) -> bool {
    word.trim_end_matches(CLOSING_MARKS).ends_with(marks)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words_of(chunks: &[String]) -> Vec<String> {
        chunks
            .join(" ")
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    fn sentence(len: usize, seed: usize) -> String {
        let words: Vec<String> = (0..len).map(|i| format!("w{}x{}", seed, i)).collect();
        format!("{}.", words.join(" "))
    }

    #[test]
    fn test_short_line_is_single_trimmed_chunk() {
        let chunks = chunk_text("  Hello   there. How are you?  ", 75, 50);
        assert_eq!(chunks, vec!["Hello   there. How are you?"]);
    }

    #[test]
    fn test_line_at_ceiling_is_not_split() {
        let chunks = chunk_text("One two. Three four.", 4, 2);
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_empty_input() {
        assert!(chunk_text("", 75, 50).is_empty());
        assert!(chunk_text(" \n\t ", 75, 50).is_empty());
    }

    #[test]
    fn test_greedy_sentence_packing() {
        let chunks = chunk_text("One two. Three four. Five six.", 4, 4);
        assert_eq!(chunks, vec!["One two. Three four.", "Five six."]);
    }

    #[test]
    fn test_closing_quote_ends_sentence() {
        let chunks = chunk_text("He said \"Stop.\" Then he left the room.", 5, 2);
        assert_eq!(chunks, vec!["He said \"Stop.\"", "Then he left the room."]);
    }

    #[test]
    fn test_oversized_sentence_splits_at_clause() {
        let mut words: Vec<String> = (0..100).map(|i| format!("w{}", i)).collect();
        words[39].push(',');
        words[89].push(';');
        words[99].push('.');
        let text = words.join(" ");

        let chunks = chunk_text(&text, 75, 50);

        assert_eq!(chunks.len(), 2);
        assert_eq!(word_count(&chunks[0]), 40);
        assert!(chunks[0].ends_with(','));
        assert_eq!(word_count(&chunks[1]), 60);
    }

    #[test]
    fn test_oversized_sentence_without_clause_splits_at_words() {
        let text: Vec<String> = (0..160).map(|i| format!("w{}", i)).collect();
        let chunks = chunk_text(&text.join(" "), 75, 50);

        let counts: Vec<usize> = chunks.iter().map(|c| word_count(c)).collect();
        assert_eq!(counts, vec![75, 75, 10]);
    }

    #[test]
    fn test_long_word_passes_through() {
        let word = "a".repeat(5000);
        let text = format!("{} {} {}", word, word, word);
        let chunks = chunk_text(&text, 1, 1);

        assert_eq!(chunks.len(), 3);
        assert!(chunks.iter().all(|c| c == &word));
    }

    #[test]
    fn test_word_sequence_preserved_for_any_ceiling() {
        let text = "Well, I never! Did you see that? The cat, the dog; and the bird \
                    all went — together — into the night... \"Really?\" she asked. \
                    Yes really, truly and completely without any doubt whatsoever";
        let original: Vec<String> = text.split_whitespace().map(str::to_string).collect();

        for max_words in 1..=20 {
            for target_words in 1..=max_words {
                let chunks = chunk_text(text, max_words, target_words);
                assert_eq!(
                    words_of(&chunks),
                    original,
                    "max {} target {}",
                    max_words,
                    target_words
                );
                assert!(chunks.iter().all(|c| !c.is_empty() && c.trim() == c));
                assert!(chunks.iter().all(|c| word_count(c) <= max_words));
            }
        }
    }

    #[test]
    fn test_five_hundred_word_line() {
        let lengths = [7, 12, 18, 9, 23];
        let mut sentences = Vec::new();
        let mut total = 0;
        let mut i = 0;
        while total < 500 {
            let len = lengths[i % lengths.len()].min(500 - total);
            sentences.push(sentence(len, i));
            total += len;
            i += 1;
        }
        let text = sentences.join(" ");
        assert_eq!(word_count(&text), 500);

        let chunks = chunk_text(&text, 75, 50);

        assert!(chunks.len() >= 7, "got {} chunks", chunks.len());
        for chunk in &chunks {
            assert!(word_count(chunk) <= 75);
            assert!(chunk.ends_with('.'), "chunk does not end on a sentence: {}", chunk);
        }
        assert_eq!(words_of(&chunks).len(), 500);
    }

    #[test]
    fn test_limits_are_clamped() {
        let limits = ChunkLimits::new(0, 0);
        assert_eq!((limits.max_words, limits.target_words), (1, 1));

        let limits = ChunkLimits::new(10, 40).with_max_chars(0);
        assert_eq!((limits.max_words, limits.target_words), (10, 10));
        assert_eq!(limits.max_chars, 1);
        assert_eq!(ChunkLimits::new(10, 5).max_chars, usize::MAX);
    }

    #[test]
    fn test_chunk_line_numbering() {
        let line = ScriptLine::new("A", "One two. Three four. Five six.", 3);
        let chunks = chunk_line(&line, ChunkLimits::new(4, 4));

        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.parent_line_index == 3));
        assert_eq!(chunks[0].sequence_index, 0);
        assert_eq!(chunks[1].sequence_index, 1);
        assert_eq!(chunks[1].text, "Five six.");
    }

    #[test]
    fn test_char_ceiling_splits_long_words() {
        let text = format!("{}.", vec!["internationalization"; 70].join(" "));
        let chunks = chunk_text_with(&text, ChunkLimits::new(75, 50).with_max_chars(300));

        let counts: Vec<usize> = chunks.iter().map(|c| word_count(c)).collect();
        assert_eq!(counts, vec![14, 14, 14, 14, 14]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 300));
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_char_ceiling_closes_sentence_packing() {
        // Two 4-word sentences of about 40 chars each
        let text = "Extraordinary circumstances demand much. \
                    Unbelievable adventures await everyone.";
        let limits = ChunkLimits::new(75, 50).with_max_chars(60);

        let chunks = chunk_text_with(text, limits);
        assert_eq!(
            chunks,
            vec![
                "Extraordinary circumstances demand much.",
                "Unbelievable adventures await everyone."
            ]
        );

        let unbounded = chunk_text_with(text, ChunkLimits::new(75, 50));
        assert_eq!(unbounded.len(), 1);
    }

    #[test]
    fn test_char_ceiling_prefers_clause_marks() {
        let text = "alpha beta gamma, delta epsilon zeta eta theta iota";
        let chunks = chunk_text_with(text, ChunkLimits::new(75, 50).with_max_chars(30));

        assert_eq!(chunks[0], "alpha beta gamma,");
        assert!(chunks.iter().all(|c| c.chars().count() <= 30));
        assert_eq!(chunks.join(" "), text);
    }

    #[test]
    fn test_word_longer_than_char_ceiling_stays_whole() {
        let long = "a".repeat(50);
        let text = format!("short {} words", long);
        let chunks = chunk_text_with(&text, ChunkLimits::new(75, 50).with_max_chars(20));

        assert_eq!(chunks, vec!["short".to_string(), long, "words".to_string()]);
    }
}
