//! Splits normalized speech text into synthesis-sized chunks.

use super::normalize::{protect, restore};

/// Length bounds for chunking, in characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLimits {
    /// Sentences longer than this are split on commas and semicolons.
    pub long_segment_chars: usize,
    /// Upper bound for every sub-segment produced from a long sentence.
    pub max_segment_chars: usize,
}

impl Default for ChunkLimits {
    fn default() -> Self {
        Self {
            long_segment_chars: 200,
            max_segment_chars: 150,
        }
    }
}

impl ChunkLimits {
    pub fn new(long_segment_chars: usize, max_segment_chars: usize) -> Self {
        Self {
            long_segment_chars: long_segment_chars.max(1),
            max_segment_chars: max_segment_chars.max(1),
        }
    }
}

/// Split `text` into chunks in speaking order.
///
/// Sentences end at `.`, `!` or `?` followed by whitespace or the end of the
/// text. Abbreviations and decimals never end a sentence. A sentence above
/// `long_segment_chars` is split after each comma or semicolon and the
/// clauses are packed greedily up to `max_segment_chars`.
pub fn chunk_text(text: &str, limits: &ChunkLimits) -> Vec<String> {
    let mut chunks = Vec::new();
    for sentence in split_sentences(&protect(text)) {
        let sentence = restore(&sentence);
        if char_len(&sentence) <= limits.long_segment_chars {
            chunks.push(sentence);
        } else {
            chunks.extend(pack(split_clauses(&sentence), limits.max_segment_chars));
        }
    }
    chunks
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if !matches!(ch, '.' | '!' | '?') {
            continue;
        }
        let ends = match chars.peek() {
            None => true,
            Some(next) => next.is_whitespace(),
        };
        if ends {
            push_trimmed(&mut sentences, &current);
            current.clear();
        }
    }
    push_trimmed(&mut sentences, &current);
    sentences
}

fn split_clauses(sentence: &str) -> Vec<String> {
    let mut clauses = Vec::new();
    let mut current = String::new();
    for ch in sentence.chars() {
        current.push(ch);
        if matches!(ch, ',' | ';') {
            push_trimmed(&mut clauses, &current);
            current.clear();
        }
    }
    push_trimmed(&mut clauses, &current);
    clauses
}

/// Greedily join pieces with spaces so no chunk exceeds `max` characters.
fn pack(pieces: Vec<String>, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for piece in pieces.into_iter().flat_map(|p| split_oversized(p, max)) {
        if current.is_empty() {
            current = piece;
        } else if char_len(&current) + 1 + char_len(&piece) <= max {
            current.push(' ');
            current.push_str(&piece);
        } else {
            chunks.push(std::mem::replace(&mut current, piece));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

/// Break a single clause that is itself over `max`: by words, then by characters.
fn split_oversized(piece: String, max: usize) -> Vec<String> {
    if char_len(&piece) <= max {
        return vec![piece];
    }
    let mut out = Vec::new();
    let mut current = String::new();
    for word in piece.split_whitespace() {
        let words: Vec<String> = if char_len(word) > max {
            let chars: Vec<char> = word.chars().collect();
            chars.chunks(max).map(|c| c.iter().collect()).collect()
        } else {
            vec![word.to_owned()]
        };
        for word in words {
            if current.is_empty() {
                current = word;
            } else if char_len(&current) + 1 + char_len(&word) <= max {
                current.push(' ');
                current.push_str(&word);
            } else {
                out.push(std::mem::replace(&mut current, word));
            }
        }
    }
    if !current.is_empty() {
        out.push(current);
    }
    out
}

fn push_trimmed(out: &mut Vec<String>, text: &str) {
    let trimmed = text.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_owned());
    }
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}
