//! Sentence-boundary text chunker.
//!
//! Splits normalized course text into sentences using an abbreviation-aware
//! boundary rule, then groups consecutive sentences into chunks bounded by a
//! character budget, carrying a configurable character overlap between
//! consecutive chunks.
//!
//! Sentences are never split mid-way; a single sentence longer than the
//! budget is emitted as its own chunk. All lengths are measured in
//! characters.

/// Collapse internal whitespace runs to single spaces and trim the ends.
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Split text into sentences.
///
/// Breaks before an ASCII capital letter preceded by `.`, `!`, or `?` plus
/// whitespace, unless the preceding token looks like an abbreviation
/// ("e.g.", "U.S.", "Dr."). The rule is a heuristic; uncommon abbreviations
/// may still split. Empty fragments are dropped.
pub fn split_sentences(text: &str) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut sentences = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < chars.len() {
        if !chars[i].is_whitespace() {
            i += 1;
            continue;
        }

        // Candidate boundary: a whitespace run
        let ws_start = i;
        let mut after = i;
        while after < chars.len() && chars[after].is_whitespace() {
            after += 1;
        }

        if is_sentence_boundary(&chars, ws_start, after) {
            push_fragment(&mut sentences, &chars[start..ws_start]);
            start = after;
        }
        i = after;
    }

    if start < chars.len() {
        push_fragment(&mut sentences, &chars[start..]);
    }

    sentences
}

fn is_sentence_boundary(chars: &[char], ws_start: usize, after: usize) -> bool {
    if after >= chars.len() || !chars[after].is_ascii_uppercase() {
        return false;
    }
    if ws_start == 0 || !matches!(chars[ws_start - 1], '.' | '!' | '?') {
        return false;
    }
    !looks_like_abbreviation(&chars[..ws_start])
}

// Two shapes suppress a split: word-period-word-period ("e.g.", "U.S.") and
// capital-lowercase-period ("Dr.", "Mr.").
fn looks_like_abbreviation(prefix: &[char]) -> bool {
    let n = prefix.len();
    if n >= 4 && is_word_char(prefix[n - 4]) && prefix[n - 3] == '.' && is_word_char(prefix[n - 2])
    {
        return true;
    }
    n >= 3
        && prefix[n - 3].is_ascii_uppercase()
        && prefix[n - 2].is_ascii_lowercase()
        && prefix[n - 1] == '.'
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn push_fragment(sentences: &mut Vec<String>, chars: &[char]) {
    let fragment: String = chars.iter().collect();
    let trimmed = fragment.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
}

/// Split text into overlapping chunks of whole sentences.
///
/// Each chunk is a space-joined run of consecutive sentences within
/// `chunk_size` characters. With a non-zero `chunk_overlap`, the next chunk
/// restarts on the trailing sentences of the previous one whose combined
/// length fits the overlap budget; the start index always advances by at
/// least one sentence.
pub fn chunk_text(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    let sentences = split_sentences(&normalized);
    let lengths: Vec<usize> = sentences.iter().map(|s| s.chars().count()).collect();

    let mut chunks = Vec::new();
    let mut i = 0;

    while i < sentences.len() {
        // Greedily take sentences while the joined length stays in budget.
        // The first sentence is always taken, even when oversized.
        let mut end = i;
        let mut current_size = 0;
        while end < sentences.len() {
            let addition = lengths[end] + usize::from(end > i);
            if current_size + addition > chunk_size && end > i {
                break;
            }
            current_size += addition;
            end += 1;
        }

        if end == i {
            i += 1;
            continue;
        }

        chunks.push(sentences[i..end].join(" "));
        i = next_start(&lengths[i..end], i, chunk_overlap);
    }

    chunks
}

// Walk backward from the chunk's end, keeping trailing sentences while they
// fit the overlap budget. The returned start always advances past the
// previous one.
fn next_start(taken_lengths: &[usize], start: usize, chunk_overlap: usize) -> usize {
    let taken = taken_lengths.len();
    if chunk_overlap == 0 {
        return start + taken;
    }

    let mut overlap_size = 0;
    let mut kept = 0;
    for k in (0..taken).rev() {
        let sentence_len = taken_lengths[k] + usize::from(k < taken - 1);
        if overlap_size + sentence_len <= chunk_overlap {
            overlap_size += sentence_len;
            kept += 1;
        } else {
            break;
        }
    }

    (start + taken - kept).max(start + 1)
}
