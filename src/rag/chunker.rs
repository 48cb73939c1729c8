//! Content chunking for retrieval indexing.
//!
//! Splits page text into overlapping segments using a cascading separator
//! strategy: paragraph boundaries first, then lines, then words, then
//! arbitrary character positions. Deterministic for identical input and
//! configuration.

use std::collections::VecDeque;

/// Separator cascade, coarsest first. The empty separator always matches
/// and splits at character level.
const SEPARATORS: &[&str] = &["\n\n", "\n", " ", ""];

/// Splits text into chunks of at most `chunk_size` characters with
/// `chunk_overlap` characters carried between consecutive chunks.
#[derive(Debug, Clone, Copy)]
pub struct TextSplitter {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl TextSplitter {
    /// Create a splitter. Callers must ensure `chunk_overlap < chunk_size`;
    /// settings validation enforces this at startup.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        Self {
            chunk_size,
            chunk_overlap,
        }
    }

    /// Split text into chunk strings.
    pub fn split(&self, text: &str) -> Vec<String> {
        let text = text.trim();
        if text.is_empty() {
            return Vec::new();
        }
        self.split_recursive(text, SEPARATORS)
    }

    /// Split text into chunks paired with their character start offset
    /// within `text`. Offsets are found by a forward scan, so they are
    /// monotonically non-decreasing.
    pub fn split_with_offsets(&self, text: &str) -> Vec<(String, usize)> {
        let chunks = self.split(text);
        let mut out = Vec::with_capacity(chunks.len());
        let mut search_from = 0usize;
        for chunk in chunks {
            let byte_pos = text[search_from..]
                .find(&chunk)
                .map(|p| p + search_from)
                .or_else(|| text.find(&chunk))
                .unwrap_or(search_from);
            let char_pos = text[..byte_pos].chars().count();
            // Advance past the chunk's first character; stepping a single
            // byte would land inside a multibyte character.
            let step = text[byte_pos..].chars().next().map_or(1, char::len_utf8);
            search_from = (byte_pos + step).min(text.len());
            out.push((chunk, char_pos));
        }
        out
    }

    fn split_recursive(&self, text: &str, separators: &[&str]) -> Vec<String> {
        let (separator, remaining) = pick_separator(text, separators);

        if separator.is_empty() {
            return self.char_windows(text);
        }

        let mut chunks = Vec::new();
        let mut pending: Vec<&str> = Vec::new();
        for fragment in text.split(separator) {
            if char_len(fragment) <= self.chunk_size {
                pending.push(fragment);
            } else {
                // Oversized fragment: flush what we have, then re-split it
                // with the finer separators.
                if !pending.is_empty() {
                    chunks.extend(self.merge(&pending, separator));
                    pending.clear();
                }
                chunks.extend(self.split_recursive(fragment, remaining));
            }
        }
        if !pending.is_empty() {
            chunks.extend(self.merge(&pending, separator));
        }
        chunks
    }

    /// Greedily pack fragments into chunks no larger than `chunk_size`,
    /// keeping the trailing fragments whose combined length is at most
    /// `chunk_overlap` as the start of the next chunk.
    fn merge(&self, fragments: &[&str], separator: &str) -> Vec<String> {
        let sep_len = char_len(separator);
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for &fragment in fragments {
            let len = char_len(fragment);
            let joined = total + len + if current.is_empty() { 0 } else { sep_len };
            if joined > self.chunk_size && !current.is_empty() {
                if let Some(doc) = join_fragments(&current, separator) {
                    docs.push(doc);
                }
                // Drop fragments from the front until we are within the
                // overlap budget and the incoming fragment fits.
                while total > self.chunk_overlap
                    || (total + len + if current.is_empty() { 0 } else { sep_len }
                        > self.chunk_size
                        && total > 0)
                {
                    let had_separator = current.len() > 1;
                    let popped = char_len(current.pop_front().unwrap_or_default());
                    total -= popped + if had_separator { sep_len } else { 0 };
                    if current.is_empty() {
                        total = 0;
                        break;
                    }
                }
            }
            current.push_back(fragment);
            total += len + if current.len() > 1 { sep_len } else { 0 };
        }

        if let Some(doc) = join_fragments(&current, separator) {
            docs.push(doc);
        }
        docs
    }

    /// Character-level fallback for text with no usable separator: fixed
    /// windows of `chunk_size` characters stepping by size minus overlap.
    fn char_windows(&self, text: &str) -> Vec<String> {
        let chars: Vec<char> = text.chars().collect();
        if chars.len() <= self.chunk_size {
            return vec![text.to_string()];
        }

        let step = self.chunk_size.saturating_sub(self.chunk_overlap).max(1);
        let mut out = Vec::new();
        let mut start = 0usize;
        while start < chars.len() {
            let end = (start + self.chunk_size).min(chars.len());
            out.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += step;
        }
        out
    }
}

/// First separator that occurs in the text, plus the finer separators
/// after it. The trailing empty separator always matches.
fn pick_separator<'a>(text: &str, separators: &'a [&'a str]) -> (&'a str, &'a [&'a str]) {
    for (i, &sep) in separators.iter().enumerate() {
        if sep.is_empty() || text.contains(sep) {
            return (sep, &separators[i + 1..]);
        }
    }
    ("", &[])
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// Join fragments with the separator and trim; None if nothing remains.
fn join_fragments(fragments: &VecDeque<&str>, separator: &str) -> Option<String> {
    let joined = fragments
        .iter()
        .copied()
        .collect::<Vec<_>>()
        .join(separator);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
