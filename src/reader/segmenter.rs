//! Punctuation-based sentence splitting with source offsets.

use serde::Serialize;

/// A sentence and where it sits in the string it was cut from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Sentence {
    pub index: usize,
    /// Byte offset into the segmented string.
    pub start: usize,
    pub end: usize,
    pub text: String,
}

fn is_terminator(c: char) -> bool {
    matches!(c, '.' | '!' | '?' | ';' | ':')
}

/// Split text into fragments after `. ! ? ; :` followed by whitespace.
///
/// The whitespace run after a terminator is dropped, as are fragments that are
/// empty or whitespace only.
fn split_fragments(text: &str) -> Vec<&str> {
    let mut fragments = Vec::new();
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        if !is_terminator(c) {
            continue;
        }
        let end = i + c.len_utf8();
        let mut next = end;
        while let Some(&(j, w)) = chars.peek() {
            if !w.is_whitespace() {
                break;
            }
            next = j + w.len_utf8();
            chars.next();
        }
        if next == end {
            continue;
        }
        fragments.push(&text[start..end]);
        start = next;
    }
    fragments.push(&text[start..]);

    fragments.retain(|f| !f.trim().is_empty());
    fragments
}

/// Segment `text` into sentences.
///
/// Each fragment is located by searching forward from the end of the previous
/// one, so repeated sentences land on successive positions. A fragment that
/// cannot be found is skipped.
pub fn segment(text: &str) -> Vec<Sentence> {
    let mut sentences = Vec::new();
    let mut cursor = 0;

    for fragment in split_fragments(text) {
        let Some(offset) = text[cursor..].find(fragment) else {
            continue;
        };
        let start = cursor + offset;
        let end = start + fragment.len();
        sentences.push(Sentence {
            index: sentences.len(),
            start,
            end,
            text: fragment.to_string(),
        });
        cursor = end;
    }

    sentences
}
