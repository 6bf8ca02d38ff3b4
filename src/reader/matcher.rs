//! Whitespace-insensitive prefix matching between rendered text and sentences.

/// Byte index of the first non-whitespace char at or after `from`.
fn skip_whitespace(s: &str, from: usize) -> usize {
    s[from..]
        .char_indices()
        .find(|(_, c)| !c.is_whitespace())
        .map_or(s.len(), |(i, _)| from + i)
}

/// Match the longest mutually consistent prefix of `text` and `sentence`.
///
/// Whitespace runs on either side are skipped without comparing their
/// lengths; every other char must be equal. Returns the matched byte length
/// on each side. `(0, 0)` means the first non-whitespace chars differ.
pub fn match_prefix(text: &str, sentence: &str) -> (usize, usize) {
    let (mut ti, mut si) = (0, 0);

    while ti < text.len() && si < sentence.len() {
        let (Some(tc), Some(sc)) = (text[ti..].chars().next(), sentence[si..].chars().next()) else {
            break;
        };
        let (text_ws, sentence_ws) = (tc.is_whitespace(), sc.is_whitespace());
        if text_ws || sentence_ws {
            if text_ws {
                ti = skip_whitespace(text, ti);
            }
            if sentence_ws {
                si = skip_whitespace(sentence, si);
            }
            continue;
        }
        if tc != sc {
            break;
        }
        ti += tc.len_utf8();
        si += sc.len_utf8();
    }

    (ti, si)
}

/// Collapse whitespace runs to one space and trim.
pub fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
