//! Concept label normalization.
//!
//! Two labels name the same concept when their normalized forms are equal.

/// Normalize a label for dedupe: trim, casefold, strip punctuation, collapse
/// whitespace, truncate to `max_chars` characters.
pub fn normalize(label: &str, max_chars: usize) -> String {
    let lowered = label.to_lowercase();
    let mut out = String::with_capacity(lowered.len());
    let mut pending_space = false;
    let mut count = 0;

    for ch in lowered.chars() {
        if ch.is_whitespace() {
            pending_space = !out.is_empty();
            continue;
        }
        if is_punctuation(ch) {
            continue;
        }
        if count >= max_chars {
            break;
        }
        if pending_space {
            if count + 1 >= max_chars {
                break;
            }
            out.push(' ');
            count += 1;
            pending_space = false;
        }
        out.push(ch);
        count += 1;
    }

    out
}

/// Display form of a label: whitespace collapsed, edge punctuation trimmed,
/// truncated to `max_chars` characters. Case is preserved.
pub fn display(label: &str, max_chars: usize) -> String {
    let collapsed = label.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| c.is_whitespace() || is_punctuation(c))
        .chars()
        .take(max_chars)
        .collect::<String>()
        .trim_end()
        .to_string()
}

/// ASCII punctuation plus the CJK and full-width punctuation blocks.
pub fn is_punctuation(ch: char) -> bool {
    ch.is_ascii_punctuation()
        || matches!(ch,
            '\u{2010}'..='\u{2027}'
            | '\u{2030}'..='\u{205E}'
            | '\u{3001}'..='\u{303F}'
            | '\u{FF01}'..='\u{FF0F}'
            | '\u{FF1A}'..='\u{FF20}'
            | '\u{FF3B}'..='\u{FF40}'
            | '\u{FF5B}'..='\u{FF65}'
            | '\u{00B7}'
            | '\u{00A1}'
            | '\u{00BF}'
        )
}
