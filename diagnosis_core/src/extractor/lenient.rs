//! Recovery of a JSON object from free-form model output.

use serde_json::{Map, Value};

/// Strip a surrounding Markdown code fence, if any.
pub fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    if trimmed.len() >= 6 && trimmed.starts_with("```") && trimmed.ends_with("```") {
        let inner = &trimmed[3..trimmed.len() - 3];
        // drop the info string ("json") on the opening fence line
        return match inner.find('\n') {
            Some(newline) => inner[newline + 1..].trim(),
            None => inner.trim(),
        };
    }
    trimmed
}

/// The first balanced `{...}` in `text`, honoring string literals and escapes.
pub fn first_json_object(text: &str) -> Option<&str> {
    let body = strip_code_fence(text);
    let start = body.find('{')?;

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape = false;
    for (offset, ch) in body[start..].char_indices() {
        if in_string {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    let end = start + offset + ch.len_utf8();
                    return Some(body[start..end].trim());
                }
            }
            _ => {}
        }
    }
    None
}

/// Parse the first object found in `text`.
///
/// Strict JSON is tried first, then the same text with typographic quotes
/// replaced, then single quotes promoted to double quotes.
pub fn parse_object(text: &str) -> Option<Map<String, Value>> {
    if let Some(object) = first_json_object(text).and_then(parse_strict) {
        return Some(object);
    }

    let straightened = straighten_quotes(text);
    if let Some(object) = first_json_object(&straightened).and_then(parse_strict) {
        return Some(object);
    }

    if !straightened.contains('"') {
        let promoted = straightened.replace('\'', "\"");
        return first_json_object(&promoted).and_then(parse_strict);
    }
    None
}

fn parse_strict(candidate: &str) -> Option<Map<String, Value>> {
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Some(map),
        _ => None,
    }
}

fn straighten_quotes(text: &str) -> String {
    text.chars()
        .map(|ch| match ch {
            '\u{201C}' | '\u{201D}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```json\n{\"a\": 1}\n```"), "{\"a\": 1}");
        assert_eq!(strip_code_fence("  {\"a\": 1}  "), "{\"a\": 1}");
    }

    #[test]
    fn test_first_object_skips_prose_and_braces_in_strings() {
        let raw = "好的，结果如下：{\"verdict\": \"漏写 } 号\", \"n\": {\"x\": 1}} 以上。";
        assert_eq!(
            first_json_object(raw),
            Some("{\"verdict\": \"漏写 } 号\", \"n\": {\"x\": 1}}")
        );
    }

    #[test]
    fn test_unbalanced_is_none() {
        assert!(first_json_object("{\"a\": {\"b\": 1}").is_none());
        assert!(first_json_object("no structure at all").is_none());
    }

    #[test]
    fn test_parse_with_smart_quotes() {
        let raw = "{“verdict”: “符号错误”, “confidence”: 0.8}";
        let object = parse_object(raw).unwrap();
        assert_eq!(object["verdict"], "符号错误");
    }

    #[test]
    fn test_parse_single_quoted() {
        let object = parse_object("{'verdict': 'sign error'}").unwrap();
        assert_eq!(object["verdict"], "sign error");
    }

    #[test]
    fn test_array_is_not_an_object() {
        assert!(parse_object("[1, 2, 3]").is_none());
    }
}
