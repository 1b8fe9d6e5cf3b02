//! Tolerant JSON Decoding
//!
//! Model replies are supposed to be a strict JSON envelope but often
//! arrive wrapped in markdown fences, truncated mid-array, or with a
//! trailing comma. All salvage lives here, in one place; extractors parse
//! the cleaned value into their typed records and fall back to an empty
//! set when nothing can be recovered.

use serde::de::DeserializeOwned;
use serde_json::Value;

/// Strip surrounding markdown fences (``` / ```json) if present
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop an optional language tag on the fence line
    let rest = match rest.split_once('\n') {
        Some((_lang, body)) => body,
        None => rest,
    };
    rest.trim_end().strip_suffix("```").unwrap_or(rest).trim()
}

/// Find the first top-level JSON value (`[...]` or `{...}`) in the text
fn extract_json_slice(text: &str) -> Option<&str> {
    let start = text.find(['[', '{'])?;
    let bytes = text.as_bytes();
    let open = bytes[start];
    let close = if open == b'[' { b']' } else { b'}' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            _ if b == open => depth += 1,
            _ if b == close => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(&text[start..=i]);
                }
            }
            _ => {}
        }
    }
    // Unbalanced: hand back the tail for salvage
    Some(&text[start..])
}

/// Close a truncated array at the last complete element
fn salvage_array(slice: &str) -> Option<Value> {
    let inner = slice.strip_prefix('[')?;
    // Walk elements by balanced-brace scanning, keeping whatever parses
    let mut elements: Vec<Value> = Vec::new();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    let mut element_start = 0usize;
    for (i, c) in inner.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' | '[' => depth += 1,
            '}' | ']' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                if let Ok(v) = serde_json::from_str(inner[element_start..i].trim()) {
                    elements.push(v);
                }
                element_start = i + 1;
            }
            _ => {}
        }
    }
    // The trailing chunk may be a complete element cut off before its comma
    let tail = inner[element_start..]
        .trim()
        .trim_end_matches(']')
        .trim()
        .trim_end_matches(',');
    if !tail.is_empty() {
        if let Ok(v) = serde_json::from_str(tail) {
            elements.push(v);
        }
    }
    if elements.is_empty() {
        None
    } else {
        Some(Value::Array(elements))
    }
}

/// Remove trailing commas before `]` or `}` (a common model tic)
fn drop_trailing_commas(slice: &str) -> String {
    let mut out = String::with_capacity(slice.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = slice.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            out.push(c);
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if matches!(next, Some(']') | Some('}')) {
                    continue;
                }
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    out
}

/// Decode a model reply into a JSON value, salvaging what can be salvaged
pub fn decode_value(reply: &str) -> Option<Value> {
    let body = strip_fences(reply);
    let slice = extract_json_slice(body)?;

    if let Ok(v) = serde_json::from_str(slice) {
        return Some(v);
    }
    let cleaned = drop_trailing_commas(slice);
    if let Ok(v) = serde_json::from_str(&cleaned) {
        return Some(v);
    }
    if cleaned.starts_with('[') {
        return salvage_array(&cleaned);
    }
    None
}

/// Decode a reply into a typed list. Items that fail to deserialize are
/// skipped; a reply with no recoverable items yields an empty vec.
pub fn decode_list<T: DeserializeOwned>(reply: &str) -> Vec<T> {
    let Some(value) = decode_value(reply) else {
        return Vec::new();
    };
    let items = match value {
        Value::Array(items) => items,
        // Tolerate a single object where an array was requested
        obj @ Value::Object(_) => vec![obj],
        _ => return Vec::new(),
    };
    items
        .into_iter()
        .filter_map(|item| serde_json::from_value(item).ok())
        .collect()
}

/// Decode a reply into a single typed object
pub fn decode_object<T: DeserializeOwned>(reply: &str) -> Option<T> {
    let value = decode_value(reply)?;
    serde_json::from_value(value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Item {
        name: String,
        score: f64,
    }

    #[test]
    fn plain_json_decodes() {
        let items: Vec<Item> = decode_list(r#"[{"name":"a","score":0.5}]"#);
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "a");
    }

    #[test]
    fn fenced_json_decodes() {
        let reply = "```json\n[{\"name\":\"a\",\"score\":0.5}]\n```";
        let items: Vec<Item> = decode_list(reply);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn prose_around_json_is_ignored() {
        let reply = "Here is what I found:\n[{\"name\":\"a\",\"score\":0.5}]\nHope that helps!";
        let items: Vec<Item> = decode_list(reply);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn truncated_array_closes_at_last_complete_item() {
        let reply = r#"[{"name":"a","score":0.5},{"name":"b","score":0.7},{"name":"c","sc"#;
        let items: Vec<Item> = decode_list(reply);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].name, "b");
    }

    #[test]
    fn trailing_comma_is_tolerated() {
        let reply = r#"[{"name":"a","score":0.5},]"#;
        let items: Vec<Item> = decode_list(reply);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn single_object_counts_as_one_item() {
        let items: Vec<Item> = decode_list(r#"{"name":"a","score":0.5}"#);
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn garbage_yields_empty_set() {
        let items: Vec<Item> = decode_list("I could not find anything.");
        assert!(items.is_empty());
        assert!(decode_value("no json here at all").is_none());
    }

    #[test]
    fn mismatched_items_are_skipped() {
        let reply = r#"[{"name":"a","score":0.5},{"wrong":"shape"}]"#;
        let items: Vec<Item> = decode_list(reply);
        assert_eq!(items.len(), 1);
    }
}
