//! Extraction of a JSON object embedded in free text.
//!
//! Some compute operations publish their structured result inside a prose
//! field ("Oracle query result: {...}"). Until the producer emits a
//! structured field, this module isolates the scanning so the rest of the
//! pipeline never touches raw brace counting.

use serde_json::Value;

/// Marker preceding an embedded result object in `aiResponse` text.
pub const EMBEDDED_RESULT_MARKER: &str = "Oracle query result:";

/// Finds the first complete JSON object in `text` and parses it.
///
/// Brace matching is string-literal and escape aware, so braces inside
/// quoted values do not unbalance the scan. Returns `None` for truncated
/// or syntactically invalid objects.
pub fn extract_embedded_object(text: &str) -> Option<Value> {
    let start = text.find('{')?;
    let candidate = &text[start..];

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in candidate.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    let end = offset + ch.len_utf8();
                    return serde_json::from_str(&candidate[..end]).ok();
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_object_after_marker_text() {
        let text = "Oracle query result: {\"result\":45000} (consensus reached)";
        assert_eq!(
            extract_embedded_object(text),
            Some(json!({ "result": 45000 }))
        );
    }

    #[test]
    fn handles_nested_objects() {
        let text = "prefix {\"a\":{\"b\":{\"c\":1}},\"d\":2} suffix";
        let parsed = extract_embedded_object(text).unwrap();
        assert_eq!(parsed.pointer("/a/b/c"), Some(&json!(1)));
        assert_eq!(parsed.pointer("/d"), Some(&json!(2)));
    }

    #[test]
    fn braces_inside_strings_do_not_unbalance() {
        let text = r#"note {"msg":"has } and { inside","ok":true} tail"#;
        let parsed = extract_embedded_object(text).unwrap();
        assert_eq!(parsed["ok"], json!(true));
    }

    #[test]
    fn escaped_quotes_inside_strings_are_respected() {
        let text = r#"{"msg":"quote \" then } brace","n":1}"#;
        let parsed = extract_embedded_object(text).unwrap();
        assert_eq!(parsed["n"], json!(1));
    }

    #[test]
    fn truncated_object_yields_none() {
        assert_eq!(extract_embedded_object("result: {\"a\": 1, \"b\":"), None);
    }

    #[test]
    fn no_object_yields_none() {
        assert_eq!(extract_embedded_object("plain prose, no json"), None);
    }

    #[test]
    fn invalid_json_inside_balanced_braces_yields_none() {
        assert_eq!(extract_embedded_object("{not json at all}"), None);
    }

    #[test]
    fn unbalanced_closing_brace_before_opening_is_ignored() {
        let text = "} stray then {\"a\":1}";
        assert_eq!(extract_embedded_object(text), Some(json!({ "a": 1 })));
    }
}
