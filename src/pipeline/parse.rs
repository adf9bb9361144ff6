//! Defensive extraction of structured payloads from model text.
//!
//! Model replies are untrusted prose that may or may not contain the
//! JSON we asked for. Callers locate the first top-level array literal,
//! then decode it into typed records; any failure along the way is a
//! soft failure handled at the call site.

/// Locate the first top-level JSON array literal in `text`.
///
/// Scans from the first `[` and walks the bracket depth, honoring string
/// literals and escapes, until the matching `]`. Returns `None` when no
/// balanced array exists.
pub fn first_json_array(text: &str) -> Option<&str> {
    let start = text.find('[')?;
    let bytes = text.as_bytes();
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
            b'[' => depth += 1,
            b']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=i]);
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

    #[test]
    fn finds_bare_array() {
        assert_eq!(first_json_array(r#"[1, 2, 3]"#), Some("[1, 2, 3]"));
    }

    #[test]
    fn finds_array_inside_prose() {
        let text = "Here are the decisions:\n[{\"id\": \"a\"}]\nLet me know!";
        assert_eq!(first_json_array(text), Some(r#"[{"id": "a"}]"#));
    }

    #[test]
    fn finds_array_inside_markdown_fence() {
        let text = "```json\n[{\"id\": \"a\"}]\n```";
        assert_eq!(first_json_array(text), Some(r#"[{"id": "a"}]"#));
    }

    #[test]
    fn handles_nested_arrays() {
        let text = "x [[1, 2], [3]] y";
        assert_eq!(first_json_array(text), Some("[[1, 2], [3]]"));
    }

    #[test]
    fn brackets_inside_strings_do_not_close() {
        let text = r#"[{"note": "see [1] and \"quoted\""}]"#;
        assert_eq!(first_json_array(text), Some(text));
    }

    #[test]
    fn plain_prose_yields_none() {
        assert!(first_json_array("I could not classify these messages.").is_none());
    }

    #[test]
    fn unbalanced_array_yields_none() {
        assert!(first_json_array(r#"[{"id": "a"}"#).is_none());
    }

    #[test]
    fn empty_array_is_valid() {
        assert_eq!(first_json_array("nothing to do: []"), Some("[]"));
    }
}
