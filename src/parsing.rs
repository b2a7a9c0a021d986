//! Defensive extraction of JSON from model replies.
//!
//! Even with a response schema the model occasionally wraps its answer in a
//! markdown fence, prefixes it with prose, or leaves a trailing comma. These
//! helpers recover the JSON value in those cases and fail cleanly otherwise.

use serde_json::Value;

/// Strip `<think>...</think>` and `<thinking>...</thinking>` blocks and trim.
///
/// An unclosed block swallows the rest of the text.
pub fn strip_think_tags(text: &str) -> String {
    let mut result = text.to_string();
    for (open, close) in [("<think>", "</think>"), ("<thinking>", "</thinking>")] {
        while let Some(start) = result.find(open) {
            match result[start..].find(close) {
                Some(offset) => {
                    let end = start + offset + close.len();
                    result.replace_range(start..end, "");
                }
                None => {
                    result.truncate(start);
                    break;
                }
            }
        }
    }
    result.trim().to_string()
}

/// Content of the first markdown code fence, preferring a `json` fence.
pub fn extract_code_block(text: &str) -> Option<&str> {
    let mut fallback = None;
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find("```") {
        let after_ticks = search_from + offset + 3;
        let Some(line_len) = text[after_ticks..].find('\n') else {
            break;
        };
        let line_end = after_ticks + line_len;
        let lang = text[after_ticks..line_end].trim();
        let body_start = line_end + 1;
        let Some(body_len) = text[body_start..].find("```") else {
            break;
        };
        let close = body_start + body_len;
        let body = text[body_start..close].trim();

        if lang.eq_ignore_ascii_case("json") {
            return Some(body);
        }
        fallback.get_or_insert(body);
        search_from = close + 3;
    }
    fallback
}

/// Find the first balanced `open ... close` span, ignoring brackets inside
/// string literals.
pub fn find_bracketed(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            c if c == open => depth += 1,
            c if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + idx + ch.len_utf8()]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remove commas that directly precede a closing `}` or `]`.
pub fn strip_trailing_commas(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_string = false;
    let mut escaped = false;
    let chars: Vec<char> = text.chars().collect();

    for (i, &ch) in chars.iter().enumerate() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            out.push(ch);
            continue;
        }
        if ch == '"' {
            in_string = true;
        }
        if ch == ',' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, Some('}') | Some(']')) {
                continue;
            }
        }
        out.push(ch);
    }
    out
}

/// How a JSON value was recovered from a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Extraction {
    /// The whole reply was valid JSON.
    Direct,
    /// Taken from a markdown code fence.
    CodeBlock,
    /// Cut out of surrounding prose by bracket matching.
    Embedded,
    /// Needed trailing-comma repair.
    Repaired,
}

/// Extract a JSON value from a model reply.
///
/// Strategies, in order: direct parse, code fence, bracketed object,
/// bracketed array, then each candidate again after trailing-comma repair.
/// Returns the value and the strategy that produced it, or a short reason.
pub fn extract_json(reply: &str) -> Result<(Value, Extraction), String> {
    let cleaned = strip_think_tags(reply);
    if cleaned.is_empty() {
        return Err("empty reply".to_string());
    }

    let mut candidates: Vec<(&str, Extraction)> = vec![(cleaned.as_str(), Extraction::Direct)];
    if let Some(block) = extract_code_block(&cleaned) {
        candidates.push((block, Extraction::CodeBlock));
    }
    if let Some(obj) = find_bracketed(&cleaned, '{', '}') {
        candidates.push((obj, Extraction::Embedded));
    }
    if let Some(arr) = find_bracketed(&cleaned, '[', ']') {
        candidates.push((arr, Extraction::Embedded));
    }

    for (candidate, how) in &candidates {
        if let Ok(value) = serde_json::from_str::<Value>(candidate) {
            return Ok((value, *how));
        }
    }
    for (candidate, _) in &candidates {
        if let Ok(value) = serde_json::from_str::<Value>(&strip_trailing_commas(candidate)) {
            return Ok((value, Extraction::Repaired));
        }
    }

    Err(format!(
        "no valid JSON found in reply: {}",
        truncate(&cleaned, 200)
    ))
}

/// Truncate to at most `max` bytes on a char boundary, appending "..." if cut.
pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &s[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_think_tags() {
        assert_eq!(strip_think_tags("<think>hmm</think> {\"a\":1}"), "{\"a\":1}");
        assert_eq!(strip_think_tags("<thinking>x</thinking>done"), "done");
        assert_eq!(strip_think_tags("keep<think>unclosed"), "keep");
    }

    #[test]
    fn test_extract_code_block_prefers_json() {
        let text = "```text\nnope\n```\nthen\n```json\n{\"a\": 1}\n```";
        assert_eq!(extract_code_block(text), Some("{\"a\": 1}"));
    }

    #[test]
    fn test_extract_code_block_bare() {
        assert_eq!(extract_code_block("```\n[1]\n```"), Some("[1]"));
        assert_eq!(extract_code_block("no fences"), None);
    }

    #[test]
    fn test_find_bracketed_ignores_braces_in_strings() {
        let text = r#"Result: {"dish_name": "Toast {v2}", "dish_steps": []} enjoy"#;
        assert_eq!(
            find_bracketed(text, '{', '}'),
            Some(r#"{"dish_name": "Toast {v2}", "dish_steps": []}"#)
        );
    }

    #[test]
    fn test_strip_trailing_commas() {
        assert_eq!(
            strip_trailing_commas(r#"{"items": ["a", "b",], }"#),
            r#"{"items": ["a", "b"] }"#
        );
        assert_eq!(strip_trailing_commas(r#"{"s": ",}"}"#), r#"{"s": ",}"}"#);
    }

    #[test]
    fn test_extract_json_direct() {
        let (value, how) = extract_json(r#"{"items": ["butter"]}"#).unwrap();
        assert_eq!(value, json!({"items": ["butter"]}));
        assert_eq!(how, Extraction::Direct);
    }

    #[test]
    fn test_extract_json_fenced() {
        let (value, how) = extract_json("Here you go:\n```json\n{\"items\": []}\n```").unwrap();
        assert_eq!(value, json!({"items": []}));
        assert_eq!(how, Extraction::CodeBlock);
    }

    #[test]
    fn test_extract_json_embedded() {
        let (value, how) = extract_json("Sure! {\"dish_name\": \"Toast\"} hope it helps").unwrap();
        assert_eq!(value["dish_name"], "Toast");
        assert_eq!(how, Extraction::Embedded);
    }

    #[test]
    fn test_extract_json_repaired() {
        let (value, how) = extract_json(r#"{"items": ["milk",],}"#).unwrap();
        assert_eq!(value, json!({"items": ["milk"]}));
        assert_eq!(how, Extraction::Repaired);
    }

    #[test]
    fn test_extract_json_failure() {
        assert!(extract_json("I could not find a recipe.").is_err());
        assert!(extract_json("   ").is_err());
    }

    #[test]
    fn test_truncate_char_boundary() {
        assert_eq!(truncate("héllo", 2), "h...");
        assert_eq!(truncate("short", 10), "short");
    }
}
