//! Recovery of detection JSON from imperfect model output.
//!
//! Vision models wrap JSON in fences, leave trailing commas, put bare quotes
//! inside values or stop mid-object when they hit the token limit.
//! [`parse_with_fallback`] tries progressively looser strategies and always
//! returns a [`DetectionResult`].

use crate::output::{DetectionResult, ElementContent, ElementKind, PageAnalysis, VisualElement};
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

static JSON_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```json\s*(.*?)\s*```").unwrap());
static ANY_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)```\s*(.*?)\s*```").unwrap());
static STRUCTURED_DATA: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?is)structured_data["']?\s*:\s*["']([^"']*)["']"#).unwrap()
});
static DESCRIPTION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)description["']?\s*:\s*["']([^"']*)["']"#).unwrap());
static MENTIONS_TABLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)table").unwrap());
static MENTIONS_FIGURE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)figure|chart|graph").unwrap());

const RAW_TEXT_LIMIT: usize = 1000;

/// Return `s` or a repaired copy of it that parses as JSON.
///
/// Repairs: control characters dropped (raw newlines and tabs inside strings
/// are escaped instead), trailing commas removed, bare quotes inside string
/// values escaped, unterminated strings closed and missing `}`/`]` appended
/// in nesting order. `None` if the result still does not parse.
pub fn repair_json(s: &str) -> Option<String> {
    if serde_json::from_str::<serde_json::Value>(s).is_ok() {
        return Some(s.to_string());
    }

    let repaired = repair_pass(s);
    match serde_json::from_str::<serde_json::Value>(&repaired) {
        Ok(_) => Some(repaired),
        Err(e) => {
            debug!("JSON repair failed: {}", e);
            None
        }
    }
}

fn repair_pass(s: &str) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len() + 8);
    let mut closers: Vec<char> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escaped {
                out.push(c);
                escaped = false;
                continue;
            }
            match c {
                '\\' => {
                    out.push(c);
                    escaped = true;
                }
                '"' => {
                    if closes_string(&chars[i + 1..]) {
                        in_string = false;
                        out.push('"');
                    } else {
                        out.push_str("\\\"");
                    }
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                c if is_stray_control(c) => {}
                c => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            '{' => {
                closers.push('}');
                out.push(c);
            }
            '[' => {
                closers.push(']');
                out.push(c);
            }
            '}' | ']' => {
                drop_trailing_comma(&mut out);
                closers.pop();
                out.push(c);
            }
            c if is_stray_control(c) => {}
            c => out.push(c),
        }
    }

    if in_string {
        if escaped {
            out.pop();
        }
        out.push('"');
    }
    while let Some(closer) = closers.pop() {
        drop_trailing_comma(&mut out);
        out.push(closer);
    }
    out
}

/// A quote ends the string when the next significant character is
/// structural, or the input ends.
fn closes_string(rest: &[char]) -> bool {
    rest.iter()
        .find(|c| !c.is_whitespace())
        .map(|c| matches!(c, ',' | '}' | ']' | ':'))
        .unwrap_or(true)
}

fn is_stray_control(c: char) -> bool {
    matches!(c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}' | '\u{7F}')
}

fn drop_trailing_comma(out: &mut String) {
    let trimmed = out.trim_end().len();
    if out[..trimmed].ends_with(',') {
        out.truncate(trimmed - 1);
    }
}

/// Longest fenced block: ```` ```json ```` blocks first, then plain fences.
pub fn extract_json_from_markdown(s: &str) -> Option<String> {
    for re in [&*JSON_FENCE, &*ANY_FENCE] {
        let longest = re
            .captures_iter(s)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .max_by_key(|m| m.len());
        if let Some(block) = longest {
            return Some(block.trim().to_string());
        }
    }
    None
}

/// Parse a detection response, never failing.
///
/// Order: fenced block, then the span from the first `{` to the last `}`,
/// then keyword-based partial recovery.
pub fn parse_with_fallback(response: &str, page_number: usize) -> DetectionResult {
    if let Some(block) = extract_json_from_markdown(response) {
        if let Some(result) = parse_detection(&block) {
            debug!("Page {}: parsed detection from fenced block", page_number);
            return result;
        }
    }

    if let (Some(start), Some(end)) = (response.find('{'), response.rfind('}')) {
        if end > start {
            if let Some(result) = parse_detection(&response[start..=end]) {
                debug!("Page {}: parsed detection from response body", page_number);
                return result;
            }
        }
    }

    warn!("Page {}: JSON unrecoverable, using partial extraction", page_number);
    partial_detection(response)
}

fn parse_detection(candidate: &str) -> Option<DetectionResult> {
    let repaired = repair_json(candidate)?;
    serde_json::from_str(&repaired).ok()
}

fn partial_detection(response: &str) -> DetectionResult {
    let has_tables = MENTIONS_TABLE.is_match(response);
    let has_figures = MENTIONS_FIGURE.is_match(response);

    let capture = |re: &Regex| {
        re.captures(response)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    };
    let structured_data = capture(&STRUCTURED_DATA).unwrap_or_default();
    let description =
        capture(&DESCRIPTION).unwrap_or_else(|| "Extracted from partial data".to_string());

    let mut elements = Vec::new();
    if has_tables || has_figures || !structured_data.is_empty() {
        elements.push(VisualElement {
            kind: if has_tables {
                ElementKind::Table
            } else {
                ElementKind::Figure
            },
            bbox: vec![0.0, 0.0, 600.0, 400.0],
            confidence: 0.5,
            description,
            content: ElementContent {
                structured_data,
                raw_text: truncate_raw(response),
                summary: "Extracted from partial data".to_string(),
            },
        });
    }

    DetectionResult {
        page_analysis: PageAnalysis {
            has_tables,
            has_figures,
            total_elements: elements.len(),
            page_summary: "Partial data extraction due to JSON parsing error".to_string(),
        },
        elements,
    }
}

fn truncate_raw(s: &str) -> String {
    match s.char_indices().nth(RAW_TEXT_LIMIT) {
        Some((cut, _)) => format!("{}...", &s[..cut]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const VALID: &str = r#"{"page_analysis": {"has_tables": true, "has_figures": false, "total_elements": 1, "page_summary": "A financial table."}, "elements": [{"type": "table", "bbox": [10, 10, 600, 400], "confidence": 0.95, "description": "Revenue table", "content": {"structured_data": "Revenue data"}}]}"#;

    #[test]
    fn valid_json_is_untouched() {
        assert_eq!(repair_json(VALID).as_deref(), Some(VALID));
    }

    #[test]
    fn trailing_commas_removed() {
        let fixed = repair_json(r#"{"a": [1, 2, ], "b": {"c": 1,},}"#).unwrap();
        let v: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(v["a"][1], 2);
        assert_eq!(v["b"]["c"], 1);
    }

    #[test]
    fn truncated_object_closed_in_order() {
        let fixed = repair_json(r#"{"elements": [{"type": "table", "description": "Rev"#).unwrap();
        let v: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(v["elements"][0]["description"], "Rev");
    }

    #[test]
    fn inner_quotes_escaped() {
        let fixed = repair_json(r#"{"description": "The "Q3" results", "x": 1}"#).unwrap();
        let v: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(v["description"], "The \"Q3\" results");
    }

    #[test]
    fn raw_newlines_and_controls_in_strings() {
        let fixed = repair_json("{\"s\": \"line1\nline2\u{0001}\"}").unwrap();
        let v: serde_json::Value = serde_json::from_str(&fixed).unwrap();
        assert_eq!(v["s"], "line1\nline2");
    }

    #[test]
    fn hopeless_input_is_none() {
        assert_eq!(repair_json("not json at all"), None);
    }

    #[test]
    fn longest_fenced_block_wins() {
        let s = "```json\n{\"a\":1}\n```\ntext\n```json\n{\"a\":1,\"b\":2}\n```";
        assert_eq!(extract_json_from_markdown(s).as_deref(), Some("{\"a\":1,\"b\":2}"));
    }

    #[test]
    fn plain_fence_used_when_no_json_fence() {
        let s = "```\n{\"a\":1}\n```";
        assert_eq!(extract_json_from_markdown(s).as_deref(), Some("{\"a\":1}"));
        assert_eq!(extract_json_from_markdown("no fences"), None);
    }

    #[test]
    fn null_fields_keep_every_element() {
        let reply = r#"{"page_analysis": {"has_tables": true, "total_elements": 2, "page_summary": "Two statements."}, "elements": [
            {"type": "table", "bbox": null, "confidence": 0.9, "description": "Income statement"},
            {"type": "table", "bbox": [0, 0, 10, 10], "confidence": null, "description": "Balance sheet"}]}"#;
        let r = parse_with_fallback(reply, 4);
        let descs: Vec<&str> = r.elements.iter().map(|e| e.description.as_str()).collect();
        assert_eq!(descs, vec!["Income statement", "Balance sheet"]);
        assert_eq!(r.page_analysis.page_summary, "Two statements.");
    }

    #[test]
    fn parses_markdown_wrapped_response() {
        let r = parse_with_fallback(&format!("```json\n{VALID}\n```"), 1);
        assert_eq!(r.elements.len(), 1);
        assert_eq!(r.elements[0].description, "Revenue table");
        assert_eq!(r.elements[0].content.structured_data, "Revenue data");
    }

    #[test]
    fn parses_json_surrounded_by_prose() {
        let r = parse_with_fallback(&format!("Here you go: {VALID} Hope it helps"), 2);
        assert!(r.page_analysis.has_tables);
        assert_eq!(r.elements[0].confidence, 0.95);
    }

    #[test]
    fn partial_recovery_builds_table_element() {
        let response = "I see a Table here. description: 'Balance sheet' but ran out";
        let r = parse_with_fallback(response, 3);
        assert!(r.page_analysis.has_tables);
        assert_eq!(r.page_analysis.total_elements, 1);
        let el = &r.elements[0];
        assert_eq!(el.kind, ElementKind::Table);
        assert_eq!(el.bbox, vec![0.0, 0.0, 600.0, 400.0]);
        assert_eq!(el.confidence, 0.5);
        assert_eq!(el.description, "Balance sheet");
        assert_eq!(el.content.raw_text, response);
    }

    #[test]
    fn partial_recovery_without_keywords_is_empty() {
        let r = parse_with_fallback("nothing useful", 4);
        assert!(r.elements.is_empty());
        assert_eq!(r.page_analysis.total_elements, 0);
    }

    #[test]
    fn partial_raw_text_is_truncated() {
        let long = format!("chart {}", "x".repeat(2000));
        let r = parse_with_fallback(&long, 5);
        let raw = &r.elements[0].content.raw_text;
        assert_eq!(raw.chars().count(), RAW_TEXT_LIMIT + 3);
        assert!(raw.ends_with("..."));
        assert_eq!(r.elements[0].kind, ElementKind::Figure);
    }
}
