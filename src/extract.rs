use serde_json::{Map, Value};

use crate::{
    error::GatewayError,
    media::truncate_for_log,
    models::{AnalysisResult, OutputSchema},
};

const CONTENT_DETAIL_LIMIT: usize = 500;

/// Pulls the first honestly extractable JSON object out of free-form model text.
///
/// Tries, in order: the whole (trimmed) text, each balanced `{...}` span in
/// order of appearance, and finally the span from the first `{` to the last `}`.
pub fn extract_json_object(text: &str) -> Result<Map<String, Value>, GatewayError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::format("upstream returned empty content"));
    }
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(trimmed) {
        return Ok(map);
    }

    for span in balanced_spans(trimmed) {
        if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(span) {
            return Ok(map);
        }
    }

    let failure = |reason: &str| GatewayError::UpstreamFormat {
        reason: reason.to_string(),
        content: Some(truncate_for_log(trimmed, CONTENT_DETAIL_LIMIT)),
    };
    let (start, end) = match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if start < end => (start, end),
        _ => return Err(failure("no JSON object found in upstream content")),
    };
    match serde_json::from_str::<Value>(&trimmed[start..=end]) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(failure("extracted JSON is not an object")),
        Err(e) => Err(failure(&format!("extracted JSON did not parse: {e}"))),
    }
}

/// Top-level `{...}` spans with balanced braces, ignoring braces inside JSON strings.
fn balanced_spans(text: &str) -> Vec<&str> {
    let mut spans = Vec::new();
    let bytes = text.as_bytes();
    let mut search_from = 0;
    while let Some(offset) = text[search_from..].find('{') {
        let start = search_from + offset;
        let mut depth = 0usize;
        let mut in_string = false;
        let mut escaped = false;
        let mut closed_at = None;
        for (i, &b) in bytes.iter().enumerate().skip(start) {
            if in_string {
                match b {
                    _ if escaped => escaped = false,
                    b'\\' => escaped = true,
                    b'"' => in_string = false,
                    _ => {}
                }
                continue;
            }
            match b {
                b'"' => in_string = true,
                b'{' => depth += 1,
                b'}' => {
                    depth -= 1;
                    if depth == 0 {
                        closed_at = Some(i);
                        break;
                    }
                }
                _ => {}
            }
        }
        // An unclosed brace only rules out spans starting here.
        if let Some(end) = closed_at {
            spans.push(&text[start..=end]);
        }
        search_from = start + 1;
    }
    spans
}

/// Keeps exactly the declared keys; any missing key or non-string value fails.
pub fn validate_against_schema(mut parsed: Map<String, Value>, schema: &OutputSchema) -> Result<AnalysisResult, GatewayError> {
    let mut result = AnalysisResult::new();
    let mut missing = Vec::new();
    for key in schema.keys() {
        match parsed.remove(key) {
            Some(Value::String(s)) => {
                result.insert(key.to_string(), Value::String(s));
            }
            Some(other) => {
                return Err(GatewayError::format(format!("field \"{key}\" is not a string (got {other})")));
            }
            None => missing.push(key),
        }
    }
    if !missing.is_empty() {
        return Err(GatewayError::format(format!("upstream JSON is missing fields: {}", missing.join(", "))));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn as_value(map: Map<String, Value>) -> Value {
        Value::Object(map)
    }

    #[test]
    fn fenced_reply_with_chatter_yields_object() {
        let content = "Sure! ```json\n{\"analysis\":\"x\",\"celebrity\":\"y\"}\n``` Hope that helps!";
        let parsed = extract_json_object(content).unwrap();
        assert_eq!(as_value(parsed), json!({"analysis": "x", "celebrity": "y"}));
    }

    #[test]
    fn plain_json_parses_directly() {
        let parsed = extract_json_object("  {\"advice\": \"walk more\"}\n").unwrap();
        assert_eq!(as_value(parsed), json!({"advice": "walk more"}));
    }

    #[test]
    fn no_braces_is_a_format_error() {
        let err = extract_json_object("I could not analyse these pictures, sorry.").unwrap_err();
        assert_eq!(err.kind(), "upstream_format");
    }

    #[test]
    fn empty_content_is_a_format_error() {
        assert_eq!(extract_json_object("   ").unwrap_err().kind(), "upstream_format");
    }

    #[test]
    fn stray_braces_in_prose_do_not_hide_the_object() {
        let content = "Using the {observe} step first: {\"analysis\": \"a {curly} note\", \"talent\": \"t\"} done {end}";
        let parsed = extract_json_object(content).unwrap();
        assert_eq!(as_value(parsed), json!({"analysis": "a {curly} note", "talent": "t"}));
    }

    #[test]
    fn unclosed_brace_in_prose_does_not_stop_the_scan() {
        let parsed = extract_json_object(r#"Score {5/5 overall: {"analysis":"x"} end"#).unwrap();
        assert_eq!(as_value(parsed), json!({"analysis": "x"}));
    }

    #[test]
    fn escaped_quotes_inside_strings_are_respected() {
        let content = r#"Here: {"analysis": "she said \"}\" twice"} ok"#;
        let parsed = extract_json_object(content).unwrap();
        assert_eq!(as_value(parsed), json!({"analysis": "she said \"}\" twice"}));
    }

    #[test]
    fn broken_json_reports_content_in_details() {
        let err = extract_json_object("{\"analysis\": \"unterminated}").unwrap_err();
        match err {
            GatewayError::UpstreamFormat { content, .. } => assert!(content.unwrap().contains("unterminated")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn validation_keeps_only_declared_keys() {
        let parsed = json!({"analysis": "a", "celebrity": "c", "talent": "t", "advice": "d", "extra": "x"});
        let Value::Object(map) = parsed else { unreachable!() };
        let result = validate_against_schema(map, &OutputSchema::default()).unwrap();
        assert_eq!(result.keys().collect::<Vec<_>>(), vec!["analysis", "celebrity", "talent", "advice"]);
    }

    #[test]
    fn validation_rejects_missing_and_non_string_fields() {
        let Value::Object(map) = json!({"analysis": "a", "celebrity": "c"}) else { unreachable!() };
        let err = validate_against_schema(map, &OutputSchema::default()).unwrap_err();
        assert!(err.to_string().contains("talent, advice"));

        let Value::Object(map) = json!({"analysis": 1, "celebrity": "c", "talent": "t", "advice": "d"}) else { unreachable!() };
        assert_eq!(validate_against_schema(map, &OutputSchema::default()).unwrap_err().kind(), "upstream_format");
    }
}
