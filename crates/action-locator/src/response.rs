//! Turning a model reply into a locator map

use serde_json::Value;
use tracing::debug;

use crate::errors::LocatorError;
use crate::types::ContextLocators;

/// Pull the first JSON object out of a reply, tolerating code fences and
/// prose before or after it.
pub fn extract_json_object(raw: &str) -> Option<String> {
    let fence = "```";
    if let Some(start) = raw.find(fence) {
        let after_fence = &raw[start + fence.len()..];
        let after_lang = after_fence.trim_start_matches(|c: char| c.is_alphanumeric() || c == '_');
        if let Some(end) = after_lang.find(fence) {
            let block = &after_lang[..end];
            if block.contains('{') {
                return Some(trim_symmetric(block));
            }
        }
    }

    let start = raw.find('{')?;
    let rest = &raw[start + 1..];
    let mut depth = 1i32;
    let mut in_string = false;
    let mut escaped = false;
    for (idx, ch) in rest.char_indices() {
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
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(trim_symmetric(&raw[start..start + 1 + idx + 1]));
                }
            }
            _ => {}
        }
    }
    None
}

fn trim_symmetric(value: &str) -> String {
    value.trim().trim_matches('`').trim().to_string()
}

/// Double every backslash that does not start a valid JSON escape.
///
/// Models often emit CSS escapes like `#a\:b` verbatim inside JSON strings.
pub fn repair_escapes(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut chars = json.chars().peekable();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.peek().copied() {
            Some(next @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')) => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push_str("\\\\"),
        }
    }
    out
}

/// Parse a flat `key -> locator` object. Non-string values are skipped.
pub fn parse_locator_map(raw: &str) -> Result<ContextLocators, LocatorError> {
    let json = extract_json_object(raw)
        .ok_or_else(|| LocatorError::HealParse("no JSON object in response".to_string()))?;

    let value: Value = match serde_json::from_str(&json) {
        Ok(value) => value,
        Err(first) => {
            debug!(%first, "locator map needs escape repair");
            serde_json::from_str(&repair_escapes(&json))
                .map_err(|err| LocatorError::HealParse(err.to_string()))?
        }
    };

    let Value::Object(entries) = value else {
        return Err(LocatorError::HealParse("response is not a JSON object".to_string()));
    };
    Ok(entries
        .into_iter()
        .filter_map(|(key, value)| match value {
            Value::String(locator) => Some((key, locator.trim().to_string())),
            _ => None,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_from_fenced_block() {
        let input = "Here you go:\n```json\n{\"login_button\":\"#login\"}\n```";
        let extracted = extract_json_object(input).expect("json");
        assert_eq!(extracted, "{\"login_button\":\"#login\"}");
    }

    #[test]
    fn extracts_from_inline_object() {
        let input = "text { \"foo\": {\"a\": 1} } more";
        assert_eq!(
            extract_json_object(input).as_deref(),
            Some("{ \"foo\": {\"a\": 1} }")
        );
        assert!(extract_json_object("no braces").is_none());
    }

    #[test]
    fn object_followed_by_prose_still_parses() {
        let reply = "{\"btn\": \"#buy\", \"grid\": \"td[data-x='}']\"}\nThese locators use ids {where possible}.";
        let map = parse_locator_map(reply).unwrap();
        assert_eq!(map["btn"], "#buy");
        assert_eq!(map["grid"], "td[data-x='}']");
    }

    #[test]
    fn repairs_css_escapes() {
        let raw = r##"{"slot": "#grid\:cell", "quote": "say \"hi\""}"##;
        let map = parse_locator_map(raw).unwrap();
        assert_eq!(map["slot"], r"#grid\:cell");
        assert_eq!(map["quote"], "say \"hi\"");
    }

    #[test]
    fn skips_non_string_values() {
        let map = parse_locator_map(r##"{"a": "#a", "b": 3, "c": null, "d": ["x"]}"##).unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map["a"], "#a");
    }

    #[test]
    fn garbage_is_a_parse_error() {
        assert!(matches!(
            parse_locator_map("I could not find anything"),
            Err(LocatorError::HealParse(_))
        ));
        assert!(matches!(
            parse_locator_map("{\"a\": \"#a\""),
            Err(LocatorError::HealParse(_))
        ));
    }
}
