//! Element key schema handed to the locator pass

use std::collections::BTreeMap;

/// `element_key -> what the element is`
pub type KeySchema = BTreeMap<String, String>;

const BASE_KEYS: &[(&str, &str)] = &[
    ("header", "Top page header or banner container"),
    ("main_nav", "Primary navigation menu"),
    ("main_content", "Main content region of the page"),
    ("search_input", "Site search text input"),
    ("search_button", "Button submitting the site search"),
    ("login_button", "Button or link opening the sign-in flow"),
    ("cookie_accept_button", "Button accepting the cookie consent banner"),
    ("popup_close_button", "Close control of a modal, overlay or promotional popup"),
    ("loading_indicator", "Spinner or progress element shown while content loads"),
    ("error_message", "Inline error or alert message container"),
    ("pagination_next", "Control moving to the next page of results"),
    ("footer", "Bottom page footer container"),
];

/// Keys every context is expected to map when the element exists
pub fn base_schema() -> KeySchema {
    BASE_KEYS
        .iter()
        .map(|(key, description)| (key.to_string(), description.to_string()))
        .collect()
}

/// Base schema with `overlay` entries added or replacing base descriptions
pub fn overlay_schema(overlay: &KeySchema) -> KeySchema {
    let mut schema = base_schema();
    schema.extend(overlay.iter().map(|(k, v)| (k.clone(), v.clone())));
    schema
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overlay_adds_and_replaces() {
        let mut overlay = KeySchema::new();
        overlay.insert("odds_table".into(), "Table of current odds".into());
        overlay.insert("footer".into(), "Legal footer".into());

        let schema = overlay_schema(&overlay);
        assert_eq!(schema.len(), BASE_KEYS.len() + 1);
        assert_eq!(schema["footer"], "Legal footer");
        assert!(schema.contains_key("odds_table"));
        assert!(schema.contains_key("cookie_accept_button"));
    }
}
