use crate::schema::KeySchema;
use crate::types::HealRequest;

/// Markup beyond this many characters is cut from the locator prompt
pub const DEFAULT_MAX_MARKUP_CHARS: usize = 60_000;

const INVENTORY_TAXONOMY: &str = "1. Layout & structure: header, main content area, sidebars, footer, panels, tabs.\n2. Navigation: menus, breadcrumbs, pagination, links between sections.\n3. Interactive controls: buttons, inputs, selects, checkboxes, toggles, forms.\n4. Content: tables, lists, cards, headings, repeated rows and their fields.\n5. Promotional & ad elements: banners, promo popups, sponsored blocks.\n6. System & feedback elements: cookie banners, modals, loading indicators, error and toast messages.\n7. Other: anything visible that fits none of the categories above.";

const LOCATOR_RULES: &str = "- Prefer a unique id (#id), then a structural attribute ([name=...], [data-testid=...], [role=...], [type=...]), then a single unique class (.class).\n- Never use text, prices, scores, dates, counters or any other value that changes between visits.\n- Never build deep descendant chains; one or two segments is the target.\n- Use an empty string for keys whose element is not present on the page.\n- Locators must match elements present in the markup below.";

/// Builds the two heal prompts: a visual inventory and the locator map.
#[derive(Debug, Clone)]
pub struct PromptBuilder {
    max_markup_chars: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_MARKUP_CHARS)
    }
}

impl PromptBuilder {
    pub fn new(max_markup_chars: usize) -> Self {
        Self { max_markup_chars }
    }

    /// Pass A: describe every visible element of the screenshot
    pub fn inventory_prompt(&self, request: &HealRequest) -> String {
        let mut sections = Vec::new();
        sections.push(
            "You are auditing a screenshot of a web application page. List every visible element, grouped by category."
                .to_string(),
        );
        sections.push(format!("Categories:\n{INVENTORY_TAXONOMY}"));
        sections.push(format!("Page context: {}", request.context));
        if let Some(key) = request.element_key.as_deref() {
            sections.push(format!(
                "Pay particular attention to the element known as `{key}`."
            ));
        }
        sections.push(
            "For each element give its category, a short description, its visible label if any, and its approximate position."
                .to_string(),
        );
        sections.join("\n\n")
    }

    /// Pass B: map schema keys to locators as a single JSON object
    pub fn locator_prompt(&self, request: &HealRequest, inventory: &str, schema: &KeySchema) -> String {
        let mut sections = Vec::new();
        sections.push(
            "You are generating CSS locators for a web application page. Return exactly one JSON object mapping element keys to locator strings and nothing else."
                .to_string(),
        );
        sections.push(format!("Page context: {}", request.context));
        if let Some(key) = request.element_key.as_deref() {
            let reason = request
                .failure_reason
                .as_deref()
                .unwrap_or("cached locator no longer matches");
            sections.push(format!("The locator for `{key}` failed: {reason}"));
        }

        let keys = schema
            .iter()
            .map(|(key, description)| format!("- {key}: {description}"))
            .collect::<Vec<_>>()
            .join("\n");
        sections.push(format!("Element keys to map (include every key that applies):\n{keys}"));
        sections.push(format!("Rules:\n{LOCATOR_RULES}"));
        if !inventory.trim().is_empty() {
            sections.push(format!("Visual inventory of the page:\n{}", inventory.trim()));
        }
        sections.push(format!(
            "Page markup:\n{}",
            truncate_chars(&request.markup_snapshot, self.max_markup_chars)
        ));
        sections.push("Respond with the JSON object only, e.g. {\"login_button\": \"#login\"}.".to_string());
        sections.join("\n\n")
    }
}

/// Cut `text` to at most `max_chars` characters
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
