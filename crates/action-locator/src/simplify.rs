//! Downgrading over-specified locators to a single unique token

use std::collections::{HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::types::ContextLocators;

static ID_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"#([A-Za-z_][A-Za-z0-9_-]*)").expect("id token regex"));
static CLASS_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\.(-?[A-Za-z_][A-Za-z0-9_-]*)").expect("class token regex"));
static ID_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\sid\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#).expect("id attribute regex")
});
static CLASS_ATTR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)\sclass\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#)
        .expect("class attribute regex")
});

/// Limits above which a locator counts as complex
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComplexityLimits {
    pub max_segments: usize,
    pub max_classes: usize,
    pub max_child_combinators: usize,
    pub max_length: usize,
}

impl Default for ComplexityLimits {
    fn default() -> Self {
        Self {
            max_segments: 3,
            max_classes: 2,
            max_child_combinators: 1,
            max_length: 100,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LocatorSimplifier {
    limits: ComplexityLimits,
}

/// Occurrence counts of id and class values in one markup document
#[derive(Debug, Default)]
pub struct MarkupIndex {
    ids: HashMap<String, usize>,
    classes: HashMap<String, usize>,
}

impl MarkupIndex {
    pub fn build(markup: &str) -> Self {
        let mut index = Self::default();
        for caps in ID_ATTR_RE.captures_iter(markup) {
            if let Some(value) = attr_value(&caps) {
                let value = value.trim();
                if !value.is_empty() {
                    *index.ids.entry(value.to_string()).or_default() += 1;
                }
            }
        }
        for caps in CLASS_ATTR_RE.captures_iter(markup) {
            if let Some(value) = attr_value(&caps) {
                let unique: HashSet<&str> = value.split_whitespace().collect();
                for class in unique {
                    *index.classes.entry(class.to_string()).or_default() += 1;
                }
            }
        }
        index
    }

    pub fn id_count(&self, id: &str) -> usize {
        self.ids.get(id).copied().unwrap_or(0)
    }

    pub fn class_count(&self, class: &str) -> usize {
        self.classes.get(class).copied().unwrap_or(0)
    }
}

fn attr_value<'a>(caps: &regex::Captures<'a>) -> Option<&'a str> {
    caps.get(1)
        .or_else(|| caps.get(2))
        .or_else(|| caps.get(3))
        .map(|m| m.as_str())
}

impl LocatorSimplifier {
    pub fn new(limits: ComplexityLimits) -> Self {
        Self { limits }
    }

    pub fn limits(&self) -> ComplexityLimits {
        self.limits
    }

    pub fn is_complex(&self, locator: &str) -> bool {
        if locator.len() > self.limits.max_length {
            return true;
        }
        let outline = outline(locator);
        segment_count(&outline) > self.limits.max_segments
            || CLASS_TOKEN_RE.find_iter(&outline).count() > self.limits.max_classes
            || outline.matches('>').count() > self.limits.max_child_combinators
    }

    /// Simplified form of `locator`, or `None` when it should stay as is.
    ///
    /// Only the rightmost compound selector is considered: ancestors name a
    /// different element than the one being targeted.
    pub fn simplify(&self, locator: &str, index: &MarkupIndex) -> Option<String> {
        if !self.is_complex(locator) {
            return None;
        }
        let outline = outline(locator);
        let target = target_compound(&outline);
        for caps in ID_TOKEN_RE.captures_iter(target) {
            let id = &caps[1];
            if index.id_count(id) == 1 {
                return Some(format!("#{id}"));
            }
        }
        for caps in CLASS_TOKEN_RE.captures_iter(target) {
            let class = &caps[1];
            if index.class_count(class) == 1 {
                return Some(format!(".{class}"));
            }
        }
        None
    }

    /// Simplify every complex locator of a heal result against `markup`.
    /// Returns the number of locators replaced.
    pub fn simplify_all(&self, locators: &mut ContextLocators, markup: &str) -> usize {
        let index = MarkupIndex::build(markup);
        let mut replaced = 0;
        for (key, locator) in locators.iter_mut() {
            if let Some(simpler) = self.simplify(locator, &index) {
                debug!(key = %key, from = %locator, to = %simpler, "locator simplified");
                *locator = simpler;
                replaced += 1;
            }
        }
        replaced
    }
}

/// Locator with bracketed and parenthesised content blanked out, so
/// attribute values and pseudo-class arguments do not count as structure.
fn outline(locator: &str) -> String {
    let mut out = String::with_capacity(locator.len());
    let mut depth = 0usize;
    let mut quote: Option<char> = None;
    for ch in locator.chars() {
        if let Some(q) = quote {
            if ch == q {
                quote = None;
            }
            continue;
        }
        match ch {
            '"' | '\'' if depth > 0 => quote = Some(ch),
            '[' | '(' => {
                depth += 1;
                if depth == 1 {
                    out.push(ch);
                }
            }
            ']' | ')' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    out.push(ch);
                }
            }
            _ if depth > 0 => {}
            _ => out.push(ch),
        }
    }
    out
}

fn target_compound(outline: &str) -> &str {
    outline
        .rsplit(|ch: char| ch.is_whitespace() || matches!(ch, '>' | '+' | '~'))
        .find(|part| !part.is_empty())
        .unwrap_or(outline)
}

fn segment_count(outline: &str) -> usize {
    outline
        .replace(|ch: char| matches!(ch, '>' | '+' | '~'), " ")
        .split_whitespace()
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_locators_are_simple() {
        let simplifier = LocatorSimplifier::default();
        assert!(!simplifier.is_complex("#login"));
        assert!(!simplifier.is_complex("form > input[name='q']"));
        assert!(!simplifier.is_complex("div.a.b span"));
    }

    #[test]
    fn each_limit_marks_complex() {
        let simplifier = LocatorSimplifier::default();
        assert!(simplifier.is_complex("main div ul li"));
        assert!(simplifier.is_complex("div.a.b.c"));
        assert!(simplifier.is_complex("ul > li > a"));
        assert!(simplifier.is_complex(&format!("#{}", "x".repeat(100))));
    }

    #[test]
    fn brackets_do_not_count_as_structure() {
        let simplifier = LocatorSimplifier::default();
        assert!(!simplifier.is_complex("a[href='/a > b > c.d.e.f']"));
        assert!(!simplifier.is_complex("li:not(.x.y.z) span"));
    }

    #[test]
    fn prefers_unique_id_then_unique_class() {
        let markup = r#"<body><div class="wrap"><table id="odds" class="grid striped"></table>
            <table class="grid"></table><span class="price hot"></span></div></body>"#;
        let index = MarkupIndex::build(markup);
        let simplifier = LocatorSimplifier::default();

        assert_eq!(
            simplifier.simplify("body > div.wrap > div > table#odds", &index),
            Some("#odds".to_string())
        );
        assert_eq!(
            simplifier.simplify("body div.wrap table.grid.striped", &index),
            Some(".striped".to_string())
        );
        assert_eq!(simplifier.simplify("#odds", &index), None);
    }

    #[test]
    fn ancestor_tokens_are_never_chosen() {
        let markup = r#"<div id="results"><ul><li class="row"><a class="link"></a></li>
            <li class="row"><a class="link"></a></li></ul></div><nav class="pager"></nav>"#;
        let index = MarkupIndex::build(markup);
        let simplifier = LocatorSimplifier::default();

        assert_eq!(
            simplifier.simplify("div#results > ul > li.row > a.link", &index),
            None
        );
        assert_eq!(
            simplifier.simplify("body > main > div#results ~ nav.pager", &index),
            Some(".pager".to_string())
        );
        assert_eq!(target_compound("div#results > ul li.row>a.link"), "a.link");
    }

    #[test]
    fn keeps_complex_locator_without_unique_token() {
        let markup = r#"<ul><li class="row"></li><li class="row"></li></ul>"#;
        let index = MarkupIndex::build(markup);
        assert_eq!(
            LocatorSimplifier::default().simplify("body main ul li.row", &index),
            None
        );
    }

    #[test]
    fn duplicate_ids_are_not_unique() {
        let markup = r#"<a id="buy"></a><a id='buy'></a><a data-id="x"></a>"#;
        let index = MarkupIndex::build(markup);
        assert_eq!(index.id_count("buy"), 2);
        assert_eq!(index.id_count("x"), 0);
    }

    #[test]
    fn simplify_all_counts_replacements() {
        let mut locators = ContextLocators::new();
        locators.insert("table".into(), "html body div section > table#odds".into());
        locators.insert("login".into(), "#login".into());
        let replaced = LocatorSimplifier::default()
            .simplify_all(&mut locators, r#"<table id="odds"></table><a id="login"></a>"#);
        assert_eq!(replaced, 1);
        assert_eq!(locators["table"], "#odds");
        assert_eq!(locators["login"], "#login");
    }
}
