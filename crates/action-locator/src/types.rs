//! Core types for the locator system

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// `element_key -> locator` for one context
pub type ContextLocators = BTreeMap<String, String>;

/// `context -> element_key -> locator`, the persisted document shape
pub type LocatorBook = BTreeMap<String, ContextLocators>;

/// Options for a single heal run
#[derive(Debug, Clone, Default)]
pub struct HealOptions {
    /// Heal even when the context already has cached locators
    pub force: bool,

    /// Element whose failure triggered the heal
    pub element_key: Option<String>,

    /// Why the heal was requested
    pub reason: Option<String>,
}

impl HealOptions {
    /// Forced refresh for a specific element
    pub fn forced(element_key: impl Into<String>) -> Self {
        Self {
            force: true,
            element_key: Some(element_key.into()),
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Everything the prompt builder needs for one heal
#[derive(Debug, Clone)]
pub struct HealRequest {
    pub context: String,
    pub element_key: Option<String>,
    pub failure_reason: Option<String>,
    pub markup_snapshot: String,
    pub screenshot_snapshot: Vec<u8>,
}

/// Heal outcome enumeration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HealOutcome {
    /// Store updated with fresh locators
    Healed {
        /// Keys written for the context
        updated: ContextLocators,

        /// How many of them were downgraded to a simpler locator
        simplified: usize,
    },

    /// Healing skipped (context already cached, no forced refresh)
    Skipped {
        /// Reason for skipping
        reason: String,
    },

    /// Healing aborted; store left unchanged
    Aborted {
        /// Reason for abortion
        reason: String,
    },
}

impl HealOutcome {
    /// Check if heal was successful
    pub fn is_success(&self) -> bool {
        matches!(self, HealOutcome::Healed { .. })
    }

    /// Locator written for `key`, if any
    pub fn healed_locator(&self, key: &str) -> Option<&str> {
        match self {
            HealOutcome::Healed { updated, .. } => updated.get(key).map(String::as_str),
            _ => None,
        }
    }

    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            HealOutcome::Healed { .. } => "healed",
            HealOutcome::Skipped { .. } => "skipped",
            HealOutcome::Aborted { .. } => "aborted",
        }
    }
}

/// What the caller intends to do with a resolved locator.
///
/// Drives the lightweight usage probe of `resolve_with_fallback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum LocatorUsage {
    /// Click a single control
    Click,

    /// Type into an input
    Fill,

    /// Read text from an element
    Read,

    /// Iterate over repeated elements (rows, cards, list items)
    Collect { min: usize },
}

impl LocatorUsage {
    /// Smallest element count that serves this usage
    pub fn min_count(&self) -> usize {
        match self {
            LocatorUsage::Collect { min } => (*min).max(1),
            _ => 1,
        }
    }

    pub fn is_satisfied_by(&self, count: usize) -> bool {
        count >= self.min_count()
    }
}

impl fmt::Display for LocatorUsage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocatorUsage::Click => write!(f, "click"),
            LocatorUsage::Fill => write!(f, "fill"),
            LocatorUsage::Read => write!(f, "read"),
            LocatorUsage::Collect { min } => write!(f, "collect at least {min} elements"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heal_outcome() {
        let mut updated = ContextLocators::new();
        updated.insert("submit".to_string(), "#submit".to_string());
        let outcome = HealOutcome::Healed {
            updated,
            simplified: 0,
        };

        assert!(outcome.is_success());
        assert_eq!(outcome.healed_locator("submit"), Some("#submit"));
        assert_eq!(outcome.healed_locator("other"), None);
        assert_eq!(outcome.label(), "healed");
    }

    #[test]
    fn test_heal_outcome_failure() {
        let outcome = HealOutcome::Skipped {
            reason: "Already cached".to_string(),
        };

        assert!(!outcome.is_success());
        assert!(outcome.healed_locator("submit").is_none());
    }

    #[test]
    fn usage_probe_thresholds() {
        assert!(LocatorUsage::Click.is_satisfied_by(1));
        assert!(!LocatorUsage::Click.is_satisfied_by(0));
        assert!(!LocatorUsage::Collect { min: 5 }.is_satisfied_by(4));
        assert!(LocatorUsage::Collect { min: 0 }.is_satisfied_by(1));
        assert_eq!(
            LocatorUsage::Collect { min: 3 }.to_string(),
            "collect at least 3 elements"
        );
    }
}
