//! Interpretation of assistant replies
//!
//! Step headers look like `Create Invoice — Step 2/6` (or `Étape 2/6`).
//! Everything here is pure: no I/O, no shared state.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use crate::lang::Lang;

const HEADER_DASH: char = '—';

/// Progress fields found in a reply header. All absent when no step
/// pattern matched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProgressUpdate {
    pub title: Option<String>,
    pub step: Option<u32>,
    pub total: Option<u32>,
}

impl ProgressUpdate {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.step.is_none() && self.total.is_none()
    }
}

fn step_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)(?:step|étape)\s+(\d+)\s*/\s*(\d+)").expect("step pattern is valid")
    })
}

/// Pull the flow title and 0-based step counter out of a reply header
pub fn extract_progress(text: &str) -> ProgressUpdate {
    let dash_idx = text.find(HEADER_DASH);
    let span = match dash_idx {
        Some(idx) => &text[idx..],
        None => text,
    };

    let Some(caps) = step_pattern().captures(span) else {
        return ProgressUpdate::default();
    };
    let (Ok(step), Ok(total)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) else {
        return ProgressUpdate::default();
    };

    let title = dash_idx
        .map(|idx| {
            text[..idx]
                .trim_start_matches(|c: char| !(c.is_alphanumeric() || c == '_'))
                .trim()
                .to_string()
        })
        .filter(|title| !title.is_empty());

    ProgressUpdate {
        title,
        step: Some(step.saturating_sub(1)),
        total: Some(total.max(1)),
    }
}

/// Read a numeric `step_index` out of a reply's custom payload
pub fn custom_step_index(custom: &Value) -> Option<u32> {
    custom
        .get("step_index")
        .and_then(Value::as_u64)
        .and_then(|idx| u32::try_from(idx).ok())
}

/// Action verb inferred from assistant text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChipTag {
    Click,
    Enter,
    Select,
    Attach,
    Next,
    Submit,
}

impl ChipTag {
    /// Display order; also the order `classify_chips` returns tags in
    pub fn all() -> [ChipTag; 6] {
        [
            ChipTag::Click,
            ChipTag::Enter,
            ChipTag::Select,
            ChipTag::Attach,
            ChipTag::Next,
            ChipTag::Submit,
        ]
    }

    /// Keywords (lowercase, English then French) that trigger this tag
    fn keywords(&self) -> [&'static str; 2] {
        match self {
            ChipTag::Click => ["click", "cliquer"],
            ChipTag::Enter => ["enter", "saisir"],
            ChipTag::Select => ["select", "sélectionner"],
            ChipTag::Attach => ["attach", "joindre"],
            ChipTag::Next => ["next", "suivant"],
            ChipTag::Submit => ["submit", "soumettre"],
        }
    }

    pub fn label(&self, lang: Lang) -> &'static str {
        match self {
            ChipTag::Click => lang.pick("Click", "Cliquer"),
            ChipTag::Enter => lang.pick("Enter", "Saisir"),
            ChipTag::Select => lang.pick("Select", "Sélectionner"),
            ChipTag::Attach => lang.pick("Attach", "Joindre"),
            ChipTag::Next => lang.pick("Next", "Suivant"),
            ChipTag::Submit => lang.pick("Submit", "Soumettre"),
        }
    }
}

/// Tags for every action verb mentioned in `text`, in `ChipTag::all` order
pub fn classify_chips(text: &str) -> Vec<ChipTag> {
    let lc = text.to_lowercase();
    ChipTag::all()
        .into_iter()
        .filter(|tag| tag.keywords().iter().any(|kw| lc.contains(kw)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_header_with_dash() {
        let update = extract_progress("Create Invoice — Step 3/5");
        assert_eq!(update.title.as_deref(), Some("Create Invoice"));
        assert_eq!(update.step, Some(2));
        assert_eq!(update.total, Some(5));
    }

    #[test]
    fn test_title_strips_leading_symbols() {
        let update = extract_progress("📄 **Supplier Registration — Étape 1/4**\nClick Register.");
        assert_eq!(update.title.as_deref(), Some("Supplier Registration"));
        assert_eq!(update.step, Some(0));
        assert_eq!(update.total, Some(4));
    }

    #[test]
    fn test_french_and_case_insensitive() {
        let update = extract_progress("Facture — ÉTAPE 2 / 3");
        assert_eq!(update.step, Some(1));
        assert_eq!(update.total, Some(3));

        let update = extract_progress("x — step 4/4");
        assert_eq!(update.step, Some(3));
    }

    #[test]
    fn test_no_dash_has_no_title() {
        let update = extract_progress("You are on Step 2/6 of the flow");
        assert_eq!(update.title, None);
        assert_eq!(update.step, Some(1));
        assert_eq!(update.total, Some(6));
    }

    #[test]
    fn test_pattern_before_dash_is_ignored() {
        let update = extract_progress("Step 2/6 — continue");
        assert!(update.is_empty());
    }

    #[test]
    fn test_no_pattern() {
        assert!(extract_progress("Hello! How can I help?").is_empty());
        assert!(extract_progress("Invoices — list").is_empty());
        assert!(extract_progress("").is_empty());
    }

    #[test]
    fn test_step_and_total_floors() {
        let update = extract_progress("Flow — Step 0/0");
        assert_eq!(update.step, Some(0));
        assert_eq!(update.total, Some(1));
    }

    #[test]
    fn test_empty_title_is_absent() {
        let update = extract_progress("*** — Step 1/2");
        assert_eq!(update.title, None);
        assert_eq!(update.total, Some(2));
    }

    #[test]
    fn test_custom_step_index() {
        assert_eq!(custom_step_index(&json!({"step_index": 3})), Some(3));
        assert_eq!(custom_step_index(&json!({"step_index": "3"})), None);
        assert_eq!(custom_step_index(&json!({"step_index": -1})), None);
        assert_eq!(custom_step_index(&json!({"other": 1})), None);
        assert_eq!(custom_step_index(&json!([1, 2])), None);
    }

    #[test]
    fn test_chips_follow_fixed_order() {
        let chips = classify_chips("Select the PO, then click Continue.");
        assert_eq!(chips, vec![ChipTag::Click, ChipTag::Select]);
    }

    #[test]
    fn test_chips_french_and_distinct() {
        let chips = classify_chips("Cliquer sur Suivant, puis cliquer encore et SOUMETTRE.");
        assert_eq!(chips, vec![ChipTag::Click, ChipTag::Next, ChipTag::Submit]);
    }

    #[test]
    fn test_chip_labels() {
        assert_eq!(ChipTag::Attach.label(Lang::Fr), "Joindre");
        assert_eq!(ChipTag::Enter.label(Lang::En), "Enter");
        assert!(classify_chips("Nothing to do here").is_empty());
    }
}
