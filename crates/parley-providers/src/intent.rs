//! Keyword-based intent classification.

use async_trait::async_trait;

use crate::traits::{Intent, IntentClassifier, IntentType};

/// Classifies messages by matching keyword lists in a fixed order.
///
/// The first matching rule wins, so the order of `RULES` matters:
/// approval wording is checked before document wording because
/// "approve the documents" is an approval.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeywordIntentClassifier;

struct Rule {
    intent: IntentType,
    keywords: &'static [&'static str],
    requires_execution: bool,
}

const RULES: &[Rule] = &[
    Rule {
        intent: IntentType::ApproveAction,
        keywords: &["approve", "sign off", "go ahead"],
        requires_execution: true,
    },
    Rule {
        intent: IntentType::CreateAcquisition,
        keywords: &["new acquisition", "create", "start", "generate"],
        requires_execution: true,
    },
    Rule {
        intent: IntentType::ModifyRequirements,
        keywords: &["change", "modify", "update", "edit requirement"],
        requires_execution: false,
    },
    Rule {
        intent: IntentType::ReviewDocuments,
        keywords: &["review", "document", "draft"],
        requires_execution: true,
    },
    Rule {
        intent: IntentType::CheckStatus,
        keywords: &["status", "progress", "compliance", "where are we"],
        requires_execution: true,
    },
];

impl KeywordIntentClassifier {
    pub fn new() -> Self {
        Self
    }

    /// Classify without going through the async trait.
    pub fn classify_text(&self, text: &str) -> Intent {
        let lower = text.to_lowercase();
        for rule in RULES {
            let hits = rule.keywords.iter().filter(|k| lower.contains(*k)).count();
            if hits > 0 {
                let confidence = (0.6 + 0.15 * hits as f32).min(0.95);
                return Intent::new(rule.intent, confidence, rule.requires_execution);
            }
        }
        Intent::new(IntentType::AskQuestion, 0.5, false)
    }
}

#[async_trait]
impl IntentClassifier for KeywordIntentClassifier {
    async fn classify(&self, text: &str) -> anyhow::Result<Intent> {
        Ok(self.classify_text(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_create() {
        let intent = KeywordIntentClassifier::new().classify_text("Create a new acquisition for laptops");
        assert_eq!(intent.intent_type, IntentType::CreateAcquisition);
        assert!(intent.requires_execution);
        assert!(intent.confidence > 0.6);
    }

    #[test]
    fn test_approval_wins_over_documents() {
        let intent = KeywordIntentClassifier::new().classify_text("Please approve the documents");
        assert_eq!(intent.intent_type, IntentType::ApproveAction);
    }

    #[test]
    fn test_unmatched_is_question() {
        let intent = KeywordIntentClassifier::new().classify_text("What is a CAGE code?");
        assert_eq!(intent.intent_type, IntentType::AskQuestion);
        assert!(!intent.requires_execution);
    }
}
