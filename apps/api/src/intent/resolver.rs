use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::intent::rules::{default_rules, IntentRule, Trigger};
use crate::intent::{normalize, Intent};
use crate::models::profile::Profile;

/// The answer text together with the rule that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub intent: Intent,
    pub text: String,
}

/// Pure, synchronous resolver over the ordered rule table.
/// Total over all inputs: the last rule always matches.
pub struct IntentResolver {
    profile: Arc<Profile>,
    rules: Vec<IntentRule>,
}

impl IntentResolver {
    pub fn new(profile: Arc<Profile>) -> Result<Self, regex::Error> {
        let rules = default_rules(&profile)?;
        Ok(Self { profile, rules })
    }

    pub fn profile(&self) -> &Arc<Profile> {
        &self.profile
    }

    pub fn resolve(&self, question: &str) -> String {
        self.resolve_with_intent(question).text
    }

    /// First matching rule wins; later rules are never evaluated.
    pub fn resolve_with_intent(&self, question: &str) -> Resolution {
        let message = normalize(question);

        for rule in &self.rules {
            if let Some(matched) = rule.trigger.test(&message) {
                debug!(intent = ?rule.intent, "Intent rule matched");
                return Resolution {
                    intent: rule.intent,
                    text: (rule.respond)(&self.profile, matched),
                };
            }
        }

        // default_rules always ends with the unconditional fallback rule
        let text = self
            .rules
            .last()
            .map(|rule| (rule.respond)(&self.profile, &message))
            .unwrap_or_else(|| self.profile.about.clone());
        Resolution {
            intent: Intent::Fallback,
            text,
        }
    }

    /// Whether the normalized question triggers the greeting rule.
    pub fn is_greeting(&self, question: &str) -> bool {
        let message = normalize(question);
        self.rules
            .iter()
            .find(|r| r.intent == Intent::Greeting)
            .is_some_and(|r| r.trigger.test(&message).is_some())
    }

    /// The canned greeting, without running dispatch.
    #[cfg(test)]
    pub fn greeting(&self) -> String {
        self.rules
            .iter()
            .find(|r| r.intent == Intent::Greeting)
            .map(|r| (r.respond)(&self.profile, ""))
            .unwrap_or_else(|| self.resolve(""))
    }

    /// Intents in dispatch order.
    #[cfg(test)]
    pub fn priority(&self) -> Vec<Intent> {
        self.rules.iter().map(|r| r.intent).collect()
    }

    #[cfg(test)]
    pub fn has_unconditional_fallback(&self) -> bool {
        matches!(
            self.rules.last(),
            Some(IntentRule {
                intent: Intent::Fallback,
                trigger: Trigger::Always,
                ..
            })
        )
    }
}
