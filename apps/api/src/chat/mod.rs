//! Unified chat: one `resolve` call regardless of which backend answers.
//!
//! The model-backed assistant is tried first when this deployment has one;
//! otherwise (or when it yields nothing) the configured fallback answers.

pub mod handlers;

use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::assistant::{AssistantStatus, ModelAssistant};
use crate::intent::IntentResolver;
use crate::models::message::{Backend, ConversationMessage};

/// Shown instead of a rule-based answer under `FallbackPolicy::Apology`.
pub const APOLOGY: &str =
    "Sorry, the AI model is not available. Please ensure the model is downloaded and try again.";

/// What answers when the model-backed assistant is enabled but cannot answer.
/// Deployments without an inference runtime always use the rule-based resolver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    #[default]
    RuleBased,
    Apology,
}

impl FromStr for FallbackPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rules" | "rule_based" => Ok(FallbackPolicy::RuleBased),
            "apology" => Ok(FallbackPolicy::Apology),
            other => Err(format!(
                "unknown chat fallback '{other}' (expected 'rules' or 'apology')"
            )),
        }
    }
}

/// A question and its answer, as the chat UI appends them.
#[derive(Debug, Clone, Serialize)]
pub struct ChatTurn {
    pub question: ConversationMessage,
    pub answer: ConversationMessage,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatStatus {
    pub model_enabled: bool,
    pub fallback: FallbackPolicy,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assistant: Option<AssistantStatus>,
}

pub struct ChatService {
    intents: Arc<IntentResolver>,
    assistant: Option<Arc<ModelAssistant>>,
    fallback: FallbackPolicy,
}

impl ChatService {
    pub fn new(
        intents: Arc<IntentResolver>,
        assistant: Option<Arc<ModelAssistant>>,
        fallback: FallbackPolicy,
    ) -> Self {
        Self {
            intents,
            assistant,
            fallback,
        }
    }

    /// Rule-based chat only.
    pub fn rules_only(intents: Arc<IntentResolver>) -> Self {
        Self::new(intents, None, FallbackPolicy::RuleBased)
    }

    fn enabled_assistant(&self) -> Option<&ModelAssistant> {
        self.assistant
            .as_deref()
            .filter(|assistant| assistant.is_enabled())
    }

    /// Answers `question`. Never fails and never returns empty text.
    pub async fn resolve(&self, question: &str) -> ConversationMessage {
        let Some(assistant) = self.enabled_assistant() else {
            return self.rule_based(question);
        };

        if let Some(text) = assistant.answer(question).await {
            return ConversationMessage::assistant(text, Backend::Model, None);
        }

        debug!(fallback = ?self.fallback, "Model could not answer; using fallback");
        match self.fallback {
            FallbackPolicy::RuleBased => self.rule_based(question),
            FallbackPolicy::Apology => ConversationMessage::assistant(APOLOGY, Backend::Apology, None),
        }
    }

    pub async fn turn(&self, question: &str) -> ChatTurn {
        let asked = ConversationMessage::user(question);
        let answer = self.resolve(question).await;
        ChatTurn {
            question: asked,
            answer,
        }
    }

    pub async fn status(&self) -> ChatStatus {
        let assistant = match self.enabled_assistant() {
            Some(assistant) => Some(assistant.status().await),
            None => None,
        };
        ChatStatus {
            model_enabled: assistant.is_some(),
            fallback: self.fallback,
            assistant,
        }
    }

    /// Loads the model ahead of the first question. `false` when this
    /// deployment has no model or it could not be loaded.
    pub async fn warm_up(&self) -> bool {
        match self.enabled_assistant() {
            Some(assistant) => assistant.initialize().await,
            None => false,
        }
    }

    /// Frees the model context, if any. Rule-based chat keeps working.
    pub async fn release(&self) {
        if let Some(assistant) = &self.assistant {
            assistant.release().await;
        }
    }

    fn rule_based(&self, question: &str) -> ConversationMessage {
        let resolution = self.intents.resolve_with_intent(question);
        debug!(intent = ?resolution.intent, "Answered with rules");
        ConversationMessage::assistant(resolution.text, Backend::Rules, Some(resolution.intent))
    }
}
