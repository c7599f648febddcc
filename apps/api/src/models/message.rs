use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::intent::Intent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Assistant,
}

/// Which path produced an assistant message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Rules,
    Model,
    Apology,
}

/// A single chat turn. The ordered message log itself belongs to the chat UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<Backend>,
}

impl ConversationMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: Sender::User,
            text: text.into(),
            created_at: Utc::now(),
            intent: None,
            backend: None,
        }
    }

    pub fn assistant(text: impl Into<String>, backend: Backend, intent: Option<Intent>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender: Sender::Assistant,
            text: text.into(),
            created_at: Utc::now(),
            intent,
            backend: Some(backend),
        }
    }
}
