//! Rule-based intent resolution: turns a free-text question into a canned,
//! profile-driven answer through an ordered `(trigger, responder)` table.
//!
//! Always available; the model-backed assistant falls back to it.

pub mod resolver;
pub mod rules;

use serde::{Deserialize, Serialize};

pub use resolver::{IntentResolver, Resolution};

/// Semantic category of a rule, in dispatch priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Greeting,
    Introduction,
    Experience,
    Skills,
    Projects,
    Education,
    Contact,
    Location,
    Availability,
    YearsOfExperience,
    Technology,
    Fallback,
}

/// Lower-cases and trims. No further sanitization.
pub fn normalize(question: &str) -> String {
    question.trim().to_lowercase()
}
