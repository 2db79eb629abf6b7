//! Intent classification types and conversation history.

use serde::{Deserialize, Serialize};

/// What the user is asking for, as judged by the classifier.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    Conversation,
    DataQuery,
    Unclear,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::Conversation => "conversation",
            Intent::DataQuery => "data_query",
            Intent::Unclear => "unclear",
        }
    }

    /// Lenient mapping for raw model output. Anything outside the known
    /// label set collapses to `Unclear`.
    pub fn from_label(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "conversation" => Intent::Conversation,
            "data_query" => Intent::DataQuery,
            _ => Intent::Unclear,
        }
    }
}

/// Raw classifier output, straight from the model's JSON.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntentSignal {
    pub intent: String,
    pub confidence: f64,
    #[serde(default)]
    pub reasoning: String,
}

/// Normalized classification: known label, confidence clamped to [0, 1].
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Classification {
    pub intent: Intent,
    pub confidence: f64,
    pub reasoning: String,
}

impl Classification {
    pub fn from_signal(signal: IntentSignal) -> Self {
        let confidence = if signal.confidence.is_nan() {
            0.0
        } else {
            signal.confidence.clamp(0.0, 1.0)
        };
        Self {
            intent: Intent::from_label(&signal.intent),
            confidence,
            reasoning: signal.reasoning,
        }
    }

    /// Classification used when the classifier itself faults. Zero confidence
    /// guarantees the run lands in clarification.
    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            intent: Intent::Unclear,
            confidence: 0.0,
            reasoning: reason.into(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One utterance in a session history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: TurnRole,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Assistant,
            content: content.into(),
        }
    }
}

/// Last `window` turns, oldest first. Prompts never see the full history.
pub fn recent_turns(history: &[Turn], window: usize) -> &[Turn] {
    let start = history.len().saturating_sub(window);
    &history[start..]
}
