//! Shared types crossing the subsystem's seams

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who authored a live chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    User,
    Assistant,
    System,
}

/// One message of the live session transcript
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn new(role: ChatRole, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: None,
        }
    }
}

/// Persona plus ongoing story, injected verbatim into subconscious prompts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdentityBundle {
    /// Stable persona description ("SOUL")
    pub soul: String,

    /// Current story body ("STORY")
    pub story: String,
}

impl IdentityBundle {
    pub fn new(soul: impl Into<String>, story: impl Into<String>) -> Self {
        Self {
            soul: soul.into(),
            story: story.into(),
        }
    }
}
