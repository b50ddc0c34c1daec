//! Mind-Memory Library
//!
//! Long-term memory subsystem for conversational agents. Two tracks sit
//! orthogonal to the short-term context window:
//!
//! - an **episodic knowledge graph** of past turns and extracted
//!   entities/relations, reached through the [`graph::GraphAdapter`]
//!   capability, and
//! - a persistent first-person **story** ([`story::StoryFile`]) injected
//!   into the agent's system prompt every turn.
//!
//! Per turn, the [`resonance::ResonancePipeline`] retrieves topically
//! relevant past memories, filters out what the live context already
//! covers, and rewrites the rest into first-person flashbacks. In the
//! background, the [`narrative::ConsolidationEngine`] batches finished
//! turns into the story, compressing it when it outgrows its budget and
//! coordinating with concurrent agent processes through a lock file.
//!
//! [`subsystem::MindMemory`] is the facade an agent runtime embeds; no
//! error escapes its methods.

pub mod completion;
pub mod config;
pub mod constants;
pub mod errors;
pub mod graph;
pub mod narrative;
pub mod pending;
pub mod resonance;
pub mod story;
pub mod subsystem;
pub mod text;
pub mod timeline;
pub mod tracing_setup;
pub mod types;

// Re-export dependencies so tests and embedding hosts use the same versions
pub use chrono;
pub use parking_lot;
pub use uuid;

pub use config::MemoryConfig;
pub use errors::{MemoryError, Result};
pub use resonance::TurnContext;
pub use subsystem::{MindMemory, TurnMemory};
pub use types::{ChatMessage, ChatRole, IdentityBundle};
