//! Documented constants for the memory subsystem
//!
//! This module contains all tunable parameters with justification for their values.
//! Centralizing constants prevents magic numbers and makes tuning easier.

// =============================================================================
// RESONANCE PIPELINE
// =============================================================================

/// Maximum seed queries extracted per turn
///
/// Three queries cover the usual spread of a conversational turn (topic,
/// named entity, open thread) without flooding the graph backend. More
/// queries mostly return overlapping results that the dedup pass discards.
pub const MAX_SEED_QUERIES: usize = 3;

/// Maximum memories accepted across all seed queries per turn
pub const MAX_RESONANT_MEMORIES: usize = 10;

/// Maximum bullets rendered per query group in the flashback block
pub const MAX_BULLETS_PER_GROUP: usize = 5;

/// Non-system turns of recent history handed to seed extraction
pub const RECENT_CONTEXT_TURNS: usize = 20;

/// Fallback seed length when extraction fails entirely
///
/// The first 50 characters of the cleaned prompt are almost always enough
/// for the graph's semantic search to land in the right neighborhood.
pub const SEED_FALLBACK_CHARS: usize = 50;

/// Capacity of the echo buffer (memory ids emitted in recent turns)
///
/// 25 ids is roughly two to three turns of full flashback output: enough to
/// stop back-to-back repetition without permanently burying a memory.
pub const ECHO_BUFFER_CAPACITY: usize = 25;

/// Length of the normalized near-duplicate key for rendered bullets
///
/// The first 30 lowercase alphanumeric characters distinguish genuinely
/// different memories while collapsing re-worded duplicates of one fact.
pub const DEDUP_KEY_CHARS: usize = 30;

/// Minimum repeated-window length the repetition truncator scans down to
///
/// Windows shorter than 3 significant chars match ordinary prose ("aa",
/// "on on") and would mangle valid output.
pub const MIN_REPETITION_WINDOW: usize = 3;

// =============================================================================
// NARRATIVE CONSOLIDATION
// =============================================================================

/// Pending-token threshold that triggers a consolidation pass
///
/// Roughly 15-20 conversational turns. Batching at this size gives the
/// narrative model enough material for a coherent chapter instead of a
/// line-by-line diary.
pub const DEFAULT_TOKEN_THRESHOLD: usize = 5_000;

/// Hard word budget for the consolidated story
///
/// Beyond 4000 words the story stops fitting comfortably alongside the
/// rest of the system prompt; the compression pass cuts back under this.
pub const STORY_WORD_LIMIT: usize = 4_000;

/// Age in seconds after which a narrative lock is considered stale
///
/// A healthy sync finishes well inside two minutes; anything older is a
/// crashed process whose lock may be stolen.
pub const LOCK_STALE_SECS: i64 = 120;

/// Session transcript files scanned during global narrative sync
pub const SESSION_SCAN_LIMIT: usize = 5;

/// Character budget requested from the narrative model per synthesis call
pub const STORY_CHAR_BUDGET: usize = 4_000;

// =============================================================================
// TOKEN ESTIMATION
// =============================================================================

/// Characters per token for threshold accounting
///
/// The standard ~4 chars/token heuristic. The estimate only gates a batch
/// trigger, so it does not need tokenizer fidelity.
pub const CHARS_PER_TOKEN: usize = 4;
