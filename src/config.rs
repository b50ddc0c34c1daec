//! Configuration management for mind-memory
//!
//! All configurable parameters in one place with environment variable overrides.
//! Follows the principle: sensible defaults, configurable in production.

use std::env;
use std::path::PathBuf;
use tracing::info;

use crate::constants::{DEFAULT_TOKEN_THRESHOLD, LOCK_STALE_SECS};

/// Narrative (story consolidation) configuration
#[derive(Debug, Clone)]
pub struct NarrativeConfig {
    /// Gate for story consolidation and injection (default: true)
    pub enabled: bool,

    /// Pending-token threshold that triggers consolidation (default: 5000)
    pub token_threshold: usize,

    /// Story file name inside the memory workspace (default: STORY.md)
    pub story_filename: String,

    /// Cold-start narrativization of historical daily logs (default: false)
    pub auto_bootstrap_history: bool,

    /// Token budget per synthesis batch, typically half the model context
    pub safe_token_limit: usize,

    /// Cross-process narrative lock file
    pub lock_path: PathBuf,

    /// Seconds after which a foreign lock is considered stale
    pub lock_stale_secs: i64,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token_threshold: DEFAULT_TOKEN_THRESHOLD,
            story_filename: "STORY.md".to_string(),
            auto_bootstrap_history: false,
            safe_token_limit: 50_000,
            lock_path: env::temp_dir().join("mind_narrative_sync.lock"),
            lock_stale_secs: LOCK_STALE_SECS,
        }
    }
}

impl NarrativeConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("MIND_NARRATIVE_ENABLED") {
            config.enabled = parse_bool(&val);
        }

        if let Ok(val) = env::var("MIND_NARRATIVE_THRESHOLD") {
            if let Ok(n) = val.parse() {
                config.token_threshold = n;
            }
        }

        if let Ok(val) = env::var("MIND_STORY_FILENAME") {
            if !val.trim().is_empty() {
                config.story_filename = val;
            }
        }

        if let Ok(val) = env::var("MIND_AUTO_BOOTSTRAP_HISTORY") {
            config.auto_bootstrap_history = parse_bool(&val);
        }

        if let Ok(val) = env::var("MIND_SAFE_TOKEN_LIMIT") {
            if let Ok(n) = val.parse() {
                config.safe_token_limit = n;
            }
        }

        if let Ok(val) = env::var("MIND_NARRATIVE_LOCK") {
            config.lock_path = PathBuf::from(val);
        }

        config
    }
}

/// Completion endpoint configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// OpenAI-compatible base URL (default: http://localhost:11434)
    pub base_url: String,

    /// Bearer token, when the endpoint wants one
    pub api_key: Option<String>,

    /// Model used for subconscious calls
    pub model: String,

    /// Fallback model for the one-shot failover retry
    pub fallback_model: Option<String>,
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:11434".to_string(),
            api_key: None,
            model: "qwen2.5:7b".to_string(),
            fallback_model: None,
        }
    }
}

impl CompletionConfig {
    /// Load from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("MIND_COMPLETION_URL") {
            config.base_url = val.trim_end_matches('/').to_string();
        }
        if let Ok(val) = env::var("MIND_COMPLETION_API_KEY") {
            if !val.trim().is_empty() {
                config.api_key = Some(val);
            }
        }
        if let Ok(val) = env::var("MIND_COMPLETION_MODEL") {
            if !val.trim().is_empty() {
                config.model = val;
            }
        }
        if let Ok(val) = env::var("MIND_FALLBACK_MODEL") {
            if !val.trim().is_empty() {
                config.fallback_model = Some(val);
            }
        }

        config
    }
}

/// Subsystem configuration loaded from environment with defaults
#[derive(Debug, Clone)]
pub struct MemoryConfig {
    /// Base URL the graph adapter is pointed at (default: http://localhost:8000)
    pub graphiti_base_url: String,

    /// Logical identity scope grouping all episodes and the story
    pub identity_scope: String,

    /// Memory workspace directory: story, pending log, historical files
    pub memory_dir: PathBuf,

    /// Bypass the resonance pipeline, retaining story injection only
    pub skip_resonance: bool,

    /// Enable verbose logs to standard error
    pub debug: bool,

    /// Narrative consolidation settings
    pub narrative: NarrativeConfig,

    /// Completion endpoint settings
    pub completion: CompletionConfig,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            graphiti_base_url: "http://localhost:8000".to_string(),
            identity_scope: "global-user-memory".to_string(),
            memory_dir: PathBuf::from("."),
            skip_resonance: false,
            debug: false,
            narrative: NarrativeConfig::default(),
            completion: CompletionConfig::default(),
        }
    }
}

impl MemoryConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(val) = env::var("MIND_GRAPHITI_URL") {
            config.graphiti_base_url = val.trim_end_matches('/').to_string();
        }

        if let Ok(val) = env::var("MIND_IDENTITY_SCOPE") {
            if !val.trim().is_empty() {
                config.identity_scope = val;
            }
        }

        if let Ok(val) = env::var("MIND_MEMORY_DIR") {
            config.memory_dir = PathBuf::from(val);
        }

        if let Ok(val) = env::var("MIND_SKIP_RESONANCE") {
            config.skip_resonance = parse_bool(&val);
        }

        if let Ok(val) = env::var("MIND_DEBUG") {
            config.debug = parse_bool(&val);
        }

        config.narrative = NarrativeConfig::from_env();
        config.completion = CompletionConfig::from_env();

        config
    }

    /// Path of the canonical story file
    pub fn story_path(&self) -> PathBuf {
        self.memory_dir.join(&self.narrative.story_filename)
    }

    /// Directory of historical daily logs (`YYYY-MM-DD*.md`)
    pub fn history_dir(&self) -> PathBuf {
        self.memory_dir.join("memory")
    }

    /// One-shot flag written after historical graph ingest
    pub fn bootstrap_flag_path(&self) -> PathBuf {
        self.memory_dir.join(".graphiti-bootstrap-done")
    }

    /// Log the current configuration
    pub fn log(&self) {
        info!("Memory subsystem configuration:");
        info!("   Graph URL: {}", self.graphiti_base_url);
        info!("   Identity scope: {}", self.identity_scope);
        info!("   Memory dir: {:?}", self.memory_dir);
        info!(
            "   Narrative: {} (threshold: {} tokens, story: {})",
            if self.narrative.enabled { "enabled" } else { "disabled" },
            self.narrative.token_threshold,
            self.narrative.story_filename
        );
        info!(
            "   Bootstrap history: {}",
            self.narrative.auto_bootstrap_history
        );
        if self.skip_resonance {
            info!("   Resonance: SKIPPED (MIND_SKIP_RESONANCE)");
        }
    }
}

fn parse_bool(val: &str) -> bool {
    let v = val.trim().to_lowercase();
    v == "1" || v == "true" || v == "yes" || v == "on"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MemoryConfig::default();
        assert_eq!(config.identity_scope, "global-user-memory");
        assert_eq!(config.narrative.token_threshold, 5000);
        assert_eq!(config.narrative.story_filename, "STORY.md");
        assert!(!config.skip_resonance);
    }

    #[test]
    fn test_env_override() {
        env::set_var("MIND_NARRATIVE_THRESHOLD", "1234");
        env::set_var("MIND_SKIP_RESONANCE", "1");

        let config = MemoryConfig::from_env();
        assert_eq!(config.narrative.token_threshold, 1234);
        assert!(config.skip_resonance);

        env::remove_var("MIND_NARRATIVE_THRESHOLD");
        env::remove_var("MIND_SKIP_RESONANCE");
    }

    #[test]
    fn test_derived_paths() {
        let mut config = MemoryConfig::default();
        config.memory_dir = PathBuf::from("/ws");
        assert_eq!(config.story_path(), PathBuf::from("/ws/STORY.md"));
        assert_eq!(config.history_dir(), PathBuf::from("/ws/memory"));
        assert_eq!(
            config.bootstrap_flag_path(),
            PathBuf::from("/ws/.graphiti-bootstrap-done")
        );
    }

    #[test]
    fn test_parse_bool_variants() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(parse_bool("yes"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool("off"));
    }
}
