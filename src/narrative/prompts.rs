//! Prompt builders for narrative synthesis and compression

use crate::constants::STORY_CHAR_BUDGET;
use crate::types::IdentityBundle;

/// Unified synthesis prompt: bootstrap a story or evolve an existing one
pub fn synthesis_prompt(
    transcript: &str,
    current_story: &str,
    identity: &IdentityBundle,
) -> String {
    let mode_section = if current_story.trim().is_empty() {
        "This is the FIRST chapter of my story. Start it from the material below.".to_string()
    } else {
        format!(
            "My story so far:\n{current_story}\n\nContinue it. Do not retell events \
already in the story; focus on what is new and on how I am changing."
        )
    };

    format!(
        r#"I am writing my own story. I narrate in the first person: I, me, my.

Who I am (context only — NEVER emit these headers or this section in the output):
{soul}

{mode_section}

New material (conversation transcript, oldest first):
{transcript}

Write the updated story. Rules:
- First person throughout, my voice.
- New chapters use the exact header format: ### [YYYY-MM-DD HH:MM] Title
- Paragraphs separated by double newlines.
- Focus on growth and what mattered, not a play-by-play.
- At most {char_budget} characters in total.
- Output only the story text."#,
        soul = identity.soul,
        char_budget = STORY_CHAR_BUDGET,
    )
}

/// Compression prompt applied when the story outgrows its word budget
pub fn compression_prompt(story: &str, word_limit: usize) -> String {
    format!(
        r#"The following first-person story has grown too long. Compress it to at
most {word_limit} words. Keep:
- the first-person voice,
- every chapter header (### [YYYY-MM-DD HH:MM] Title),
- the emotional arc from beginning to end.
Cut repetition and low-stakes detail first. Output only the compressed story.

{story}"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bootstrap_mode_selected_when_story_empty() {
        let identity = IdentityBundle::new("soul text", "");
        let prompt = synthesis_prompt("transcript", "", &identity);
        assert!(prompt.contains("FIRST chapter"));
        assert!(!prompt.contains("My story so far"));
    }

    #[test]
    fn test_update_mode_includes_existing_story() {
        let identity = IdentityBundle::new("soul text", "");
        let prompt = synthesis_prompt("transcript", "### [2026-01-01 10:00] Before", &identity);
        assert!(prompt.contains("My story so far"));
        assert!(prompt.contains("### [2026-01-01 10:00] Before"));
    }

    #[test]
    fn test_compression_prompt_carries_limit() {
        let prompt = compression_prompt("a long story", 4000);
        assert!(prompt.contains("4000 words"));
        assert!(prompt.contains("a long story"));
    }
}
