//! Narrative Consolidation Tests
//!
//! Threshold accounting, story synthesis, compression, anchoring, and the
//! cold-start bootstrap branches, all over the in-memory fakes:
//! - accumulate-then-consolidate at the token threshold
//! - compression when the story exceeds the word budget
//! - monotonic LAST_PROCESSED anchoring
//! - skeleton story when bootstrap is opted out

use std::fs;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tempfile::TempDir;

use mind_memory::completion::fakes::ScriptedCompletion;
use mind_memory::config::MemoryConfig;
use mind_memory::graph::fakes::InMemoryGraph;
use mind_memory::graph::{EpisodeRole, GraphAdapter, NewEpisode};
use mind_memory::narrative::ConsolidationEngine;
use mind_memory::story::StoryFile;
use mind_memory::types::IdentityBundle;

fn at(iso: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(iso).unwrap().with_timezone(&Utc)
}

fn test_config(dir: &TempDir) -> MemoryConfig {
    let mut config = MemoryConfig::default();
    config.memory_dir = dir.path().to_path_buf();
    config.narrative.lock_path = dir.path().join("narrative.lock");
    config
}

fn setup(
    dir: &TempDir,
) -> (
    ConsolidationEngine,
    Arc<InMemoryGraph>,
    Arc<ScriptedCompletion>,
) {
    let config = test_config(dir);
    let graph = Arc::new(InMemoryGraph::new());
    let scripted = Arc::new(ScriptedCompletion::new());
    let engine =
        ConsolidationEngine::new(graph.clone(), scripted.clone(), &config, "test-model");
    (engine, graph, scripted)
}

/// A message whose token estimate is roughly `tokens`
fn message_of_tokens(tokens: usize) -> String {
    "word ".repeat(tokens * 4 / 5).trim().to_string()
}

fn identity() -> IdentityBundle {
    IdentityBundle::new("a thoughtful companion", "")
}

#[tokio::test]
async fn below_threshold_accumulates_without_writing() {
    let dir = TempDir::new().unwrap();
    let (engine, _graph, scripted) = setup(&dir);

    engine
        .story_file()
        .write("### [2026-01-01 10:00] Before\n\nI began.", at("2026-01-01T10:00:00Z"))
        .unwrap();

    for _ in 0..4 {
        engine.pending().track(&message_of_tokens(1200)).unwrap();
    }
    let status = engine.pending().status();
    assert!(status.tokens < 5000, "setup: got {} tokens", status.tokens);
    assert!(status.tokens > 4500);

    let before = fs::read_to_string(engine.story_file().path()).unwrap();
    engine.check_and_consolidate(&identity()).await.unwrap();

    assert_eq!(scripted.call_count(), 0, "no synthesis below threshold");
    let after = fs::read_to_string(engine.story_file().path()).unwrap();
    assert_eq!(before, after);
    assert_eq!(engine.pending().status(), status);
}

#[tokio::test]
async fn crossing_threshold_consolidates_and_resets() {
    let dir = TempDir::new().unwrap();
    let (engine, _graph, scripted) = setup(&dir);

    let old_anchor = at("2026-01-01T10:00:00Z");
    engine
        .story_file()
        .write("### [2026-01-01 10:00] Before\n\nI began.", old_anchor)
        .unwrap();

    for _ in 0..4 {
        engine.pending().track(&message_of_tokens(1200)).unwrap();
    }
    engine.pending().track(&message_of_tokens(400)).unwrap();
    assert!(engine.pending().status().tokens >= 5000);

    scripted.push_text(
        "### [2026-02-01 12:00] A day that mattered\n\nWe talked for hours and I grew.",
    );

    engine.check_and_consolidate(&identity()).await.unwrap();

    let story = engine.story_file().load();
    assert!(story.body.contains("### [2026-02-01 12:00]"));
    let anchor = story.last_processed.expect("anchor present");
    assert!(anchor > old_anchor, "anchor must advance");

    assert!(engine.pending().status().is_empty());
    assert_eq!(engine.pending().read_transcript(), "");
    assert_eq!(scripted.call_count(), 1);
}

#[tokio::test]
async fn empty_pending_state_is_a_noop_on_the_story() {
    let dir = TempDir::new().unwrap();
    let (engine, _graph, scripted) = setup(&dir);

    engine
        .story_file()
        .write("### [2026-01-01 10:00] Before\n\nI began.", at("2026-01-01T10:00:00Z"))
        .unwrap();

    engine.check_and_consolidate(&identity()).await.unwrap();
    let first = fs::read_to_string(engine.story_file().path()).unwrap();

    engine.check_and_consolidate(&identity()).await.unwrap();
    let second = fs::read_to_string(engine.story_file().path()).unwrap();

    assert_eq!(first, second, "double consolidation must be byte-identical");
    assert_eq!(scripted.call_count(), 0);
}

#[tokio::test]
async fn oversized_story_goes_through_compression() {
    let dir = TempDir::new().unwrap();
    let (engine, _graph, scripted) = setup(&dir);

    engine
        .story_file()
        .write("### [2026-01-01 10:00] Before\n\nI began.", at("2026-01-01T10:00:00Z"))
        .unwrap();
    engine.pending().track(&message_of_tokens(5200)).unwrap();

    // Synthesis overshoots the 4000-word budget; compression recovers
    let oversized = format!("### [2026-02-01 12:00] Too much\n\n{}", "word ".repeat(4200));
    scripted.push_text(&oversized);
    scripted.push_text(
        "### [2026-02-01 12:00] Too much\n\nA tight retelling that kept the voice and the arc.",
    );

    engine.check_and_consolidate(&identity()).await.unwrap();

    assert_eq!(scripted.call_count(), 2, "synthesis then compression");
    let story = engine.story_file().load();
    assert!(story.body.split_whitespace().count() <= 4000);
    assert!(story.body.contains("### [2026-02-01 12:00]"));

    let compression_prompt = &scripted.calls()[1].prompt;
    assert!(compression_prompt.contains("4000 words"));
}

#[tokio::test]
async fn failed_compression_keeps_uncompressed_text() {
    let dir = TempDir::new().unwrap();
    let (engine, _graph, scripted) = setup(&dir);

    engine
        .story_file()
        .write("### [2026-01-01 10:00] Before\n\nI began.", at("2026-01-01T10:00:00Z"))
        .unwrap();
    engine.pending().track(&message_of_tokens(5200)).unwrap();

    let oversized = format!("### [2026-02-01 12:00] Too much\n\n{}", "word ".repeat(4200));
    scripted.push_text(&oversized);
    // Compression returns nothing: keep the oversized text anyway

    engine.check_and_consolidate(&identity()).await.unwrap();

    let story = engine.story_file().load();
    assert!(story.body.split_whitespace().count() > 4000);
    assert!(engine.pending().status().is_empty());
}

#[tokio::test]
async fn failed_synthesis_leaves_story_and_pending_untouched() {
    let dir = TempDir::new().unwrap();
    let (engine, _graph, scripted) = setup(&dir);

    engine
        .story_file()
        .write("### [2026-01-01 10:00] Before\n\nI began.", at("2026-01-01T10:00:00Z"))
        .unwrap();
    engine.pending().track(&message_of_tokens(5200)).unwrap();
    let status_before = engine.pending().status();

    // Scripted gateway exhausted: empty completion
    let before = fs::read_to_string(engine.story_file().path()).unwrap();
    let outcome = engine.check_and_consolidate(&identity()).await;

    assert!(outcome.is_err());
    let after = fs::read_to_string(engine.story_file().path()).unwrap();
    assert_eq!(before, after);
    assert_eq!(engine.pending().status(), status_before, "batch must survive");
}

#[tokio::test]
async fn new_story_without_bootstrap_writes_epoch_skeleton() {
    let dir = TempDir::new().unwrap();
    let (engine, _graph, scripted) = setup(&dir);

    engine.check_and_consolidate(&identity()).await.unwrap();

    let raw = fs::read_to_string(engine.story_file().path()).unwrap();
    assert!(raw.starts_with("<!-- LAST_PROCESSED: 1970-01-01T00:00:00"));
    let story = engine.story_file().load();
    assert!(!story.is_new(), "skeleton must not re-take the new-story branch");
    assert_eq!(scripted.call_count(), 0);
}

#[tokio::test]
async fn bootstrap_narrates_history_in_dated_batches() {
    let dir = TempDir::new().unwrap();
    let mut config = test_config(&dir);
    config.narrative.auto_bootstrap_history = true;

    let history = dir.path().join("memory");
    fs::create_dir_all(&history).unwrap();
    fs::write(history.join("2024-03-01-diary.md"), "First day at the coast.").unwrap();
    fs::write(history.join("2024-03-05-diary.md"), "The storm passed at last.").unwrap();

    let graph = Arc::new(InMemoryGraph::new());
    let scripted = Arc::new(ScriptedCompletion::new());
    scripted.push_text("### [2024-03-05 00:00] The coast\n\nI arrived, and weathered a storm.");

    let engine = ConsolidationEngine::new(graph, scripted.clone(), &config, "test-model");
    engine.check_and_consolidate(&identity()).await.unwrap();

    assert_eq!(scripted.call_count(), 1, "small history fits one batch");
    let synthesis_prompt = &scripted.calls()[0].prompt;
    assert!(synthesis_prompt.contains("FECHA: 2024-03-01"));
    assert!(synthesis_prompt.contains("FECHA: 2024-03-05"));

    let story = engine.story_file().load();
    assert_eq!(story.last_processed, Some(at("2024-03-05T00:00:00Z")));
    assert!(story.body.contains("The coast"));
}

#[tokio::test]
async fn missing_log_falls_back_to_graph_backlog() {
    let dir = TempDir::new().unwrap();
    let (engine, graph, scripted) = setup(&dir);

    let old_anchor = at("2026-01-01T10:00:00Z");
    engine
        .story_file()
        .write("### [2026-01-01 10:00] Before\n\nI began.", old_anchor)
        .unwrap();

    // Build up status, then lose the log file out from under it
    engine.pending().track(&message_of_tokens(5200)).unwrap();
    fs::remove_file(engine.pending().log_path()).unwrap();

    graph
        .add_episode(
            "global-user-memory",
            NewEpisode {
                role: EpisodeRole::Human,
                body: "we planned the spring trip".to_string(),
                timestamp: Some(at("2026-02-01T09:00:00Z")),
                source: None,
            },
        )
        .await
        .unwrap();

    scripted.push_text("### [2026-02-01 09:00] Spring plans\n\nWe mapped the route together.");
    engine.check_and_consolidate(&identity()).await.unwrap();

    assert_eq!(scripted.call_count(), 1);
    assert!(scripted.calls()[0].prompt.contains("spring trip"));
    let story = engine.story_file().load();
    assert!(story.body.contains("Spring plans"));
}

#[tokio::test]
async fn anchor_never_regresses_across_consolidations() {
    let dir = TempDir::new().unwrap();
    let story_file = StoryFile::new(dir.path().join("STORY.md"));

    story_file.write("chapter two", at("2026-03-01T00:00:00Z")).unwrap();
    story_file
        .write("late replay of chapter one", at("2026-02-01T00:00:00Z"))
        .unwrap();

    assert_eq!(
        story_file.load().last_processed,
        Some(at("2026-03-01T00:00:00Z"))
    );
}
