//! The story file: first-person narrative with a high-water mark
//!
//! `STORY.md` starts with `<!-- LAST_PROCESSED: <iso> -->`, the anchor up
//! to which past turns have been narrated. The header is authoritative;
//! file mtime is only a fallback for legacy files. Writes are crash-safe
//! (tmp + rename) and the anchor never moves backwards.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

use crate::errors::Result;
use crate::timeline::parse_flexible;

lazy_static! {
    static ref ANCHOR_HEADER: Regex =
        Regex::new(r"<!--\s*LAST_PROCESSED:\s*([^>]*?)\s*-->").expect("anchor header regex");
}

/// In-memory view of the story file
#[derive(Debug, Clone, Default)]
pub struct Story {
    /// Narrative body with all anchor comments stripped
    pub body: String,

    /// Parsed high-water mark, when one exists
    pub last_processed: Option<DateTime<Utc>>,
}

impl Story {
    /// A story whose stripped body is empty has never been written
    pub fn is_new(&self) -> bool {
        self.body.trim().is_empty()
    }

    /// Effective anchor for filtering: parsed mark or the epoch
    pub fn anchor(&self) -> DateTime<Utc> {
        self.last_processed.unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }
}

/// Handle on the story file with anchored read/write semantics
#[derive(Debug, Clone)]
pub struct StoryFile {
    path: PathBuf,
}

impl StoryFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the story; a missing or unreadable file is a new story
    pub fn load(&self) -> Story {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(_) => return Story::default(),
        };

        let last_processed = ANCHOR_HEADER
            .captures(&raw)
            .and_then(|caps| parse_flexible(caps[1].trim()))
            .or_else(|| self.mtime_fallback());

        let body = ANCHOR_HEADER.replace_all(&raw, "").trim().to_string();

        Story {
            body,
            last_processed,
        }
    }

    /// Persist a narrative body anchored at `anchor`
    ///
    /// Any anchor comments inside the generated body are stripped, a fresh
    /// header is prepended, and the write goes through tmp + rename. A
    /// parseable on-disk anchor newer than `anchor` wins: the mark is
    /// monotonically non-decreasing across consolidations.
    pub fn write(&self, body: &str, anchor: DateTime<Utc>) -> Result<()> {
        let mut anchor = anchor;
        if let Some(existing) = self.load().last_processed {
            if existing > anchor {
                warn!(
                    existing = %existing.to_rfc3339(),
                    proposed = %anchor.to_rfc3339(),
                    "story anchor would regress, keeping existing mark"
                );
                anchor = existing;
            }
        }

        let clean_body = ANCHOR_HEADER.replace_all(body, "").trim().to_string();
        let content = format!(
            "<!-- LAST_PROCESSED: {} -->\n\n{}\n",
            anchor.to_rfc3339(),
            clean_body
        );

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("md.tmp");
        fs::write(&tmp, content)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }

    fn mtime_fallback(&self) -> Option<DateTime<Utc>> {
        fs::metadata(&self.path)
            .and_then(|meta| meta.modified())
            .ok()
            .map(DateTime::<Utc>::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn at(iso: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(iso)
            .expect("test timestamp")
            .with_timezone(&Utc)
    }

    fn setup() -> (StoryFile, TempDir) {
        let dir = TempDir::new().expect("tempdir");
        (StoryFile::new(dir.path().join("STORY.md")), dir)
    }

    #[test]
    fn test_missing_file_is_new() {
        let (story_file, _dir) = setup();
        let story = story_file.load();
        assert!(story.is_new());
        assert_eq!(story.last_processed, None);
    }

    #[test]
    fn test_write_read_round_trip() {
        let (story_file, _dir) = setup();
        let anchor = at("2026-02-01T10:00:00Z");
        story_file
            .write("### [2026-02-01 10:00] A chapter\n\nI remember it well.", anchor)
            .unwrap();

        let story = story_file.load();
        assert!(!story.is_new());
        assert_eq!(story.last_processed, Some(anchor));
        assert!(story.body.starts_with("### [2026-02-01 10:00]"));
        assert!(!story.body.contains("LAST_PROCESSED"));
    }

    #[test]
    fn test_stale_headers_stripped_from_body() {
        let (story_file, _dir) = setup();
        let body = "<!-- LAST_PROCESSED: 2020-01-01T00:00:00Z -->\nI went on.";
        story_file.write(body, at("2026-02-01T10:00:00Z")).unwrap();

        let raw = fs::read_to_string(story_file.path()).unwrap();
        assert_eq!(raw.matches("LAST_PROCESSED").count(), 1);
        assert!(raw.starts_with("<!-- LAST_PROCESSED: 2026-02-01T10:00:00"));
    }

    #[test]
    fn test_anchor_never_regresses() {
        let (story_file, _dir) = setup();
        story_file.write("later events", at("2026-03-01T00:00:00Z")).unwrap();
        story_file.write("replayed batch", at("2026-01-01T00:00:00Z")).unwrap();

        let story = story_file.load();
        assert_eq!(story.last_processed, Some(at("2026-03-01T00:00:00Z")));
        assert!(story.body.contains("replayed batch"));
    }

    #[test]
    fn test_header_only_file_is_new() {
        let (story_file, _dir) = setup();
        fs::write(
            story_file.path(),
            "<!-- LAST_PROCESSED: 2026-01-01T00:00:00Z -->\n\n   \n",
        )
        .unwrap();

        let story = story_file.load();
        assert!(story.is_new());
        assert_eq!(story.last_processed, Some(at("2026-01-01T00:00:00Z")));
    }

    #[test]
    fn test_mtime_fallback_for_legacy_files() {
        let (story_file, _dir) = setup();
        fs::write(story_file.path(), "legacy story with no header").unwrap();

        let story = story_file.load();
        assert!(!story.is_new());
        // mtime fallback: some recent timestamp, not the epoch
        assert!(story.last_processed.is_some());
    }
}
