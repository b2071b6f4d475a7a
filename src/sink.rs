//! Checkpoint sinks for partially trained forests.
//!
//! Training hands every completed tree level and every completed tree to
//! a [`ForestSink`] so an orchestrator can persist progress. Sinks are
//! best-effort by contract: nothing in training depends on their result,
//! and [`FileCheckpointSink`] logs write failures instead of surfacing
//! them.

use std::fs;
use std::path::{Path, PathBuf};

use crate::forest::{Forest, Tree};

// ============================================================================
// ForestSink
// ============================================================================

/// Receives training checkpoints.
pub trait ForestSink {
    /// Called after each completed tree level with the partially grown
    /// tree.
    fn tree_level_complete(&mut self, tree_index: usize, depth: usize, tree: &Tree) {
        let _ = (tree_index, depth, tree);
    }

    /// Called after each completed tree with the forest grown so far.
    fn tree_complete(&mut self, forest: &Forest) {
        let _ = forest;
    }
}

/// Discards every checkpoint.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ForestSink for NullSink {}

// ============================================================================
// FileCheckpointSink
// ============================================================================

/// Writes checkpoints to files, JSON and binary independently.
///
/// JSON files are written when `json_prefix` is set, binary (postcard)
/// files when `binary_prefix` is set. The two formats are controlled by
/// separate knobs and either can be enabled without the other.
#[derive(Debug, Clone, Default)]
pub struct FileCheckpointSink {
    json_prefix: Option<PathBuf>,
    binary_prefix: Option<PathBuf>,
}

impl FileCheckpointSink {
    /// A sink with no outputs enabled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable JSON checkpoints under the given path prefix.
    pub fn with_json_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.json_prefix = Some(prefix.into());
        self
    }

    /// Enable binary checkpoints under the given path prefix.
    pub fn with_binary_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.binary_prefix = Some(prefix.into());
        self
    }

    fn write_all<T: serde::Serialize>(&self, suffix: &str, value: &T) {
        if let Some(prefix) = &self.json_prefix {
            let path = checkpoint_path(prefix, suffix, "json");
            match serde_json::to_vec(value) {
                Ok(bytes) => write_file(&path, &bytes),
                Err(err) => eprintln!("checkpoint: JSON encoding failed: {}", err),
            }
        }
        if let Some(prefix) = &self.binary_prefix {
            let path = checkpoint_path(prefix, suffix, "bin");
            match postcard::to_allocvec(value) {
                Ok(bytes) => write_file(&path, &bytes),
                Err(err) => eprintln!("checkpoint: binary encoding failed: {}", err),
            }
        }
    }
}

fn checkpoint_path(prefix: &Path, suffix: &str, extension: &str) -> PathBuf {
    let mut name = prefix.as_os_str().to_os_string();
    name.push(format!("_{}.{}", suffix, extension));
    PathBuf::from(name)
}

fn write_file(path: &Path, bytes: &[u8]) {
    if let Err(err) = fs::write(path, bytes) {
        eprintln!("checkpoint: writing {} failed: {}", path.display(), err);
    }
}

impl ForestSink for FileCheckpointSink {
    fn tree_level_complete(&mut self, tree_index: usize, depth: usize, tree: &Tree) {
        self.write_all(&format!("tree{}_level{}", tree_index, depth), tree);
    }

    fn tree_complete(&mut self, forest: &Forest) {
        self.write_all(&format!("forest{}", forest.len()), forest);
    }
}

// ============================================================================
// Tests
// ============================================================================
