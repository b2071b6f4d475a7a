//! Training progress output.

use std::fmt;

// ============================================================================
// Verbosity
// ============================================================================

/// How much progress output training emits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord)]
pub enum Verbosity {
    /// No output.
    Silent,
    /// Per-tree and per-level progress.
    #[default]
    Info,
    /// Additionally per-window detail.
    Debug,
}

impl fmt::Display for Verbosity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Silent => write!(f, "Silent"),
            Self::Info => write!(f, "Info"),
            Self::Debug => write!(f, "Debug"),
        }
    }
}

// ============================================================================
// TrainingLogger
// ============================================================================

/// Writes progress lines to stderr, gated by [`Verbosity`].
#[derive(Debug, Clone, Copy)]
pub struct TrainingLogger {
    verbosity: Verbosity,
}

impl TrainingLogger {
    /// Create a logger for the given verbosity.
    pub fn new(verbosity: Verbosity) -> Self {
        Self { verbosity }
    }

    pub fn start_training(&self, num_trees: usize) {
        if self.verbosity >= Verbosity::Info {
            eprintln!("Training forest: {} trees", num_trees);
        }
    }

    pub fn start_tree(&self, tree_index: usize, num_samples: usize) {
        if self.verbosity >= Verbosity::Info {
            eprintln!("Training tree {}: {} samples", tree_index, num_samples);
        }
    }

    pub fn start_level(&self, depth: usize, num_nodes: usize, num_samples: usize) {
        if self.verbosity >= Verbosity::Info {
            eprintln!(
                "  Level {}: {} nodes, {} samples",
                depth, num_nodes, num_samples
            );
        }
    }

    pub fn level_window(&self, window_index: usize, num_nodes: usize) {
        if self.verbosity >= Verbosity::Debug {
            eprintln!("    Window {}: {} nodes", window_index, num_nodes);
        }
    }

    pub fn finish_training(&self, num_trees: usize) {
        if self.verbosity >= Verbosity::Info {
            eprintln!("Done: {} trees trained", num_trees);
        }
    }
}
