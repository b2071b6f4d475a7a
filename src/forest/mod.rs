//! Trees, forests, and the split points they carry.

mod split;
mod tree;

pub use split::{Direction, PixelPairFeature, SplitPoint};
pub use tree::{NodeEntry, Tree};

use serde::{Deserialize, Serialize};

// ============================================================================
// Forest
// ============================================================================

/// An ordered ensemble of independently trained trees.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    trees: Vec<Tree>,
}

impl Forest {
    /// Create an empty forest.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a trained tree.
    pub fn push(&mut self, tree: Tree) {
        self.trees.push(tree);
    }

    /// Number of trees.
    #[inline]
    pub fn len(&self) -> usize {
        self.trees.len()
    }

    /// Whether the forest holds no trees.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trees.is_empty()
    }

    /// Access a tree by index.
    #[inline]
    pub fn tree(&self, index: usize) -> &Tree {
        &self.trees[index]
    }

    /// Iterate over the trees in training order.
    pub fn trees(&self) -> impl Iterator<Item = &Tree> {
        self.trees.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forest_push_and_access() {
        let mut forest = Forest::new();
        assert!(forest.is_empty());

        forest.push(Tree::with_depth(1));
        forest.push(Tree::with_depth(2));

        assert_eq!(forest.len(), 2);
        assert_eq!(forest.tree(0).depth(), 1);
        assert_eq!(forest.tree(1).depth(), 2);
        assert_eq!(forest.trees().count(), 2);
    }

    #[test]
    fn test_forest_serde_round_trip() {
        let mut forest = Forest::new();
        forest.push(Tree::with_depth(2));

        let json = serde_json::to_string(&forest).unwrap();
        let restored: Forest = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, forest);
    }
}
