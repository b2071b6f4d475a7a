//! Weak learners: candidate split sampling and selection.
//!
//! A weak learner owns the randomized part of node splitting. The trainer
//! only ever asks it for the capability set below:
//!
//! - [`WeakLearner::create_statistics`]: fresh node statistics
//! - [`WeakLearner::sample_split_points`]: a [`SplitCandidates`] pool
//! - [`WeakLearner::compute_split_statistics`]: left/right histograms for
//!   every candidate, in one pass over the node's samples
//! - [`WeakLearner::find_best_split`]: the information-gain maximizer
//!
//! [`image::ImageWeakLearner`] is the pixel-difference implementation.

pub mod image;

use rand::Rng;

use crate::forest::{PixelPairFeature, SplitPoint};
use crate::sampling::{PixelSample, SampleSet};
use crate::statistics::{HistogramFactory, HistogramStatistics};

// ============================================================================
// SplitCandidates
// ============================================================================

/// An ordered pool of candidate features, each with its ordered thresholds.
///
/// Candidates are addressed two ways: by feature index (the unit of
/// parallel work) and by flat candidate index `(feature, threshold)` in
/// feature-major order (the unit of selection).
#[derive(Debug, Clone)]
pub struct SplitCandidates {
    features: Vec<(PixelPairFeature, Vec<f64>)>,
    offsets: Vec<usize>,
}

impl Default for SplitCandidates {
    fn default() -> Self {
        Self::new()
    }
}

impl SplitCandidates {
    /// Empty pool.
    pub fn new() -> Self {
        Self {
            features: Vec::new(),
            offsets: vec![0],
        }
    }

    /// Append a feature and its thresholds.
    pub fn push(&mut self, feature: PixelPairFeature, thresholds: Vec<f64>) {
        let next = self.total() + thresholds.len();
        self.features.push((feature, thresholds));
        self.offsets.push(next);
    }

    /// Number of candidate features.
    #[inline]
    pub fn num_features(&self) -> usize {
        self.features.len()
    }

    /// Total number of `(feature, threshold)` candidates.
    #[inline]
    pub fn total(&self) -> usize {
        self.offsets[self.features.len()]
    }

    /// Feature and thresholds at feature index `index`.
    #[inline]
    pub fn feature(&self, index: usize) -> (&PixelPairFeature, &[f64]) {
        let (feature, thresholds) = &self.features[index];
        (feature, thresholds)
    }

    /// Flat candidate offset of the first threshold of feature `index`.
    /// `index` may equal `num_features()` to address the end of the table.
    #[inline]
    pub fn offset(&self, index: usize) -> usize {
        self.offsets[index]
    }

    /// Materialize the split point behind a flat candidate index.
    ///
    /// # Panics
    /// Panics if `candidate >= total()`.
    pub fn split_point(&self, candidate: usize) -> SplitPoint {
        let feature_index = self.offsets.partition_point(|&offset| offset <= candidate) - 1;
        let threshold_index = candidate - self.offsets[feature_index];
        let (feature, thresholds) = &self.features[feature_index];
        SplitPoint::new(*feature, thresholds[threshold_index])
    }
}

// ============================================================================
// SplitStatistics
// ============================================================================

/// Left/right child histograms for every candidate of one node.
///
/// Both tables are laid out in flat candidate order, matching
/// [`SplitCandidates`]; a contiguous feature range therefore owns a
/// contiguous region of each table, which is what makes the
/// feature-parallel accumulation lock-free.
#[derive(Debug, Clone, PartialEq)]
pub struct SplitStatistics {
    left: Vec<HistogramStatistics>,
    right: Vec<HistogramStatistics>,
}

impl SplitStatistics {
    /// Preallocate zeroed tables for `total` candidates.
    pub fn new(total: usize, factory: &HistogramFactory) -> Self {
        Self {
            left: (0..total).map(|_| factory.create()).collect(),
            right: (0..total).map(|_| factory.create()).collect(),
        }
    }

    /// Number of candidates covered.
    #[inline]
    pub fn len(&self) -> usize {
        self.left.len()
    }

    /// Whether the table is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    /// Left child histogram of a candidate.
    #[inline]
    pub fn left(&self, candidate: usize) -> &HistogramStatistics {
        &self.left[candidate]
    }

    /// Right child histogram of a candidate.
    #[inline]
    pub fn right(&self, candidate: usize) -> &HistogramStatistics {
        &self.right[candidate]
    }

    /// Both tables, for partitioning into disjoint worker regions.
    pub(crate) fn tables_mut(
        &mut self,
    ) -> (&mut [HistogramStatistics], &mut [HistogramStatistics]) {
        (&mut self.left, &mut self.right)
    }

    /// Finalize lazy accumulation across both tables.
    pub fn finish_lazy_accumulation(&mut self) {
        for stats in self.left.iter_mut().chain(self.right.iter_mut()) {
            stats.finish_lazy_accumulation();
        }
    }
}

// ============================================================================
// BestSplit
// ============================================================================

/// The selected candidate and its bookkeeping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BestSplit {
    /// Flat candidate index into the pool it was selected from.
    pub index: usize,
    /// Information gain of the selected candidate.
    pub gain: f64,
    /// Samples reaching the node.
    pub num_samples: u32,
    /// Samples routed to the left child.
    pub left_num_samples: u32,
    /// Samples routed to the right child.
    pub right_num_samples: u32,
}

// ============================================================================
// WeakLearner
// ============================================================================

/// The randomized split machinery the level trainer is generic over.
pub trait WeakLearner {
    /// Fresh, zeroed node statistics.
    fn create_statistics(&self) -> HistogramStatistics;

    /// Sample a candidate pool for a node with the given samples.
    fn sample_split_points<R: Rng>(
        &self,
        set: &SampleSet,
        samples: &[PixelSample],
        rng: &mut R,
    ) -> SplitCandidates;

    /// Accumulate left/right child statistics for every candidate.
    ///
    /// Implementations parallelize over features: workers own contiguous
    /// feature ranges and therefore contiguous table regions, draw no
    /// random numbers, and produce bit-identical tables for every
    /// `num_threads ≥ 1`.
    fn compute_split_statistics(
        &self,
        set: &SampleSet,
        samples: &[PixelSample],
        candidates: &SplitCandidates,
        num_threads: usize,
    ) -> SplitStatistics;

    /// Select the candidate maximizing information gain
    /// `G = H(parent) − [N_L·H(L) + N_R·H(R)] / N`.
    ///
    /// Ties break to the lowest flat candidate index. Returns `None` when
    /// the parent is empty or there are no candidates.
    fn find_best_split(
        &self,
        parent: &HistogramStatistics,
        statistics: &SplitStatistics,
    ) -> Option<BestSplit> {
        let total = parent.num_samples();
        if total == 0 || statistics.is_empty() {
            return None;
        }

        let parent_entropy = parent.entropy();
        let mut best_index = 0;
        let mut best_gain = f64::NEG_INFINITY;
        for candidate in 0..statistics.len() {
            let left = statistics.left(candidate);
            let right = statistics.right(candidate);
            let children = left.num_samples() as f64 * left.entropy()
                + right.num_samples() as f64 * right.entropy();
            let gain = parent_entropy - children / total as f64;
            if gain > best_gain {
                best_gain = gain;
                best_index = candidate;
            }
        }

        Some(BestSplit {
            index: best_index,
            gain: best_gain,
            num_samples: total,
            left_num_samples: statistics.left(best_index).num_samples(),
            right_num_samples: statistics.right(best_index).num_samples(),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn feature(dx1: i16) -> PixelPairFeature {
        PixelPairFeature::new(dx1, 0, 0, 0)
    }

    #[test]
    fn test_candidates_indexing() {
        let mut candidates = SplitCandidates::new();
        candidates.push(feature(1), vec![0.5, 1.5]);
        candidates.push(feature(2), vec![-0.5]);
        candidates.push(feature(3), vec![2.0, 3.0, 4.0]);

        assert_eq!(candidates.num_features(), 3);
        assert_eq!(candidates.total(), 6);
        assert_eq!(candidates.offset(0), 0);
        assert_eq!(candidates.offset(1), 2);
        assert_eq!(candidates.offset(2), 3);
        assert_eq!(candidates.offset(3), 6);

        let split = candidates.split_point(0);
        assert_eq!((split.dx1, split.threshold), (1, 0.5));
        let split = candidates.split_point(2);
        assert_eq!((split.dx1, split.threshold), (2, -0.5));
        let split = candidates.split_point(5);
        assert_eq!((split.dx1, split.threshold), (3, 4.0));
    }

    #[test]
    #[should_panic]
    fn test_candidates_split_point_out_of_range() {
        let mut candidates = SplitCandidates::new();
        candidates.push(feature(1), vec![0.5]);
        candidates.split_point(1);
    }

    #[test]
    fn test_split_statistics_tables() {
        let factory = HistogramFactory::new(2);
        let mut statistics = SplitStatistics::new(3, &factory);
        assert_eq!(statistics.len(), 3);

        {
            let (left, right) = statistics.tables_mut();
            left[0].accumulate_lazy(0);
            left[0].accumulate_lazy(1);
            right[2].accumulate_lazy(1);
        }
        statistics.finish_lazy_accumulation();

        assert_eq!(statistics.left(0).num_samples(), 2);
        assert_eq!(statistics.right(2).num_samples(), 1);
        assert_eq!(statistics.left(1).num_samples(), 0);
    }

    /// Minimal learner exposing only the provided selection logic.
    struct SelectionOnly;

    impl WeakLearner for SelectionOnly {
        fn create_statistics(&self) -> HistogramStatistics {
            HistogramStatistics::new(2)
        }
        fn sample_split_points<R: Rng>(
            &self,
            _set: &SampleSet,
            _samples: &[PixelSample],
            _rng: &mut R,
        ) -> SplitCandidates {
            SplitCandidates::new()
        }
        fn compute_split_statistics(
            &self,
            _set: &SampleSet,
            _samples: &[PixelSample],
            _candidates: &SplitCandidates,
            _num_threads: usize,
        ) -> SplitStatistics {
            SplitStatistics::new(0, &HistogramFactory::new(2))
        }
    }

    fn histogram(counts: &[u32]) -> HistogramStatistics {
        let mut stats = HistogramStatistics::new(counts.len());
        for (class, &count) in counts.iter().enumerate() {
            for _ in 0..count {
                stats.accumulate(class as i16);
            }
        }
        stats
    }

    fn statistics_from(pairs: &[(&[u32], &[u32])]) -> SplitStatistics {
        let factory = HistogramFactory::new(pairs[0].0.len());
        let mut statistics = SplitStatistics::new(pairs.len(), &factory);
        {
            let (left, right) = statistics.tables_mut();
            for (candidate, (l, r)) in pairs.iter().enumerate() {
                left[candidate] = histogram(l);
                right[candidate] = histogram(r);
            }
        }
        statistics
    }

    #[test]
    fn test_find_best_split_prefers_separating_candidate() {
        let parent = histogram(&[4, 4]);
        // Candidate 0 separates perfectly, candidate 1 not at all.
        let statistics = statistics_from(&[(&[4, 0], &[0, 4]), (&[2, 2], &[2, 2])]);

        let learner = SelectionOnly;
        let best = learner.find_best_split(&parent, &statistics).unwrap();
        assert_eq!(best.index, 0);
        assert_eq!(best.gain, 1.0);
        assert_eq!(best.num_samples, 8);
        assert_eq!(best.left_num_samples, 4);
        assert_eq!(best.right_num_samples, 4);
    }

    #[test]
    fn test_find_best_split_gain_non_negative() {
        let parent = histogram(&[3, 5]);
        let statistics = statistics_from(&[(&[1, 2], &[2, 3]), (&[0, 5], &[3, 0]), (&[3, 5], &[0, 0])]);

        let learner = SelectionOnly;
        let best = learner.find_best_split(&parent, &statistics).unwrap();
        assert!(best.gain >= 0.0);
    }

    #[test]
    fn test_find_best_split_ties_break_to_lowest_index() {
        let parent = histogram(&[2, 2]);
        // Identical candidates: the first must win.
        let statistics = statistics_from(&[(&[2, 0], &[0, 2]), (&[2, 0], &[0, 2])]);

        let learner = SelectionOnly;
        let best = learner.find_best_split(&parent, &statistics).unwrap();
        assert_eq!(best.index, 0);
    }

    #[test]
    fn test_find_best_split_empty_parent_is_none() {
        let parent = histogram(&[0, 0]);
        let statistics = statistics_from(&[(&[0, 0], &[0, 0])]);

        let learner = SelectionOnly;
        assert!(learner.find_best_split(&parent, &statistics).is_none());
    }
}
