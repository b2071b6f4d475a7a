//! Class-count histograms and their entropy.
//!
//! [`HistogramStatistics`] is the statistic attached to every tree node and
//! to every split candidate: a fixed-length vector of per-class sample
//! counts. The split criterion only ever needs two queries on it, the
//! total sample count and the Shannon entropy.
//!
//! The hot accumulation loop in the weak learner touches millions of
//! histogram cells per node; `accumulate_lazy` defers maintaining the
//! cached total so that loop stays a single increment, with
//! `finish_lazy_accumulation` restoring the cache afterwards.

use serde::{Deserialize, Serialize};

use crate::image::Label;

// ============================================================================
// HistogramStatistics
// ============================================================================

/// Per-class sample counts with a cached total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistogramStatistics {
    counts: Vec<u32>,
    num_samples: u32,
}

impl HistogramStatistics {
    /// Zero-initialized histogram over `num_classes` classes.
    pub fn new(num_classes: usize) -> Self {
        Self {
            counts: vec![0; num_classes],
            num_samples: 0,
        }
    }

    /// Number of classes tracked by this histogram.
    #[inline]
    pub fn num_classes(&self) -> usize {
        self.counts.len()
    }

    /// Count for a single class.
    #[inline]
    pub fn count(&self, class: usize) -> u32 {
        self.counts[class]
    }

    /// Record one sample with the given label.
    #[inline]
    pub fn accumulate(&mut self, label: Label) {
        debug_assert!((0..self.counts.len() as i16).contains(&label));
        self.counts[label as usize] += 1;
        self.num_samples += 1;
    }

    /// Record one sample without updating the cached total.
    ///
    /// Callers must invoke [`finish_lazy_accumulation`] before reading
    /// `num_samples` or `entropy`.
    ///
    /// [`finish_lazy_accumulation`]: Self::finish_lazy_accumulation
    #[inline]
    pub fn accumulate_lazy(&mut self, label: Label) {
        debug_assert!((0..self.counts.len() as i16).contains(&label));
        self.counts[label as usize] += 1;
    }

    /// Restore the cached total after a run of lazy accumulation.
    pub fn finish_lazy_accumulation(&mut self) {
        self.num_samples = self.counts.iter().sum();
    }

    /// Record a batch of labels.
    pub fn accumulate_all<I: IntoIterator<Item = Label>>(&mut self, labels: I) {
        for label in labels {
            self.accumulate_lazy(label);
        }
        self.finish_lazy_accumulation();
    }

    /// Elementwise add of another histogram over the same classes.
    pub fn merge(&mut self, other: &Self) {
        debug_assert_eq!(self.counts.len(), other.counts.len());
        for (count, &extra) in self.counts.iter_mut().zip(&other.counts) {
            *count += extra;
        }
        self.num_samples += other.num_samples;
    }

    /// Total number of accumulated samples.
    #[inline]
    pub fn num_samples(&self) -> u32 {
        self.num_samples
    }

    /// Shannon entropy in bits: `−Σ (c/N)·log2(c/N)` over non-zero cells.
    ///
    /// Returns `0` for empty and for pure histograms.
    pub fn entropy(&self) -> f64 {
        if self.num_samples == 0 {
            return 0.0;
        }
        let total = self.num_samples as f64;
        let mut entropy = 0.0;
        for &count in &self.counts {
            if count > 0 {
                let p = count as f64 / total;
                entropy -= p * p.log2();
            }
        }
        entropy
    }

    /// Class with the highest count, or `None` for an empty histogram.
    /// Ties resolve to the lowest class index.
    pub fn most_frequent_class(&self) -> Option<usize> {
        if self.num_samples == 0 {
            return None;
        }
        let mut best = 0;
        for (class, &count) in self.counts.iter().enumerate() {
            if count > self.counts[best] {
                best = class;
            }
        }
        Some(best)
    }
}

// ============================================================================
// HistogramFactory
// ============================================================================

/// Creates zeroed histograms for a fixed class count.
///
/// The weak learner allocates thousands of histograms per node split; the
/// factory pins down the class count once instead of threading it through
/// every call site.
#[derive(Debug, Clone, Copy)]
pub struct HistogramFactory {
    num_classes: usize,
}

impl HistogramFactory {
    /// Factory for histograms over `num_classes` classes.
    pub fn new(num_classes: usize) -> Self {
        Self { num_classes }
    }

    /// Class count of the histograms this factory creates.
    #[inline]
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Create a zeroed histogram.
    #[inline]
    pub fn create(&self) -> HistogramStatistics {
        HistogramStatistics::new(self.num_classes)
    }
}

// ============================================================================
// Tests
// ============================================================================
