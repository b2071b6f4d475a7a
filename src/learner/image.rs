//! The pixel-difference weak learner.
//!
//! Features compare two offset-addressed pixel reads; thresholds come
//! from a fixed range, from the node's own data range, or from the fixed
//! binary-image pair `{−0.5, +0.5}`. The statistics pass is parallelized
//! over features: the candidate tables are preallocated, each worker owns
//! a contiguous feature range and with it a contiguous region of both
//! tables, so no synchronization is needed and the result is independent
//! of the thread count.

use rand::Rng;

use crate::error::TrainError;
use crate::forest::PixelPairFeature;
use crate::image::Offset;
use crate::sampling::{PixelSample, SampleSet};
use crate::statistics::{HistogramFactory, HistogramStatistics};

use super::{SplitCandidates, SplitStatistics, WeakLearner};

// ============================================================================
// ImageLearnerParams
// ============================================================================

/// Parameters of the pixel-difference weak learner.
///
/// Use struct construction with `..Default::default()` for convenient
/// configuration.
#[derive(Debug, Clone)]
pub struct ImageLearnerParams {
    /// Candidate features sampled per node split.
    pub num_features: usize,
    /// Thresholds sampled per feature (ignored for binary images).
    pub num_thresholds: usize,
    /// Offsets in x are drawn from `±[low, high]`.
    pub offset_x_range: (Offset, Offset),
    /// Offsets in y are drawn from `±[low, high]`.
    pub offset_y_range: (Offset, Offset),
    /// Default threshold sampling range for continuous pixels.
    pub threshold_range: (f64, f64),
    /// Derive the threshold range per feature from the node's data.
    pub adaptive_threshold_range: bool,
    /// Pixels take values in `{0, 1}`: emit exactly the thresholds
    /// `−0.5` and `+0.5` and ignore the three settings above. The half
    /// thresholds keep the split stable under both `<` and `<=`.
    pub binary_images: bool,
}

impl Default for ImageLearnerParams {
    fn default() -> Self {
        Self {
            num_features: 400,
            num_thresholds: 100,
            offset_x_range: (0, 15),
            offset_y_range: (0, 15),
            threshold_range: (-300.0, 300.0),
            adaptive_threshold_range: true,
            binary_images: true,
        }
    }
}

impl ImageLearnerParams {
    /// Check the parameters before training starts.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.num_features == 0 {
            return Err(TrainError::Config(
                "num_features must be at least 1".to_string(),
            ));
        }
        for (name, range) in [
            ("offset_x_range", self.offset_x_range),
            ("offset_y_range", self.offset_y_range),
        ] {
            if range.0 < 0 || range.0 > range.1 {
                return Err(TrainError::Config(format!(
                    "{} must satisfy 0 <= low <= high, got {:?}",
                    name, range
                )));
            }
        }
        if !self.binary_images {
            if self.num_thresholds == 0 {
                return Err(TrainError::Config(
                    "num_thresholds must be at least 1".to_string(),
                ));
            }
            if self.threshold_range.0 > self.threshold_range.1 {
                return Err(TrainError::Config(format!(
                    "threshold_range must satisfy low <= high, got {:?}",
                    self.threshold_range
                )));
            }
        }
        Ok(())
    }
}

/// The symmetric offset set `{−high,…,−low} ∪ {low,…,high}`, each value
/// once.
fn offset_pool(range: (Offset, Offset)) -> Vec<Offset> {
    let mut offsets = Vec::new();
    for offset in range.0..=range.1 {
        if offset == 0 {
            offsets.push(0);
        } else {
            offsets.push(-offset);
            offsets.push(offset);
        }
    }
    offsets
}

// ============================================================================
// ImageWeakLearner
// ============================================================================

/// Randomized pixel-difference split sampler and evaluator.
#[derive(Debug, Clone)]
pub struct ImageWeakLearner {
    params: ImageLearnerParams,
    factory: HistogramFactory,
    offsets_x: Vec<Offset>,
    offsets_y: Vec<Offset>,
}

impl ImageWeakLearner {
    /// Create a learner, validating its parameters.
    pub fn new(params: ImageLearnerParams, factory: HistogramFactory) -> Result<Self, TrainError> {
        params.validate()?;
        let offsets_x = offset_pool(params.offset_x_range);
        let offsets_y = offset_pool(params.offset_y_range);
        Ok(Self {
            params,
            factory,
            offsets_x,
            offsets_y,
        })
    }

    /// The learner's parameters.
    pub fn params(&self) -> &ImageLearnerParams {
        &self.params
    }

    /// Feature-value range over the node's samples; collapses to
    /// `[0, 0]` when the feature is constant (or the node is empty).
    fn adaptive_range(
        &self,
        set: &SampleSet,
        samples: &[PixelSample],
        feature: &PixelPairFeature,
    ) -> (f64, f64) {
        let mut min_value = f64::INFINITY;
        let mut max_value = f64::NEG_INFINITY;
        for &sample in samples {
            let value = feature.value(set.image(sample.image), sample.x, sample.y);
            if value < min_value {
                min_value = value;
            }
            if value > max_value {
                max_value = value;
            }
        }
        if min_value >= max_value {
            (0.0, 0.0)
        } else {
            (min_value, max_value)
        }
    }
}

impl WeakLearner for ImageWeakLearner {
    fn create_statistics(&self) -> HistogramStatistics {
        self.factory.create()
    }

    fn sample_split_points<R: Rng>(
        &self,
        set: &SampleSet,
        samples: &[PixelSample],
        rng: &mut R,
    ) -> SplitCandidates {
        let mut candidates = SplitCandidates::new();
        for _ in 0..self.params.num_features {
            let dx1 = self.offsets_x[rng.gen_range(0..self.offsets_x.len())];
            let dy1 = self.offsets_y[rng.gen_range(0..self.offsets_y.len())];
            let dx2 = self.offsets_x[rng.gen_range(0..self.offsets_x.len())];
            let dy2 = self.offsets_y[rng.gen_range(0..self.offsets_y.len())];
            let feature = PixelPairFeature::new(dx1, dy1, dx2, dy2);

            let thresholds = if self.params.binary_images {
                vec![-0.5, 0.5]
            } else {
                let (low, high) = if self.params.adaptive_threshold_range {
                    self.adaptive_range(set, samples, &feature)
                } else {
                    self.params.threshold_range
                };
                (0..self.params.num_thresholds)
                    .map(|_| if high > low { rng.gen_range(low..high) } else { low })
                    .collect()
            };
            candidates.push(feature, thresholds);
        }
        candidates
    }

    fn compute_split_statistics(
        &self,
        set: &SampleSet,
        samples: &[PixelSample],
        candidates: &SplitCandidates,
        num_threads: usize,
    ) -> SplitStatistics {
        let mut statistics = SplitStatistics::new(candidates.total(), &self.factory);
        let num_features = candidates.num_features();
        let threads = num_threads.clamp(1, num_features.max(1));

        if threads <= 1 {
            let (left, right) = statistics.tables_mut();
            for index in 0..num_features {
                let (feature, thresholds) = candidates.feature(index);
                let lo = candidates.offset(index);
                let hi = lo + thresholds.len();
                accumulate_feature(
                    set,
                    samples,
                    feature,
                    thresholds,
                    &mut left[lo..hi],
                    &mut right[lo..hi],
                );
            }
        } else {
            // Feature ranges are contiguous, so each worker's table region
            // is a prefix of what remains; peel it off with split_at_mut.
            let (left_table, right_table) = statistics.tables_mut();
            rayon::scope(|scope| {
                let mut left_rest = left_table;
                let mut right_rest = right_table;
                for thread in 0..threads {
                    let begin = thread * num_features / threads;
                    let end = (thread + 1) * num_features / threads;
                    let take = candidates.offset(end) - candidates.offset(begin);
                    let (left_chunk, left_tail) = left_rest.split_at_mut(take);
                    let (right_chunk, right_tail) = right_rest.split_at_mut(take);
                    left_rest = left_tail;
                    right_rest = right_tail;
                    if begin == end {
                        continue;
                    }
                    scope.spawn(move |_| {
                        let mut cursor = 0;
                        for index in begin..end {
                            let (feature, thresholds) = candidates.feature(index);
                            let len = thresholds.len();
                            accumulate_feature(
                                set,
                                samples,
                                feature,
                                thresholds,
                                &mut left_chunk[cursor..cursor + len],
                                &mut right_chunk[cursor..cursor + len],
                            );
                            cursor += len;
                        }
                    });
                }
            });
        }

        statistics.finish_lazy_accumulation();
        statistics
    }
}

/// Accumulate one feature's candidates over all samples.
///
/// The feature value is computed once per sample and compared against
/// every threshold; `value < threshold` feeds the left histogram.
fn accumulate_feature(
    set: &SampleSet,
    samples: &[PixelSample],
    feature: &PixelPairFeature,
    thresholds: &[f64],
    left: &mut [HistogramStatistics],
    right: &mut [HistogramStatistics],
) {
    for &sample in samples {
        let value = feature.value(set.image(sample.image), sample.x, sample.y);
        let label = set.label(sample);
        for (slot, &threshold) in thresholds.iter().enumerate() {
            if value < threshold {
                left[slot].accumulate_lazy(label);
            } else {
                right[slot].accumulate_lazy(label);
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
