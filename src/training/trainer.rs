//! Level-synchronous tree growing and forest orchestration.
//!
//! Trees grow breadth-first, one level per pass over the bag: routing
//! assigns every sample to its frontier node, the weak learner scores
//! candidate splits for each frontier node, and accepted splits rewrite
//! the tree before the next level starts. [`ForestTrainer`] repeats this
//! per tree, drawing a fresh bag each time.
//!
//! # Example
//!
//! ```ignore
//! use canopy::learner::image::{ImageLearnerParams, ImageWeakLearner};
//! use canopy::sink::NullSink;
//! use canopy::statistics::HistogramFactory;
//! use canopy::training::{ForestTrainer, TrainingParams};
//!
//! let learner = ImageWeakLearner::new(
//!     ImageLearnerParams::default(),
//!     HistogramFactory::new(num_classes),
//! )?;
//! let trainer = ForestTrainer::new(learner, TrainingParams::default());
//! let forest = trainer.train(&mut provider, &mut NullSink)?;
//! ```

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::ThreadPoolBuilder;

use crate::error::TrainError;
use crate::forest::{Forest, Tree};
use crate::image::ImageSource;
use crate::learner::{SplitCandidates, SplitStatistics, WeakLearner};
use crate::sampling::{PixelSample, SampleProvider, SampleSet};
use crate::sink::ForestSink;
use crate::statistics::HistogramStatistics;

use super::logger::{TrainingLogger, Verbosity};

// ============================================================================
// TrainingParams
// ============================================================================

/// Parameters of forest training.
///
/// Use struct construction with `..Default::default()` for convenient
/// configuration.
#[derive(Debug, Clone)]
pub struct TrainingParams {
    /// Number of trees in the forest.
    pub num_trees: usize,
    /// Maximum tree depth; the root sits at depth 0.
    pub tree_depth: usize,
    /// A node splits only if it holds at least this many samples.
    pub min_num_samples: u32,
    /// A node splits only if the best gain reaches this value.
    pub min_information_gain: f64,
    /// Frontier window size per level; 0 processes whole levels at once.
    /// Windows cap the number of candidate tables alive at a time once
    /// the frontier grows to `2^d` nodes.
    pub level_part_size: usize,
    /// Worker threads for split statistics.
    ///
    /// - `<= 0`: hardware parallelism (a default-sized pool)
    /// - `1`: strictly sequential, no pool
    /// - `n > 1`: a dedicated pool with `n` threads
    ///
    /// The trained forest is identical for every setting.
    pub num_threads: i32,
    /// Random seed.
    pub seed: u64,
    /// Progress output level.
    pub verbosity: Verbosity,
}

impl Default for TrainingParams {
    fn default() -> Self {
        Self {
            num_trees: 3,
            tree_depth: 12,
            min_num_samples: 100,
            min_information_gain: 0.0,
            level_part_size: 0,
            num_threads: -1,
            seed: 42,
            verbosity: Verbosity::default(),
        }
    }
}

impl TrainingParams {
    /// Check the parameters before training starts.
    pub fn validate(&self) -> Result<(), TrainError> {
        if self.num_trees == 0 {
            return Err(TrainError::Config(
                "num_trees must be at least 1".to_string(),
            ));
        }
        if self.tree_depth == 0 {
            return Err(TrainError::Config(
                "tree_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// ============================================================================
// LevelTreeTrainer
// ============================================================================

/// Grows one tree breadth-first to its maximum depth.
pub struct LevelTreeTrainer<'a, W: WeakLearner> {
    learner: &'a W,
    params: &'a TrainingParams,
    num_threads: usize,
}

impl<'a, W: WeakLearner> LevelTreeTrainer<'a, W> {
    /// A level trainer sharing the forest trainer's learner and params.
    pub fn new(learner: &'a W, params: &'a TrainingParams, num_threads: usize) -> Self {
        Self {
            learner,
            params,
            num_threads,
        }
    }

    /// Train one tree over the samples of `set`.
    pub fn train_tree<R: Rng, K: ForestSink>(
        &self,
        set: &SampleSet,
        rng: &mut R,
        sink: &mut K,
        tree_index: usize,
        logger: &TrainingLogger,
    ) -> Tree {
        let mut tree = Tree::with_depth(self.params.tree_depth);
        for depth in 0..=self.params.tree_depth {
            self.train_level(&mut tree, depth, set, rng, logger);
            sink.tree_level_complete(tree_index, depth, &tree);
        }
        tree
    }

    fn train_level<R: Rng>(
        &self,
        tree: &mut Tree,
        depth: usize,
        set: &SampleSet,
        rng: &mut R,
        logger: &TrainingLogger,
    ) {
        let range = Tree::level_range(depth);
        let level_start = range.start;

        // Route every sample to its frontier node. A sample stopping at a
        // committed leaf above the frontier drops out of this level.
        let mut buckets: Vec<Vec<PixelSample>> = vec![Vec::new(); range.len()];
        let mut routed = 0usize;
        for &sample in set.samples() {
            let node = tree.route(set, sample);
            if range.contains(&node) {
                buckets[node - level_start].push(sample);
                routed += 1;
            }
        }

        // The active frontier: the root, or children of committed splits.
        let active: Vec<usize> = range
            .clone()
            .filter(|&node| node == 0 || tree.node((node - 1) / 2).split().is_some())
            .collect();
        logger.start_level(depth, active.len(), routed);

        let window_size = if self.params.level_part_size > 0 {
            self.params.level_part_size
        } else {
            active.len().max(1)
        };
        for (window_index, window) in active.chunks(window_size).enumerate() {
            logger.level_window(window_index, window.len());
            self.train_window(tree, depth, window, &buckets, level_start, set, rng);
        }
    }

    /// Run the per-node pipeline for one frontier window, each phase
    /// batched across the window's nodes.
    fn train_window<R: Rng>(
        &self,
        tree: &mut Tree,
        depth: usize,
        window: &[usize],
        buckets: &[Vec<PixelSample>],
        level_start: usize,
        set: &SampleSet,
        rng: &mut R,
    ) {
        // Phase 1: node statistics. Empty nodes keep an empty histogram
        // and simply stay leaves.
        let node_stats: Vec<HistogramStatistics> = window
            .iter()
            .map(|&node| {
                let mut stats = self.learner.create_statistics();
                stats.accumulate_all(
                    buckets[node - level_start].iter().map(|&s| set.label(s)),
                );
                stats
            })
            .collect();

        // Phases 2-4 run only below the terminal depth.
        if depth < self.params.tree_depth {
            let splittable: Vec<usize> = (0..window.len())
                .filter(|&slot| !buckets[window[slot] - level_start].is_empty())
                .collect();

            // Phase 2: candidate sampling. All random draws happen here,
            // on this thread, in window order.
            let candidates: Vec<SplitCandidates> = splittable
                .iter()
                .map(|&slot| {
                    self.learner.sample_split_points(
                        set,
                        &buckets[window[slot] - level_start],
                        rng,
                    )
                })
                .collect();

            // Phase 3: split statistics, feature-parallel per node.
            let split_stats: Vec<SplitStatistics> = splittable
                .iter()
                .zip(&candidates)
                .map(|(&slot, node_candidates)| {
                    self.learner.compute_split_statistics(
                        set,
                        &buckets[window[slot] - level_start],
                        node_candidates,
                        self.num_threads,
                    )
                })
                .collect();

            // Phase 4: selection and commit. A best split below the gain
            // or sample floor leaves the node terminal with no children.
            for ((&slot, node_candidates), statistics) in
                splittable.iter().zip(&candidates).zip(&split_stats)
            {
                if let Some(best) = self.learner.find_best_split(&node_stats[slot], statistics) {
                    let accepted = best.gain > 0.0
                        && best.gain >= self.params.min_information_gain
                        && best.num_samples >= self.params.min_num_samples;
                    if accepted {
                        tree.commit_split(window[slot], node_candidates.split_point(best.index));
                    }
                }
            }
        }

        for (slot, stats) in node_stats.into_iter().enumerate() {
            tree.set_statistics(window[slot], stats);
        }
    }
}

// ============================================================================
// ForestTrainer
// ============================================================================

/// Trains `num_trees` independent trees, one bag each.
pub struct ForestTrainer<W: WeakLearner> {
    learner: W,
    params: TrainingParams,
}

impl<W: WeakLearner> ForestTrainer<W> {
    /// Create a forest trainer.
    pub fn new(learner: W, params: TrainingParams) -> Self {
        Self { learner, params }
    }

    /// The training parameters.
    pub fn params(&self) -> &TrainingParams {
        &self.params
    }

    /// The weak learner.
    pub fn learner(&self) -> &W {
        &self.learner
    }

    /// Train a forest from bags drawn through `provider`.
    ///
    /// Validates all configuration up front, then installs the worker
    /// pool dictated by `num_threads` for the whole run.
    pub fn train<S, K>(
        &self,
        provider: &mut SampleProvider<S>,
        sink: &mut K,
    ) -> Result<Forest, TrainError>
    where
        W: Sync,
        S: ImageSource + Send,
        K: ForestSink + Send,
    {
        self.params.validate()?;
        provider.params().validate()?;

        match self.params.num_threads {
            1 => self.train_impl(provider, sink, 1),
            n => {
                let mut builder = ThreadPoolBuilder::new();
                if n > 1 {
                    builder = builder.num_threads(n as usize);
                }
                let pool = builder.build().map_err(|err| {
                    TrainError::Resource(format!("failed to create worker pool: {}", err))
                })?;
                let num_threads = pool.current_num_threads();
                pool.install(|| self.train_impl(provider, sink, num_threads))
            }
        }
    }

    fn train_impl<S: ImageSource, K: ForestSink>(
        &self,
        provider: &mut SampleProvider<S>,
        sink: &mut K,
        num_threads: usize,
    ) -> Result<Forest, TrainError> {
        let logger = TrainingLogger::new(self.params.verbosity);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(self.params.seed);
        let level_trainer = LevelTreeTrainer::new(&self.learner, &self.params, num_threads);

        logger.start_training(self.params.num_trees);
        let mut forest = Forest::new();
        for tree_index in 0..self.params.num_trees {
            let set = provider.load_bag(&mut rng)?;
            logger.start_tree(tree_index, set.num_samples());
            let tree = level_trainer.train_tree(&set, &mut rng, sink, tree_index, &logger);
            forest.push(tree);
            sink.tree_complete(&forest);
        }
        logger.finish_training(forest.len());

        Ok(forest)
    }
}

// ============================================================================
// Tests
// ============================================================================
