//! End-to-end training scenarios: invariants over trained forests,
//! serialization round trips, and determinism.

use std::sync::Arc;

use ndarray::Array2;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

use canopy::{
    Forest, ForestSink, ForestTrainer, HistogramFactory, Image, ImageLearnerParams,
    ImageWeakLearner, MemoryImageSource, NullSink, SampleParams, SampleProvider, SampleSet,
    TrainingParams, Tree, Verbosity,
};

// ============================================================================
// Fixtures
// ============================================================================

/// One 4x4 image with a linearly separable x-step labeling: pixel value
/// x*x, label 0 for x < 2 and 1 otherwise.
fn separable_provider() -> SampleProvider<MemoryImageSource> {
    let data = Array2::from_shape_fn((4, 4), |(x, _)| (x * x) as i16);
    let labels = Array2::from_shape_fn((4, 4), |(x, _)| if x < 2 { 0 } else { 1 });
    let image = Image::new(data, labels).unwrap();
    SampleProvider::new(
        MemoryImageSource::from_images(vec![image]),
        SampleParams {
            samples_per_image_fraction: 1.0,
            ..Default::default()
        },
    )
}

fn separable_learner() -> ImageWeakLearner {
    ImageWeakLearner::new(
        ImageLearnerParams {
            num_features: 100,
            num_thresholds: 50,
            offset_x_range: (0, 1),
            offset_y_range: (0, 0),
            binary_images: false,
            adaptive_threshold_range: true,
            ..Default::default()
        },
        HistogramFactory::new(2),
    )
    .unwrap()
}

/// An 8x8 binary image: two vertical stripes of 0/1 pixels, labels
/// following the stripes.
fn binary_provider() -> SampleProvider<MemoryImageSource> {
    let data = Array2::from_shape_fn((8, 8), |(x, _)| i16::from(x >= 4));
    let labels = Array2::from_shape_fn((8, 8), |(x, _)| i16::from(x >= 4));
    let image = Image::new(data, labels).unwrap();
    SampleProvider::new(
        MemoryImageSource::from_images(vec![image]),
        SampleParams {
            samples_per_image_fraction: 1.0,
            ..Default::default()
        },
    )
}

fn binary_learner() -> ImageWeakLearner {
    ImageWeakLearner::new(
        ImageLearnerParams {
            num_features: 64,
            offset_x_range: (0, 2),
            offset_y_range: (0, 2),
            binary_images: true,
            ..Default::default()
        },
        HistogramFactory::new(2),
    )
    .unwrap()
}

fn quiet(params: TrainingParams) -> TrainingParams {
    TrainingParams {
        verbosity: Verbosity::Silent,
        ..params
    }
}

fn full_sample_set(provider: &mut SampleProvider<MemoryImageSource>) -> SampleSet {
    let mut rng = Xoshiro256PlusPlus::seed_from_u64(0);
    provider.load_bag(&mut rng).unwrap()
}

/// Walk a trained tree and check its structural invariants: committed
/// splits partition their parent's samples, and every populated
/// histogram has entropy within `[0, log2(K)]`.
fn assert_tree_invariants(tree: &Tree, num_classes: usize) {
    let max_entropy = (num_classes as f64).log2() + 1e-9;
    for index in 0..tree.capacity() {
        let node = tree.node(index);
        if let Some(stats) = node.statistics() {
            assert!(stats.entropy() >= 0.0);
            assert!(stats.entropy() <= max_entropy);
        }
        if let Some(_split) = node.split() {
            assert!(!node.is_leaf(), "internal nodes are not leaves");
            let parent = node.statistics().expect("internal node has statistics");
            let left = tree
                .node(Tree::left_child(index))
                .statistics()
                .expect("left child has statistics");
            let right = tree
                .node(Tree::right_child(index))
                .statistics()
                .expect("right child has statistics");
            assert_eq!(
                parent.num_samples(),
                left.num_samples() + right.num_samples(),
                "child sample counts must add up to the parent's"
            );
        }
    }
}

// ============================================================================
// Scenario tests
// ============================================================================

#[test]
fn separable_image_reaches_zero_training_error() {
    let trainer = ForestTrainer::new(
        separable_learner(),
        quiet(TrainingParams {
            num_trees: 1,
            tree_depth: 2,
            min_num_samples: 1,
            num_threads: 1,
            ..Default::default()
        }),
    );
    let mut provider = separable_provider();
    let forest = trainer.train(&mut provider, &mut NullSink).unwrap();

    let tree = forest.tree(0);
    assert_tree_invariants(tree, 2);

    let set = full_sample_set(&mut provider);
    for &sample in set.samples() {
        let leaf = tree.route(&set, sample);
        let stats = tree.node(leaf).statistics().unwrap();
        assert_eq!(stats.entropy(), 0.0);
        assert_eq!(stats.most_frequent_class().unwrap() as i16, set.label(sample));
    }
}

#[test]
fn routed_samples_are_conserved_in_leaves() {
    let trainer = ForestTrainer::new(
        separable_learner(),
        quiet(TrainingParams {
            num_trees: 1,
            tree_depth: 4,
            min_num_samples: 1,
            num_threads: 1,
            ..Default::default()
        }),
    );
    let mut provider = separable_provider();
    let forest = trainer.train(&mut provider, &mut NullSink).unwrap();
    let tree = forest.tree(0);

    // With min_num_samples = 1 no sample terminates early, so the leaf
    // histograms must partition the full bag.
    let set = full_sample_set(&mut provider);
    let leaf_total: u32 = (0..tree.capacity())
        .filter(|&index| tree.node(index).is_leaf())
        .filter_map(|index| tree.node(index).statistics())
        .map(|stats| stats.num_samples())
        .sum();
    assert_eq!(leaf_total as usize, set.num_samples());
}

#[test]
fn binary_mode_commits_only_half_thresholds() {
    let trainer = ForestTrainer::new(
        binary_learner(),
        quiet(TrainingParams {
            num_trees: 1,
            tree_depth: 3,
            min_num_samples: 1,
            num_threads: 1,
            ..Default::default()
        }),
    );
    let mut provider = binary_provider();
    let forest = trainer.train(&mut provider, &mut NullSink).unwrap();

    let tree = forest.tree(0);
    assert_tree_invariants(tree, 2);

    let mut committed = 0;
    for index in 0..tree.capacity() {
        if let Some(split) = tree.node(index).split() {
            committed += 1;
            assert!(
                split.threshold == -0.5 || split.threshold == 0.5,
                "binary mode may only commit half thresholds, got {}",
                split.threshold
            );
        }
    }
    assert!(committed > 0, "the striped image must admit some split");
}

#[test]
fn forests_with_multiple_trees_satisfy_invariants() {
    let trainer = ForestTrainer::new(
        separable_learner(),
        quiet(TrainingParams {
            num_trees: 3,
            tree_depth: 3,
            min_num_samples: 1,
            num_threads: 1,
            ..Default::default()
        }),
    );
    let mut provider = separable_provider();
    let forest = trainer.train(&mut provider, &mut NullSink).unwrap();

    assert_eq!(forest.len(), 3);
    for tree in forest.trees() {
        assert_tree_invariants(tree, 2);
    }
}

// ============================================================================
// Determinism
// ============================================================================

#[test]
fn identical_runs_produce_identical_forests() {
    let run = || {
        let trainer = ForestTrainer::new(
            separable_learner(),
            quiet(TrainingParams {
                num_trees: 2,
                tree_depth: 3,
                min_num_samples: 1,
                num_threads: 1,
                ..Default::default()
            }),
        );
        let mut provider = separable_provider();
        trainer.train(&mut provider, &mut NullSink).unwrap()
    };

    assert_eq!(run(), run());
}

#[test]
fn thread_count_does_not_affect_the_forest() {
    let run = |num_threads| {
        let trainer = ForestTrainer::new(
            binary_learner(),
            quiet(TrainingParams {
                num_trees: 2,
                tree_depth: 4,
                min_num_samples: 1,
                num_threads,
                ..Default::default()
            }),
        );
        let mut provider = binary_provider();
        trainer.train(&mut provider, &mut NullSink).unwrap()
    };

    let reference = run(1);
    for threads in [2, 3, 8, -1] {
        assert_eq!(reference, run(threads));
    }
}

#[test]
fn different_seeds_draw_different_candidates() {
    let run = |seed| {
        let trainer = ForestTrainer::new(
            separable_learner(),
            quiet(TrainingParams {
                num_trees: 1,
                tree_depth: 2,
                min_num_samples: 1,
                num_threads: 1,
                seed,
                ..Default::default()
            }),
        );
        let mut provider = separable_provider();
        trainer.train(&mut provider, &mut NullSink).unwrap()
    };

    // Both trees classify perfectly, but the committed split points come
    // from different candidate pools.
    let a = run(42);
    let b = run(43);
    assert_ne!(
        a.tree(0).node(0).split(),
        b.tree(0).node(0).split()
    );
}

// ============================================================================
// Serialization round trips
// ============================================================================

#[test]
fn json_round_trip_preserves_routing() {
    let trainer = ForestTrainer::new(
        separable_learner(),
        quiet(TrainingParams {
            num_trees: 1,
            tree_depth: 3,
            min_num_samples: 1,
            num_threads: 1,
            ..Default::default()
        }),
    );
    let mut provider = separable_provider();
    let forest = trainer.train(&mut provider, &mut NullSink).unwrap();

    let json = serde_json::to_string(&forest).unwrap();
    let restored: Forest = serde_json::from_str(&json).unwrap();
    assert_eq!(restored, forest);

    let set = full_sample_set(&mut provider);
    let tree = forest.tree(0);
    let restored_tree = restored.tree(0);
    for &sample in set.samples() {
        assert_eq!(
            restored_tree.route(&set, sample),
            tree.route(&set, sample)
        );
    }
}

#[test]
fn binary_round_trip_preserves_histograms() {
    let trainer = ForestTrainer::new(
        binary_learner(),
        quiet(TrainingParams {
            num_trees: 1,
            tree_depth: 3,
            min_num_samples: 1,
            num_threads: 1,
            ..Default::default()
        }),
    );
    let mut provider = binary_provider();
    let forest = trainer.train(&mut provider, &mut NullSink).unwrap();

    let bytes = postcard::to_allocvec(&forest).unwrap();
    let restored: Forest = postcard::from_bytes(&bytes).unwrap();
    assert_eq!(restored, forest);

    let tree = forest.tree(0);
    let restored_tree = restored.tree(0);
    for index in 0..tree.capacity() {
        match (tree.node(index).statistics(), restored_tree.node(index).statistics()) {
            (Some(original), Some(copy)) => {
                assert_eq!(copy.num_samples(), original.num_samples());
                assert_eq!(copy.entropy(), original.entropy());
            }
            (None, None) => {}
            _ => panic!("statistics presence changed through the round trip"),
        }
    }
}

// ============================================================================
// Checkpointing
// ============================================================================

#[derive(Default)]
struct CountingSink {
    levels: usize,
    trees: usize,
    last_forest_len: usize,
}

impl ForestSink for CountingSink {
    fn tree_level_complete(&mut self, _tree_index: usize, _depth: usize, _tree: &Tree) {
        self.levels += 1;
    }
    fn tree_complete(&mut self, forest: &Forest) {
        self.trees += 1;
        self.last_forest_len = forest.len();
    }
}

#[test]
fn sink_sees_every_level_and_tree() {
    let trainer = ForestTrainer::new(
        separable_learner(),
        quiet(TrainingParams {
            num_trees: 2,
            tree_depth: 3,
            min_num_samples: 1,
            num_threads: 1,
            ..Default::default()
        }),
    );
    let mut provider = separable_provider();
    let mut sink = CountingSink::default();
    trainer.train(&mut provider, &mut sink).unwrap();

    // Depths 0..=3 per tree, two trees.
    assert_eq!(sink.levels, 2 * 4);
    assert_eq!(sink.trees, 2);
    assert_eq!(sink.last_forest_len, 2);
}

// ============================================================================
// Provider edge cases through the full pipeline
// ============================================================================

#[test]
fn background_pixels_never_reach_training() {
    // A 3x3 image whose center pixel is background: eight samples total,
    // all ending up in the root histogram.
    let data = Array2::zeros((3, 3));
    let mut labels = Array2::zeros((3, 3));
    labels[[1, 1]] = i16::MAX;
    let image = Image::new(data, labels).unwrap();

    let mut provider = SampleProvider::new(
        MemoryImageSource::from_images(vec![image]),
        SampleParams {
            samples_per_image_fraction: 1.0,
            ..Default::default()
        },
    );
    let learner =
        ImageWeakLearner::new(ImageLearnerParams::default(), HistogramFactory::new(1)).unwrap();
    let trainer = ForestTrainer::new(
        learner,
        quiet(TrainingParams {
            num_trees: 1,
            tree_depth: 1,
            num_threads: 1,
            ..Default::default()
        }),
    );

    let forest = trainer.train(&mut provider, &mut NullSink).unwrap();
    let root = forest.tree(0).node(0);
    assert_eq!(root.statistics().unwrap().num_samples(), 8);
}

#[test]
fn shared_images_are_not_duplicated_in_the_arena() {
    let data = Array2::zeros((2, 2));
    let labels = Array2::zeros((2, 2));
    let image = Arc::new(Image::new(data, labels).unwrap());

    let mut provider = SampleProvider::new(
        MemoryImageSource::new(vec![image.clone(), image]),
        SampleParams {
            samples_per_image_fraction: 1.0,
            num_batches: 2,
            ..Default::default()
        },
    );

    let set = full_sample_set(&mut provider);
    assert!(set.num_images() <= 2);
    assert!(set.num_samples() >= 4);
}
