//! canopy: level-synchronous random-forest training for per-pixel image
//! classification.
//!
//! The forest's trees grow breadth-first, one tree level at a time: a
//! single pass over the training samples produces split statistics for
//! every frontier node of the current depth simultaneously, with the
//! candidate evaluation parallelized over features. Split decisions
//! compare the difference of two offset-addressed pixel reads against a
//! scalar threshold; leaves carry class histograms.
//!
//! # Example
//!
//! ```ignore
//! use canopy::learner::image::{ImageLearnerParams, ImageWeakLearner};
//! use canopy::sampling::{SampleParams, SampleProvider};
//! use canopy::sink::NullSink;
//! use canopy::statistics::HistogramFactory;
//! use canopy::training::{ForestTrainer, TrainingParams};
//!
//! let learner = ImageWeakLearner::new(
//!     ImageLearnerParams::default(),
//!     HistogramFactory::new(num_classes),
//! )?;
//! let mut provider = SampleProvider::new(source, SampleParams::default());
//! let trainer = ForestTrainer::new(learner, TrainingParams::default());
//! let forest = trainer.train(&mut provider, &mut NullSink)?;
//! ```

pub mod error;
pub mod forest;
pub mod image;
pub mod learner;
pub mod sampling;
pub mod sink;
pub mod statistics;
pub mod training;

pub use error::{ImageError, TrainError};
pub use forest::{Direction, Forest, PixelPairFeature, SplitPoint, Tree};
pub use image::{Image, ImageSource, Label, MemoryImageSource, Offset, Pixel};
pub use learner::image::{ImageLearnerParams, ImageWeakLearner};
pub use learner::WeakLearner;
pub use sampling::{PixelSample, SampleParams, SampleProvider, SampleSet};
pub use sink::{FileCheckpointSink, ForestSink, NullSink};
pub use statistics::{HistogramFactory, HistogramStatistics};
pub use training::{ForestTrainer, TrainingParams, Verbosity};
