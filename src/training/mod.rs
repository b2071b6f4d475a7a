//! Training infrastructure: the level-synchronous trainers and logging.

mod logger;
mod trainer;

pub use logger::{TrainingLogger, Verbosity};
pub use trainer::{ForestTrainer, LevelTreeTrainer, TrainingParams};
