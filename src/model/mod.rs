//! Revenue model — feature encoding, boosted regression, and training.

pub mod features;
pub mod gbm;
pub mod trainer;

pub use features::Dataset;
pub use gbm::{GbmConfig, GbmModel};
pub use trainer::{Trainer, TrainerConfig, TrainOutcome};
