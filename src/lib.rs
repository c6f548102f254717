pub mod cli;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod gallery;
pub mod labels;
pub mod loader;
pub mod metrics;
pub mod predict;
pub mod recognizer;
pub mod scheduler;
pub mod store;
pub mod utils;

pub use config::Opts;
pub use engine::{LinearEngine, ModelEngine, TrainParams};
pub use error::{FaceIdError, Result};
pub use loader::{FeatureVector, GrayscaleLoader, ImageLoader};
pub use predict::{Candidate, Prediction};
pub use recognizer::Recognizer;
pub use scheduler::{SchedulerConfig, TrainingReport};
pub use store::{DirectoryStore, GalleryStore};
