pub mod classifier;
pub mod cli;
pub mod config;
pub mod error;
pub mod identify;
pub mod ingest;
pub mod model;
pub mod notify;
pub mod similarity;
pub mod store;

pub use classifier::{Classifier, ClassifierKind, SameTaskClassifier};
pub use config::Config;
pub use error::{Result, TaskTrailError};
pub use ingest::{ModelHandle, ModelRuntime, RawEvent, SearchModel};
pub use model::{Search, SearchGraph, Task};
pub use store::{SqliteStore, Storage};
