pub mod cache;
pub mod catalog;
pub mod config;
pub mod display;
pub mod engine;
pub mod error;
pub mod events;
pub mod processing;
pub mod scan;
pub mod scheduler;
mod tasks {
    pub(crate) mod refresh;
}

pub use catalog::{Catalog, CatalogEntry, CatalogImage, Direction, LoadedImage, RescanReport};
pub use config::{ConfigStore, YamlConfigStore};
pub use display::{DisplaySink, PngFileSink};
pub use engine::Engine;
pub use error::{CatalogError, DisplayError, ValidationError};
pub use events::{DisplayOutcome, ScheduleState, WakeReason};
