pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use config::Config;
pub use error::DealScoutError;
pub use events::{EventKind, ProgressEvent, PropertyStage};
pub use types::*;
