pub mod config;
pub mod error;
mod dead_letter;
mod dispatch;
mod handler;

pub use error::PipelineError;
pub use config::BridgeConfig;
pub use dead_letter::DeadLetterFile;
pub use dispatch::spawn_bridge;
pub use handler::{Bridge, BridgeStats, Outcome, build_document};
