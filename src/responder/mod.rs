//! Response generation for the assistant side of a turn

pub mod config;
pub mod generator;
pub mod pipeline;

pub use config::ResponderConfig;
pub use generator::{PlaceholderResponder, ResponseGenerator};
pub use pipeline::{ResponseCommand, ResponseDispatcher, ResponsePipeline, ResponsePipelineHandle};
