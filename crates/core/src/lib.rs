pub mod cache;
pub mod catalog;
pub mod channel;
pub mod completion;
pub mod config;
pub mod correlator;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod log;
pub mod message;
pub mod model;
pub mod probe;
pub mod response;
pub mod step;

#[cfg(test)]
mod test_utils;

pub use crate::config::{config_dir, data_dir};
pub use crate::completion::{AiBackend, AiRequest, CancellationToken, StreamStats};
pub use crate::dispatch::DispatchOptions;
pub use crate::engine::{Engine, EngineBuilder};
pub use crate::error::DispatchError;
pub use crate::response::{AiResponse, ResponseType};
