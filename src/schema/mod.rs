//! Schema module - Configuration, candidate and message types for deck search.

mod algorithm;
mod config;
mod individual;
mod message;

pub use algorithm::*;
pub use config::*;
pub use individual::*;
pub use message::*;
