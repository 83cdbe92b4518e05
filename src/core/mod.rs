//! Core domain models
//!
//! Connection endpoints, stage definitions, pipeline definitions loaded
//! from YAML, and the terminal result of a run.

pub mod config;
pub mod connection;
pub mod pipeline;
pub mod result;
pub mod stage;

pub use connection::*;
pub use pipeline::*;
pub use result::*;
pub use stage::*;
