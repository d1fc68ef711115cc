//! Settlement engine: runs a build graph and publishes one outcome per rule.

pub mod action;
pub mod config;
pub mod engine;
pub mod graph;
pub mod util;

pub use action::*;
pub use config::*;
pub use engine::*;
pub use graph::*;
pub use util::*;
