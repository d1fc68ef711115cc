//! Summaries of a finished build run, for people and for tools.

pub mod report;
pub mod store;

pub use report::*;
pub use store::*;
