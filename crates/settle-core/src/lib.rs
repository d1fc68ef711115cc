//! Outcome model of the settle build engine.
//!
//! A [`BuildOutcome`] records, once per rule and run, whether the rule
//! succeeded (and by what means) or failed (and why). Outcomes are published
//! through an [`OutcomeTable`], which guarantees a single producer per rule.

pub mod error;
pub mod failure;
pub mod ids;
pub mod model;
pub mod outcome;
pub mod pairing;
pub mod table;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use error::*;
pub use failure::*;
pub use ids::*;
pub use model::*;
pub use outcome::*;
pub use pairing::*;
pub use table::*;
