use thiserror::Error;

use crate::{CacheOutcome, RuleId, SuccessProvenance};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettleError {
    #[error("failure cause must carry a non-empty message")]
    EmptyFailureCause,
    #[error("provenance {provenance} cannot be paired with cache outcome {cache}")]
    InvalidPairing {
        provenance: SuccessProvenance,
        cache: CacheOutcome,
    },
    #[error("rule {0} has no slot in this run")]
    UnknownRule(RuleId),
    #[error("build run cancelled before {0} settled")]
    Cancelled(RuleId),
}
