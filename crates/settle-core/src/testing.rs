//! Failure outcomes for test code. The engine produces these through
//! [`crate::Settler::fail`]; tests need them without running a table.

use crate::{BuildOutcome, FailureCause, RuleId};

pub fn failed_outcome(rule: RuleId, cause: FailureCause) -> BuildOutcome {
    BuildOutcome::failed(rule, cause)
}
