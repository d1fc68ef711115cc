use serde::{Deserialize, Serialize};

/// How the cache lookup for a rule resolved.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CacheOutcome {
    LocalHit,
    RemoteHit,
    Miss,
    /// Lookup not performed: rule not cacheable, caching disabled, or local
    /// state already matched.
    Skipped,
    /// Lookup attempted but a tier errored and nothing hit.
    Error,
}

impl CacheOutcome {
    pub fn is_hit(self) -> bool {
        match self {
            CacheOutcome::LocalHit | CacheOutcome::RemoteHit => true,
            CacheOutcome::Miss | CacheOutcome::Skipped | CacheOutcome::Error => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            CacheOutcome::LocalHit => "local_hit",
            CacheOutcome::RemoteHit => "remote_hit",
            CacheOutcome::Miss => "miss",
            CacheOutcome::Skipped => "skipped",
            CacheOutcome::Error => "error",
        }
    }
}

/// Why a rule counts as successful.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SuccessProvenance {
    /// The build action ran and produced the artifact.
    BuiltLocally,
    /// The artifact was restored from a cache tier.
    FetchedFromCache,
    /// The rule key of the last successful build is unchanged; nothing ran.
    MatchingRuleKey,
}

impl SuccessProvenance {
    /// Only freshly built artifacts are worth storing back into the cache.
    pub fn should_upload_artifact(self) -> bool {
        match self {
            SuccessProvenance::BuiltLocally => true,
            SuccessProvenance::FetchedFromCache | SuccessProvenance::MatchingRuleKey => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SuccessProvenance::BuiltLocally => "built_locally",
            SuccessProvenance::FetchedFromCache => "fetched_from_cache",
            SuccessProvenance::MatchingRuleKey => "matching_rule_key",
        }
    }
}

/// Coarse terminal classification. Always derived from a `BuildOutcome`.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RuleStatus {
    Succeeded,
    Failed,
}

impl std::fmt::Display for CacheOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for SuccessProvenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for RuleStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleStatus::Succeeded => f.write_str("succeeded"),
            RuleStatus::Failed => f.write_str("failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_hit_variants_are_hits() {
        assert!(CacheOutcome::LocalHit.is_hit());
        assert!(CacheOutcome::RemoteHit.is_hit());
        assert!(!CacheOutcome::Miss.is_hit());
        assert!(!CacheOutcome::Skipped.is_hit());
        assert!(!CacheOutcome::Error.is_hit());
    }

    #[test]
    fn only_built_artifacts_are_uploaded() {
        assert!(SuccessProvenance::BuiltLocally.should_upload_artifact());
        assert!(!SuccessProvenance::FetchedFromCache.should_upload_artifact());
        assert!(!SuccessProvenance::MatchingRuleKey.should_upload_artifact());
    }

    #[test]
    fn display_uses_snake_case_names() {
        assert_eq!(CacheOutcome::RemoteHit.to_string(), "remote_hit");
        assert_eq!(SuccessProvenance::MatchingRuleKey.to_string(), "matching_rule_key");
        assert_eq!(RuleStatus::Failed.to_string(), "failed");
    }
}
