use crate::{CacheOutcome, FailureCause, RuleId, RuleStatus, SuccessProvenance};

/// How a rule settled. The two shapes are exclusive: a success never carries
/// a cause and a failure never carries a provenance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Settlement {
    Succeeded {
        provenance: SuccessProvenance,
        cache: CacheOutcome,
    },
    Failed {
        cause: FailureCause,
    },
}

/// The settled, immutable result of building one rule.
///
/// There are exactly two ways to get one: [`BuildOutcome::success`], open to
/// anyone, and the failure constructor, which only the settle capability
/// ([`crate::Settler::fail`]) and test code can reach. A rule that has not
/// settled yet simply has no `BuildOutcome`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BuildOutcome {
    rule: RuleId,
    settlement: Settlement,
}

impl BuildOutcome {
    /// Projection used when aggregating over many outcomes.
    pub const TO_SUCCESS: fn(&BuildOutcome) -> Option<SuccessProvenance> = BuildOutcome::success_provenance;

    pub fn success(rule: RuleId, provenance: SuccessProvenance, cache: CacheOutcome) -> Self {
        Self {
            rule,
            settlement: Settlement::Succeeded { provenance, cache },
        }
    }

    /// Failed rules always report a cache miss.
    pub(crate) fn failed(rule: RuleId, cause: FailureCause) -> Self {
        Self {
            rule,
            settlement: Settlement::Failed { cause },
        }
    }

    pub fn rule(&self) -> &RuleId {
        &self.rule
    }

    pub fn settlement(&self) -> &Settlement {
        &self.settlement
    }

    pub fn status(&self) -> RuleStatus {
        match self.settlement {
            Settlement::Succeeded { .. } => RuleStatus::Succeeded,
            Settlement::Failed { .. } => RuleStatus::Failed,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == RuleStatus::Succeeded
    }

    pub fn cache_outcome(&self) -> CacheOutcome {
        match self.settlement {
            Settlement::Succeeded { cache, .. } => cache,
            Settlement::Failed { .. } => CacheOutcome::Miss,
        }
    }

    pub fn success_provenance(&self) -> Option<SuccessProvenance> {
        match self.settlement {
            Settlement::Succeeded { provenance, .. } => Some(provenance),
            Settlement::Failed { .. } => None,
        }
    }

    pub fn failure_cause(&self) -> Option<&FailureCause> {
        match &self.settlement {
            Settlement::Succeeded { .. } => None,
            Settlement::Failed { cause } => Some(cause),
        }
    }
}

/// Provenances of the successful outcomes; failures are dropped.
pub fn successes<'a, I>(outcomes: I) -> impl Iterator<Item = SuccessProvenance> + 'a
where
    I: IntoIterator<Item = &'a BuildOutcome>,
    I::IntoIter: 'a,
{
    outcomes.into_iter().filter_map(BuildOutcome::TO_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(name: &str) -> RuleId {
        RuleId::from_str(name)
    }

    #[test]
    fn built_locally_on_miss() {
        let o = BuildOutcome::success(rule("R1"), SuccessProvenance::BuiltLocally, CacheOutcome::Miss);
        assert_eq!(o.status(), RuleStatus::Succeeded);
        assert_eq!(o.failure_cause(), None);
        assert_eq!(o.cache_outcome(), CacheOutcome::Miss);
        assert_eq!(o.success_provenance(), Some(SuccessProvenance::BuiltLocally));
    }

    #[test]
    fn compile_error_fails_with_miss() {
        let cause = FailureCause::new("compile error: foo.c:10").unwrap();
        let o = BuildOutcome::failed(rule("R2"), cause);
        assert_eq!(o.status(), RuleStatus::Failed);
        assert_eq!(o.success_provenance(), None);
        assert_eq!(o.cache_outcome(), CacheOutcome::Miss);
        assert_eq!(o.failure_cause().map(|c| c.message()), Some("compile error: foo.c:10"));
    }

    #[test]
    fn fetched_from_remote_cache() {
        let o = BuildOutcome::success(rule("R3"), SuccessProvenance::FetchedFromCache, CacheOutcome::RemoteHit);
        assert_eq!(o.status(), RuleStatus::Succeeded);
        assert_eq!(o.cache_outcome(), CacheOutcome::RemoteHit);
        assert!(o.cache_outcome().is_hit());
    }

    #[test]
    fn exactly_one_payload_matches_status() {
        let outcomes = vec![
            BuildOutcome::success(rule("a"), SuccessProvenance::MatchingRuleKey, CacheOutcome::Skipped),
            BuildOutcome::failed(rule("b"), FailureCause::new("boom").unwrap()),
        ];
        for o in &outcomes {
            match o.status() {
                RuleStatus::Succeeded => {
                    assert!(o.success_provenance().is_some());
                    assert!(o.failure_cause().is_none());
                }
                RuleStatus::Failed => {
                    assert!(o.success_provenance().is_none());
                    assert!(o.failure_cause().is_some());
                    assert!(!o.cache_outcome().is_hit());
                }
            }
        }
    }

    #[test]
    fn accessors_are_stable() {
        let o = BuildOutcome::failed(rule("b"), FailureCause::new("boom").unwrap());
        assert_eq!(o.status(), o.status());
        assert_eq!(o.cache_outcome(), o.cache_outcome());
        assert_eq!(o.failure_cause(), o.failure_cause());
        assert_eq!(o.clone(), o);
    }

    #[test]
    fn projection_drops_failures() {
        let outcomes = vec![
            BuildOutcome::success(rule("a"), SuccessProvenance::BuiltLocally, CacheOutcome::Miss),
            BuildOutcome::failed(rule("b"), FailureCause::new("boom").unwrap()),
            BuildOutcome::success(rule("c"), SuccessProvenance::FetchedFromCache, CacheOutcome::LocalHit),
        ];
        assert_eq!((BuildOutcome::TO_SUCCESS)(&outcomes[1]), None);
        assert_eq!((BuildOutcome::TO_SUCCESS)(&outcomes[2]), Some(SuccessProvenance::FetchedFromCache));
        let got: Vec<_> = successes(&outcomes).collect();
        assert_eq!(got, vec![SuccessProvenance::BuiltLocally, SuccessProvenance::FetchedFromCache]);
    }
}
