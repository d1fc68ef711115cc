use std::collections::HashSet;

use crate::{CacheOutcome, SettleError, SuccessProvenance};

/// Which cache outcomes may accompany which provenance on a success.
///
/// The outcome type itself accepts any pairing; this policy is applied by the
/// settle capability so the engine's own bookkeeping stays consistent.
#[derive(Clone, Debug)]
pub struct PairingPolicy {
    allowed: HashSet<(SuccessProvenance, CacheOutcome)>,
    strict: bool,
}

impl Default for PairingPolicy {
    fn default() -> Self {
        Self::new(Self::default_pairs(), true)
    }
}

impl PairingPolicy {
    pub fn new(pairs: impl IntoIterator<Item = (SuccessProvenance, CacheOutcome)>, strict: bool) -> Self {
        Self {
            allowed: pairs.into_iter().collect(),
            strict,
        }
    }

    /// Accepts every pairing.
    pub fn permissive() -> Self {
        let provenances = [
            SuccessProvenance::BuiltLocally,
            SuccessProvenance::FetchedFromCache,
            SuccessProvenance::MatchingRuleKey,
        ];
        let caches = [
            CacheOutcome::LocalHit,
            CacheOutcome::RemoteHit,
            CacheOutcome::Miss,
            CacheOutcome::Skipped,
            CacheOutcome::Error,
        ];
        let pairs = provenances
            .iter()
            .flat_map(|p| caches.iter().map(move |c| (*p, *c)));
        Self::new(pairs, true)
    }

    pub fn default_pairs() -> Vec<(SuccessProvenance, CacheOutcome)> {
        vec![
            (SuccessProvenance::FetchedFromCache, CacheOutcome::LocalHit),
            (SuccessProvenance::FetchedFromCache, CacheOutcome::RemoteHit),
            (SuccessProvenance::BuiltLocally, CacheOutcome::Miss),
            (SuccessProvenance::BuiltLocally, CacheOutcome::Skipped),
            (SuccessProvenance::BuiltLocally, CacheOutcome::Error),
            (SuccessProvenance::MatchingRuleKey, CacheOutcome::Skipped),
        ]
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    pub fn allows(&self, provenance: SuccessProvenance, cache: CacheOutcome) -> bool {
        self.allowed.contains(&(provenance, cache))
    }

    /// Strict policies reject unknown pairings; lenient ones only warn.
    pub fn check(&self, provenance: SuccessProvenance, cache: CacheOutcome) -> Result<(), SettleError> {
        if self.allows(provenance, cache) {
            return Ok(());
        }
        if self.strict {
            return Err(SettleError::InvalidPairing { provenance, cache });
        }
        tracing::warn!(%provenance, %cache, "accepting unusual provenance/cache pairing");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy_pairs_fetch_with_hits_only() {
        let p = PairingPolicy::default();
        assert!(p.allows(SuccessProvenance::FetchedFromCache, CacheOutcome::RemoteHit));
        assert!(!p.allows(SuccessProvenance::FetchedFromCache, CacheOutcome::Miss));
        assert!(!p.allows(SuccessProvenance::BuiltLocally, CacheOutcome::LocalHit));
        assert_eq!(
            p.check(SuccessProvenance::BuiltLocally, CacheOutcome::LocalHit),
            Err(SettleError::InvalidPairing {
                provenance: SuccessProvenance::BuiltLocally,
                cache: CacheOutcome::LocalHit,
            })
        );
    }

    #[test]
    fn lenient_policy_accepts_unknown_pairs() {
        let p = PairingPolicy::new(PairingPolicy::default_pairs(), false);
        assert!(p.check(SuccessProvenance::BuiltLocally, CacheOutcome::LocalHit).is_ok());
    }

    #[test]
    fn permissive_allows_everything() {
        let p = PairingPolicy::permissive();
        assert!(p.allows(SuccessProvenance::MatchingRuleKey, CacheOutcome::RemoteHit));
    }
}
