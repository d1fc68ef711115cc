use serde::{Deserialize, Serialize};
use settle_core::CacheOutcome;

use crate::traits::{Artifact, ArtifactCache, RuleKey};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheMode {
    #[default]
    ReadWrite,
    ReadOnly,
    Disabled,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheLookup {
    pub outcome: CacheOutcome,
    pub artifact: Option<Artifact>,
}

impl CacheLookup {
    fn without(outcome: CacheOutcome) -> Self {
        Self { outcome, artifact: None }
    }
}

/// Local tier first, then the optional remote tier.
pub struct CacheTiers {
    pub local: Box<dyn ArtifactCache>,
    pub remote: Option<Box<dyn ArtifactCache>>,
    pub mode: CacheMode,
}

impl CacheTiers {
    pub fn new(local: Box<dyn ArtifactCache>, remote: Option<Box<dyn ArtifactCache>>, mode: CacheMode) -> Self {
        Self { local, remote, mode }
    }

    pub fn lookup(&self, key: &RuleKey) -> CacheLookup {
        if self.mode == CacheMode::Disabled {
            return CacheLookup::without(CacheOutcome::Skipped);
        }

        let mut errored = false;
        match self.local.fetch(key) {
            Ok(Some(artifact)) => {
                return CacheLookup {
                    outcome: CacheOutcome::LocalHit,
                    artifact: Some(artifact),
                }
            }
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(cache = self.local.name(), key = key.as_str(), error = %e, "local cache lookup failed");
                errored = true;
            }
        }

        if let Some(remote) = &self.remote {
            match remote.fetch(key) {
                Ok(Some(artifact)) => {
                    return CacheLookup {
                        outcome: CacheOutcome::RemoteHit,
                        artifact: Some(artifact),
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(cache = remote.name(), key = key.as_str(), error = %e, "remote cache lookup failed");
                    errored = true;
                }
            }
        }

        if errored {
            CacheLookup::without(CacheOutcome::Error)
        } else {
            CacheLookup::without(CacheOutcome::Miss)
        }
    }

    /// Writes the artifact to every tier. Returns how many tiers accepted it;
    /// failures are logged, not propagated.
    pub fn populate(&self, key: &RuleKey, artifact: &Artifact) -> usize {
        if self.mode != CacheMode::ReadWrite {
            return 0;
        }
        let mut stored = 0;
        let tiers = std::iter::once(self.local.as_ref()).chain(self.remote.as_deref());
        for tier in tiers {
            match tier.store(key, artifact) {
                Ok(()) => stored += 1,
                Err(e) => tracing::warn!(cache = tier.name(), key = key.as_str(), error = %e, "cache store failed"),
            }
        }
        stored
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::InMemoryCache;
    use std::sync::Arc;

    struct Broken;

    impl ArtifactCache for Broken {
        fn name(&self) -> &str {
            "broken"
        }
        fn fetch(&self, _key: &RuleKey) -> anyhow::Result<Option<Artifact>> {
            anyhow::bail!("connection refused")
        }
        fn store(&self, _key: &RuleKey, _artifact: &Artifact) -> anyhow::Result<()> {
            anyhow::bail!("connection refused")
        }
    }

    fn key() -> RuleKey {
        RuleKey::from_str("k1")
    }

    #[test]
    fn local_hit_wins_over_remote() {
        let local = Arc::new(InMemoryCache::new("local"));
        let remote = Arc::new(InMemoryCache::new("remote"));
        local.store(&key(), &Artifact::new(b"l".to_vec())).unwrap();
        remote.store(&key(), &Artifact::new(b"r".to_vec())).unwrap();
        let tiers = CacheTiers::new(Box::new(local), Some(Box::new(remote)), CacheMode::ReadWrite);
        let got = tiers.lookup(&key());
        assert_eq!(got.outcome, CacheOutcome::LocalHit);
        assert_eq!(got.artifact.unwrap().bytes, b"l");
    }

    #[test]
    fn remote_hit_when_local_misses() {
        let remote = Arc::new(InMemoryCache::new("remote"));
        remote.store(&key(), &Artifact::new(b"r".to_vec())).unwrap();
        let tiers = CacheTiers::new(
            Box::new(InMemoryCache::new("local")),
            Some(Box::new(remote)),
            CacheMode::ReadOnly,
        );
        assert_eq!(tiers.lookup(&key()).outcome, CacheOutcome::RemoteHit);
    }

    #[test]
    fn miss_error_and_skip() {
        let tiers = CacheTiers::new(Box::new(InMemoryCache::default()), None, CacheMode::ReadWrite);
        assert_eq!(tiers.lookup(&key()), CacheLookup::without(CacheOutcome::Miss));

        let tiers = CacheTiers::new(Box::new(InMemoryCache::default()), Some(Box::new(Broken)), CacheMode::ReadWrite);
        assert_eq!(tiers.lookup(&key()).outcome, CacheOutcome::Error);

        let tiers = CacheTiers::new(Box::new(InMemoryCache::default()), None, CacheMode::Disabled);
        assert_eq!(tiers.lookup(&key()).outcome, CacheOutcome::Skipped);
    }

    #[test]
    fn populate_respects_mode_and_tolerates_errors() {
        let local = Arc::new(InMemoryCache::new("local"));
        let tiers = CacheTiers::new(Box::new(local.clone()), Some(Box::new(Broken)), CacheMode::ReadWrite);
        assert_eq!(tiers.populate(&key(), &Artifact::new(b"x".to_vec())), 1);
        assert!(local.contains(&key()));

        let ro = Arc::new(InMemoryCache::new("local"));
        let tiers = CacheTiers::new(Box::new(ro.clone()), None, CacheMode::ReadOnly);
        assert_eq!(tiers.populate(&key(), &Artifact::new(b"x".to_vec())), 0);
        assert!(ro.is_empty());
    }
}
