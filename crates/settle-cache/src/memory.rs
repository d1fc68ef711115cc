use std::collections::HashMap;
use std::sync::Mutex;

use crate::traits::{Artifact, ArtifactCache, RuleKey};

/// In-memory cache for tests, and a stand-in remote tier.
pub struct InMemoryCache {
    name: String,
    inner: Mutex<HashMap<String, Artifact>>,
}

impl Default for InMemoryCache {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl InMemoryCache {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Mutex::new(HashMap::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &RuleKey) -> bool {
        self.inner.lock().map(|m| m.contains_key(&key.0)).unwrap_or(false)
    }
}

impl ArtifactCache for InMemoryCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, key: &RuleKey) -> anyhow::Result<Option<Artifact>> {
        let inner = self.inner.lock().map_err(|_| anyhow::anyhow!("{} cache lock poisoned", self.name))?;
        Ok(inner.get(&key.0).cloned())
    }

    fn store(&self, key: &RuleKey, artifact: &Artifact) -> anyhow::Result<()> {
        let mut inner = self.inner.lock().map_err(|_| anyhow::anyhow!("{} cache lock poisoned", self.name))?;
        inner.insert(key.0.clone(), artifact.clone());
        Ok(())
    }
}
