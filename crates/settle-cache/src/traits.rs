use serde::{Deserialize, Serialize};

/// Opaque cache key for a rule's output, computed by the graph collaborator.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleKey(pub String);

impl RuleKey {
    pub fn from_str(s: impl Into<String>) -> Self {
        Self(s.into())
    }
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Output bytes of a rule.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Artifact {
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self { bytes: bytes.into() }
    }
}

pub trait ArtifactCache: Send + Sync {
    /// Short label used in logs ("local", "remote", a directory, ...).
    fn name(&self) -> &str;

    fn fetch(&self, key: &RuleKey) -> anyhow::Result<Option<Artifact>>;
    fn store(&self, key: &RuleKey, artifact: &Artifact) -> anyhow::Result<()>;
}

impl<T: ArtifactCache + ?Sized> ArtifactCache for std::sync::Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn fetch(&self, key: &RuleKey) -> anyhow::Result<Option<Artifact>> {
        (**self).fetch(key)
    }

    fn store(&self, key: &RuleKey, artifact: &Artifact) -> anyhow::Result<()> {
        (**self).store(key, artifact)
    }
}
