use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

use crate::traits::{Artifact, ArtifactCache, RuleKey};

/// Filesystem cache: `<root>/<aa>/<sha256(key)>`.
#[derive(Clone)]
pub struct DirCache {
    pub root: PathBuf,
    name: String,
}

impl DirCache {
    pub fn new(root: PathBuf) -> Self {
        let name = root.display().to_string();
        Self { root, name }
    }

    /// Rule keys may contain path separators, so files are named by digest.
    pub fn path_for(&self, key: &RuleKey) -> PathBuf {
        let digest = hex::encode(Sha256::digest(key.as_str().as_bytes()));
        self.root.join(&digest[..2]).join(digest)
    }
}

impl ArtifactCache for DirCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn fetch(&self, key: &RuleKey) -> Result<Option<Artifact>> {
        let path = self.path_for(key);
        match std::fs::read(&path) {
            Ok(bytes) => Ok(Some(Artifact::new(bytes))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read cache entry {}", path.display())),
        }
    }

    fn store(&self, key: &RuleKey, artifact: &Artifact) -> Result<()> {
        let path = self.path_for(key);
        let parent = path.parent().unwrap_or(&self.root);
        std::fs::create_dir_all(parent).with_context(|| format!("create cache dir {}", parent.display()))?;
        // Each writer gets its own temp file; the entry appears whole on persist.
        let mut tmp = NamedTempFile::new_in(parent).with_context(|| format!("create temp file in {}", parent.display()))?;
        tmp.write_all(&artifact.bytes)
            .with_context(|| format!("write {}", tmp.path().display()))?;
        tmp.persist(&path).with_context(|| format!("persist {}", path.display()))?;
        tracing::debug!(key = key.as_str(), path = %path.display(), "cache entry stored");
        Ok(())
    }
}
