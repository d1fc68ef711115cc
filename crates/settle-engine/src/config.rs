use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use settle_cache::{ArtifactCache, CacheMode, CacheTiers, DirCache};
use settle_core::{CacheOutcome, PairingPolicy, SuccessProvenance};

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Config {
    pub engine: EngineConfig,
    pub cache: CacheConfig,
    #[serde(default)]
    pub pairing: PairingConfig,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineConfig {
    pub workers: usize,
    /// Keep settling independent rules after a failure.
    #[serde(default)]
    pub keep_going: bool,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheConfig {
    pub dir: String,
    #[serde(default)]
    pub mode: CacheMode,
    /// Shared directory used as the remote tier (e.g. a network mount).
    #[serde(default)]
    pub remote_dir: Option<String>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PairingConfig {
    #[serde(default = "default_strict")]
    pub strict: bool,
    /// Overrides the default (provenance, cache) pairs when set.
    #[serde(default)]
    pub allow: Option<Vec<(SuccessProvenance, CacheOutcome)>>,
}

fn default_strict() -> bool {
    true
}

impl Default for PairingConfig {
    fn default() -> Self {
        Self {
            strict: default_strict(),
            allow: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            engine: EngineConfig {
                workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
                keep_going: false,
            },
            cache: CacheConfig {
                dir: "~/.settle/cache".to_string(),
                mode: CacheMode::ReadWrite,
                remote_dir: None,
            },
            pairing: PairingConfig::default(),
        }
    }
}

impl Config {
    pub fn load_from(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
        let cfg: Config = toml::from_str(&s).with_context(|| "parse settle.toml")?;
        Ok(cfg)
    }

    /// Loads `.settle/settle.toml` under `root`, falling back to defaults.
    pub fn load_or_default(root: &Path) -> Result<Self> {
        let path = Self::config_path(root);
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let s = toml::to_string_pretty(self).with_context(|| "serialize toml")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    pub fn config_path(root: &Path) -> PathBuf {
        root.join(".settle").join("settle.toml")
    }

    pub fn ledger_path(root: &Path) -> PathBuf {
        root.join(".settle").join("rule_keys.json")
    }

    pub fn cache_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.cache.dir).to_string())
    }

    pub fn pairing_policy(&self) -> PairingPolicy {
        let pairs = self
            .pairing
            .allow
            .clone()
            .unwrap_or_else(PairingPolicy::default_pairs);
        PairingPolicy::new(pairs, self.pairing.strict)
    }

    pub fn cache_tiers(&self) -> CacheTiers {
        let local = Box::new(DirCache::new(self.cache_dir()));
        let remote = self
            .cache
            .remote_dir
            .as_ref()
            .map(|dir| Box::new(DirCache::new(PathBuf::from(shellexpand::tilde(dir).to_string()))) as Box<dyn ArtifactCache>);
        CacheTiers::new(local, remote, self.cache.mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn round_trips_through_toml() {
        let dir = tempdir().unwrap();
        let path = Config::config_path(dir.path());
        let mut cfg = Config::default();
        cfg.engine.workers = 3;
        cfg.cache.mode = CacheMode::ReadOnly;
        cfg.save_to(&path).unwrap();

        let loaded = Config::load_from(&path).unwrap();
        assert_eq!(loaded.engine.workers, 3);
        assert_eq!(loaded.cache.mode, CacheMode::ReadOnly);
        assert!(loaded.pairing.strict);
    }

    #[test]
    fn parses_pairing_overrides() {
        let cfg: Config = toml::from_str(
            r#"
            [engine]
            workers = 2

            [cache]
            dir = "/tmp/settle-cache"
            mode = "disabled"

            [pairing]
            strict = false
            allow = [["built_locally", "miss"]]
            "#,
        )
        .unwrap();
        let policy = cfg.pairing_policy();
        assert!(!policy.is_strict());
        assert!(policy.allows(SuccessProvenance::BuiltLocally, CacheOutcome::Miss));
        assert!(!policy.allows(SuccessProvenance::BuiltLocally, CacheOutcome::Skipped));
        assert_eq!(cfg.cache.mode, CacheMode::Disabled);
        assert!(!cfg.engine.keep_going);
    }

    #[test]
    fn missing_config_falls_back_to_defaults() {
        let dir = tempdir().unwrap();
        let cfg = Config::load_or_default(dir.path()).unwrap();
        assert_eq!(cfg.cache.dir, "~/.settle/cache");
        assert!(cfg.cache_dir().ends_with(".settle/cache"));
    }
}
