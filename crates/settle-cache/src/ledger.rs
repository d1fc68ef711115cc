use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{anyhow, Context, Result};
use settle_core::RuleId;

use crate::traits::RuleKey;

/// Rule key of each rule's last successful local build. A rule whose current
/// key matches its entry does not need to run or be fetched again.
#[derive(Default)]
pub struct RuleKeyLedger {
    path: Option<PathBuf>,
    entries: Mutex<BTreeMap<RuleId, RuleKey>>,
}

impl RuleKeyLedger {
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Opens a JSON ledger; a missing file is an empty ledger.
    pub fn open(path: &Path) -> Result<Self> {
        let entries = if path.exists() {
            let s = std::fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
            serde_json::from_str(&s).with_context(|| format!("parse ledger {}", path.display()))?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            entries: Mutex::new(entries),
        })
    }

    pub fn matches(&self, rule: &RuleId, key: &RuleKey) -> bool {
        self.entries
            .lock()
            .map(|e| e.get(rule) == Some(key))
            .unwrap_or(false)
    }

    pub fn record(&self, rule: &RuleId, key: &RuleKey) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("ledger lock poisoned"))?;
        entries.insert(rule.clone(), key.clone());
        Ok(())
    }

    /// Drops the entry so the next run cannot short-circuit on stale state.
    pub fn forget(&self, rule: &RuleId) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("ledger lock poisoned"))?;
        entries.remove(rule);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let entries = self.entries.lock().map_err(|_| anyhow!("ledger lock poisoned"))?;
        let s = serde_json::to_string_pretty(&*entries).context("serialize ledger")?;
        std::fs::write(path, s).with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn matches_only_the_recorded_key() {
        let ledger = RuleKeyLedger::in_memory();
        let rule = RuleId::from_str("//lib:foo");
        assert!(!ledger.matches(&rule, &RuleKey::from_str("k1")));
        ledger.record(&rule, &RuleKey::from_str("k1")).unwrap();
        assert!(ledger.matches(&rule, &RuleKey::from_str("k1")));
        assert!(!ledger.matches(&rule, &RuleKey::from_str("k2")));
        ledger.forget(&rule).unwrap();
        assert!(ledger.is_empty());
    }

    #[test]
    fn persists_between_opens() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ledger.json");
        let rule = RuleId::from_str("//app:main");

        let ledger = RuleKeyLedger::open(&path).unwrap();
        assert!(ledger.is_empty());
        ledger.record(&rule, &RuleKey::from_str("abc")).unwrap();
        ledger.save().unwrap();

        let reopened = RuleKeyLedger::open(&path).unwrap();
        assert!(reopened.matches(&rule, &RuleKey::from_str("abc")));
    }

    #[test]
    fn in_memory_save_is_a_no_op() {
        RuleKeyLedger::in_memory().save().unwrap();
    }
}
