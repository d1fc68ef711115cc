use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use settle_cache::RuleKey;
use settle_core::RuleId;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("rule defined twice: {0}")]
    DuplicateRule(RuleId),
    #[error("rule {rule} depends on undefined rule {dep}")]
    MissingDep { rule: RuleId, dep: RuleId },
    #[error("dependency cycle through {0}")]
    Cycle(RuleId),
    #[error("unknown target: {0}")]
    UnknownTarget(RuleId),
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RuleSpec {
    pub name: RuleId,
    #[serde(default)]
    pub deps: Vec<RuleId>,
    /// Cache key supplied by whoever generated the graph.
    #[serde(default)]
    pub rule_key: Option<String>,
    /// Shell script run by the build action; a rule without one only groups deps.
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default = "default_cacheable")]
    pub cacheable: bool,
}

fn default_cacheable() -> bool {
    true
}

impl RuleSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: RuleId::from_str(name),
            deps: vec![],
            rule_key: None,
            command: None,
            cacheable: true,
        }
    }

    pub fn with_deps(mut self, deps: &[&str]) -> Self {
        self.deps = deps.iter().map(|d| RuleId::from_str(*d)).collect();
        self
    }

    pub fn with_key(mut self, key: &str) -> Self {
        self.rule_key = Some(key.to_string());
        self
    }

    pub fn with_command(mut self, command: &str) -> Self {
        self.command = Some(command.to_string());
        self
    }

    /// `None` when the rule may not use the cache.
    pub fn cache_key(&self) -> Option<RuleKey> {
        if !self.cacheable {
            return None;
        }
        self.rule_key.as_deref().map(RuleKey::from_str)
    }
}

#[derive(Debug, Deserialize)]
struct GraphFile {
    rules: Vec<RuleSpec>,
}

/// Validated, acyclic set of rules.
#[derive(Clone, Debug, Default)]
pub struct BuildGraph {
    rules: BTreeMap<RuleId, RuleSpec>,
}

impl BuildGraph {
    pub fn load(path: &Path) -> Result<Self> {
        let s = std::fs::read_to_string(path).with_context(|| format!("read graph: {}", path.display()))?;
        let file: GraphFile = serde_yaml::from_str(&s).with_context(|| format!("parse graph: {}", path.display()))?;
        Ok(Self::from_rules(file.rules)?)
    }

    pub fn from_rules(rules: Vec<RuleSpec>) -> Result<Self, GraphError> {
        let mut map = BTreeMap::new();
        for rule in rules {
            if map.contains_key(&rule.name) {
                return Err(GraphError::DuplicateRule(rule.name));
            }
            map.insert(rule.name.clone(), rule);
        }
        let graph = Self { rules: map };
        graph.validate()?;
        Ok(graph)
    }

    pub fn validate(&self) -> Result<(), GraphError> {
        for rule in self.rules.values() {
            for dep in &rule.deps {
                if !self.rules.contains_key(dep) {
                    return Err(GraphError::MissingDep {
                        rule: rule.name.clone(),
                        dep: dep.clone(),
                    });
                }
            }
        }

        let mut temp = HashSet::new();
        let mut perm = HashSet::new();
        for id in self.rules.keys() {
            self.visit(id, &mut temp, &mut perm, &mut |_| {})?;
        }
        Ok(())
    }

    // DFS; `emit` sees every rule after all of its deps.
    fn visit<'a>(
        &'a self,
        id: &'a RuleId,
        temp: &mut HashSet<&'a RuleId>,
        perm: &mut HashSet<&'a RuleId>,
        emit: &mut dyn FnMut(&'a RuleId),
    ) -> Result<(), GraphError> {
        if perm.contains(id) {
            return Ok(());
        }
        if !temp.insert(id) {
            return Err(GraphError::Cycle(id.clone()));
        }
        let rule = self.rules.get(id).ok_or_else(|| GraphError::UnknownTarget(id.clone()))?;
        for dep in &rule.deps {
            self.visit(dep, temp, perm, emit)?;
        }
        temp.remove(id);
        perm.insert(id);
        emit(id);
        Ok(())
    }

    /// Targets plus everything they depend on, dependencies first.
    /// An empty target list means every rule.
    pub fn closure(&self, targets: &[RuleId]) -> Result<Vec<RuleId>, GraphError> {
        let roots: Vec<&RuleId> = if targets.is_empty() {
            self.rules.keys().collect()
        } else {
            targets.iter().collect()
        };
        let mut order = Vec::new();
        let mut temp = HashSet::new();
        let mut perm = HashSet::new();
        for root in roots {
            if !self.rules.contains_key(root) {
                return Err(GraphError::UnknownTarget(root.clone()));
            }
            self.visit(root, &mut temp, &mut perm, &mut |id| order.push(id.clone()))?;
        }
        Ok(order)
    }

    pub fn rule(&self, id: &RuleId) -> Option<&RuleSpec> {
        self.rules.get(id)
    }

    pub fn rules(&self) -> impl Iterator<Item = &RuleSpec> {
        self.rules.values()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
