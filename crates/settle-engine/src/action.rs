use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use settle_cache::Artifact;
use settle_core::BuildOutcome;

use crate::graph::RuleSpec;
use crate::util::run_shell;

/// Runs a rule whose output was not found in any cache. Called only after all
/// of the rule's dependencies settled successfully.
pub trait BuildAction: Send + Sync {
    fn build(&self, rule: &RuleSpec, deps: &[Arc<BuildOutcome>]) -> Result<Artifact>;

    /// Materializes an artifact fetched from the cache. An error makes the
    /// engine build the rule instead.
    fn restore(&self, _rule: &RuleSpec, _artifact: &Artifact) -> Result<()> {
        Ok(())
    }
}

/// Runs the rule's `command` through `sh -c`; the artifact is its stdout.
pub struct ShellAction {
    pub workdir: PathBuf,
}

impl ShellAction {
    pub fn new(workdir: PathBuf) -> Self {
        Self { workdir }
    }
}

impl BuildAction for ShellAction {
    fn build(&self, rule: &RuleSpec, _deps: &[Arc<BuildOutcome>]) -> Result<Artifact> {
        let Some(command) = &rule.command else {
            return Ok(Artifact::default());
        };
        tracing::debug!(rule = %rule.name, command = command.as_str(), "running build command");
        let stdout = run_shell(&self.workdir, command, &[("SETTLE_RULE", rule.name.as_str())])?;
        Ok(Artifact::new(stdout))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn grouping_rule_produces_empty_artifact() {
        let dir = tempdir().unwrap();
        let action = ShellAction::new(dir.path().to_path_buf());
        let artifact = action.build(&RuleSpec::new("//group"), &[]).unwrap();
        assert!(artifact.bytes.is_empty());
    }

    #[test]
    fn command_output_becomes_the_artifact() {
        let dir = tempdir().unwrap();
        let action = ShellAction::new(dir.path().to_path_buf());
        let rule = RuleSpec::new("//lib:foo").with_command("printf \"built $SETTLE_RULE\"");
        let artifact = action.build(&rule, &[]).unwrap();
        assert_eq!(artifact.bytes, b"built //lib:foo");
    }
}
