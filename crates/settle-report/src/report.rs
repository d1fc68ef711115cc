use std::fmt::Write as _;

use serde::Serialize;
use settle_core::{successes, BuildOutcome, CacheOutcome, RuleId, RuleStatus, RunId, SuccessProvenance};
use settle_engine::BuildRun;

#[derive(Clone, Debug, Serialize, PartialEq, Eq)]
pub struct RuleReport {
    pub rule: RuleId,
    pub status: RuleStatus,
    pub cache: CacheOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provenance: Option<SuccessProvenance>,
    /// Failure messages, outermost first.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub failure: Vec<String>,
}

impl RuleReport {
    pub fn from_outcome(outcome: &BuildOutcome) -> Self {
        let failure = outcome
            .failure_cause()
            .map(|c| c.chain().map(|c| c.message().to_string()).collect())
            .unwrap_or_default();
        Self {
            rule: outcome.rule().clone(),
            status: outcome.status(),
            cache: outcome.cache_outcome(),
            provenance: outcome.success_provenance(),
            failure,
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, PartialEq, Eq)]
pub struct BuildSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub unsettled: usize,
    pub built_locally: usize,
    pub fetched_from_cache: usize,
    pub matching_rule_key: usize,
    pub cache_hits: usize,
    pub cache_misses: usize,
    pub cache_skipped: usize,
    pub cache_errors: usize,
}

impl BuildSummary {
    pub fn from_outcomes(outcomes: &[&BuildOutcome]) -> Self {
        let mut s = Self::default();
        for outcome in outcomes {
            s.total += 1;
            match outcome.status() {
                RuleStatus::Succeeded => s.succeeded += 1,
                RuleStatus::Failed => s.failed += 1,
            }
            match outcome.cache_outcome() {
                CacheOutcome::LocalHit | CacheOutcome::RemoteHit => s.cache_hits += 1,
                CacheOutcome::Miss => s.cache_misses += 1,
                CacheOutcome::Skipped => s.cache_skipped += 1,
                CacheOutcome::Error => s.cache_errors += 1,
            }
        }
        for provenance in successes(outcomes.iter().copied()) {
            match provenance {
                SuccessProvenance::BuiltLocally => s.built_locally += 1,
                SuccessProvenance::FetchedFromCache => s.fetched_from_cache += 1,
                SuccessProvenance::MatchingRuleKey => s.matching_rule_key += 1,
            }
        }
        s
    }
}

/// What the CLI prints (or writes) after a build.
#[derive(Clone, Debug, Serialize)]
pub struct BuildReport {
    pub run_id: RunId,
    pub succeeded: bool,
    pub cancelled: bool,
    pub summary: BuildSummary,
    pub rules: Vec<RuleReport>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub unsettled: Vec<RuleId>,
}

impl BuildReport {
    pub fn from_run(run: &BuildRun) -> Self {
        let outcomes: Vec<&BuildOutcome> = run.outcomes.iter().map(|o| o.as_ref()).collect();
        let mut summary = BuildSummary::from_outcomes(&outcomes);
        summary.unsettled = run.unsettled.len();
        Self {
            run_id: run.run_id.clone(),
            succeeded: run.succeeded(),
            cancelled: run.cancelled,
            summary,
            rules: outcomes.iter().map(|o| RuleReport::from_outcome(o)).collect(),
            unsettled: run.unsettled.clone(),
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn render_human(&self) -> String {
        let mut out = String::new();
        for rule in &self.rules {
            let _ = match (rule.status, rule.provenance) {
                (RuleStatus::Succeeded, Some(p)) => writeln!(out, "ok     {} ({}, cache {})", rule.rule, describe(p), rule.cache),
                (RuleStatus::Succeeded, None) => writeln!(out, "ok     {} (cache {})", rule.rule, rule.cache),
                (RuleStatus::Failed, _) => writeln!(out, "FAILED {}", rule.rule),
            };
            for (depth, message) in rule.failure.iter().enumerate() {
                let _ = writeln!(out, "       {}{}", "  ".repeat(depth), message);
            }
        }
        for rule in &self.unsettled {
            let _ = writeln!(out, "skip   {} (not settled)", rule);
        }

        let s = &self.summary;
        let _ = writeln!(
            out,
            "\n{} rules: {} succeeded, {} failed, {} not settled",
            s.total + s.unsettled,
            s.succeeded,
            s.failed,
            s.unsettled
        );
        let _ = writeln!(
            out,
            "built {}, fetched {}, unchanged {}; cache hits {}, misses {}, skipped {}, errors {}",
            s.built_locally, s.fetched_from_cache, s.matching_rule_key, s.cache_hits, s.cache_misses, s.cache_skipped, s.cache_errors
        );
        if self.cancelled {
            out.push_str("build cancelled\n");
        }
        out
    }
}

fn describe(provenance: SuccessProvenance) -> &'static str {
    match provenance {
        SuccessProvenance::BuiltLocally => "built",
        SuccessProvenance::FetchedFromCache => "fetched",
        SuccessProvenance::MatchingRuleKey => "unchanged",
    }
}
