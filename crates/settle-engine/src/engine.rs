use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use anyhow::Result;
use settle_cache::{CacheLookup, CacheTiers, RuleKey, RuleKeyLedger};
use settle_core::{
    BuildOutcome, CacheOutcome, FailureCause, OutcomeTable, Rejected, RuleId, RuleStatus, RunId, SettleError,
    Settler, SuccessProvenance,
};

use crate::action::BuildAction;
use crate::graph::BuildGraph;
use crate::Config;

/// Whether dependents of this outcome may run. Only the coarse status counts.
pub fn may_proceed(dep: &BuildOutcome) -> bool {
    match dep.status() {
        RuleStatus::Succeeded => true,
        RuleStatus::Failed => false,
    }
}

/// Whether the artifact behind this outcome should be written to the cache:
/// successful, not itself a cache hit, and built rather than reused.
pub fn should_populate_cache(outcome: &BuildOutcome) -> bool {
    match outcome.status() {
        RuleStatus::Failed => false,
        RuleStatus::Succeeded => {
            !outcome.cache_outcome().is_hit()
                && outcome
                    .success_provenance()
                    .map_or(false, SuccessProvenance::should_upload_artifact)
        }
    }
}

/// Stops a running build from another thread.
#[derive(Clone)]
pub struct CancelHandle(Arc<OutcomeTable>);

impl CancelHandle {
    pub fn cancel(&self) {
        self.0.cancel();
    }
}

/// Everything a finished (or cancelled) run settled.
#[derive(Clone, Debug)]
pub struct BuildRun {
    pub run_id: RunId,
    /// Settled outcomes, dependencies before dependents.
    pub outcomes: Vec<Arc<BuildOutcome>>,
    /// Scheduled rules that never settled because the run was cancelled.
    pub unsettled: Vec<RuleId>,
    pub cancelled: bool,
}

impl BuildRun {
    pub fn outcome(&self, rule: &RuleId) -> Option<&Arc<BuildOutcome>> {
        self.outcomes.iter().find(|o| o.rule() == rule)
    }

    pub fn failures(&self) -> impl Iterator<Item = &Arc<BuildOutcome>> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    pub fn succeeded(&self) -> bool {
        !self.cancelled && self.unsettled.is_empty() && self.outcomes.iter().all(|o| o.is_success())
    }
}

/// One build run. Every rule in the requested closure is settled at most
/// once, by whichever worker claims it first; the others wait on its slot.
pub struct Engine<'a> {
    config: &'a Config,
    graph: &'a BuildGraph,
    action: &'a dyn BuildAction,
    caches: &'a CacheTiers,
    ledger: &'a RuleKeyLedger,
    table: Arc<OutcomeTable>,
    run_id: RunId,
}

impl<'a> Engine<'a> {
    pub fn new(
        config: &'a Config,
        graph: &'a BuildGraph,
        action: &'a dyn BuildAction,
        caches: &'a CacheTiers,
        ledger: &'a RuleKeyLedger,
    ) -> Self {
        Self {
            config,
            graph,
            action,
            caches,
            ledger,
            table: Arc::new(OutcomeTable::new(config.pairing_policy())),
            run_id: RunId::new(),
        }
    }

    pub fn run_id(&self) -> &RunId {
        &self.run_id
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle(self.table.clone())
    }

    pub fn table(&self) -> &OutcomeTable {
        &self.table
    }

    /// Settles `targets` and their dependencies (all rules when empty).
    pub fn run(&self, targets: &[RuleId]) -> Result<BuildRun> {
        let order = self.graph.closure(targets)?;
        for rule in &order {
            self.table.allocate(rule);
        }

        let workers = self.config.engine.workers.clamp(1, order.len().max(1));
        tracing::info!(run_id = %self.run_id, rules = order.len(), workers, "build started");

        let queue = Mutex::new(VecDeque::from(order.clone()));
        std::thread::scope(|s| {
            for worker in 0..workers {
                let queue = &queue;
                s.spawn(move || self.work(worker, queue));
            }
        });

        let outcomes: Vec<_> = order.iter().filter_map(|r| self.table.get(r)).collect();
        let run = BuildRun {
            run_id: self.run_id.clone(),
            outcomes,
            unsettled: self.table.unsettled(),
            cancelled: self.table.is_cancelled(),
        };
        tracing::info!(
            run_id = %run.run_id,
            settled = run.outcomes.len(),
            failed = run.failures().count(),
            unsettled = run.unsettled.len(),
            cancelled = run.cancelled,
            "build finished"
        );
        Ok(run)
    }

    fn work(&self, worker: usize, queue: &Mutex<VecDeque<RuleId>>) {
        loop {
            if self.table.is_cancelled() {
                return;
            }
            let next = queue.lock().unwrap_or_else(PoisonError::into_inner).pop_front();
            let Some(rule) = next else {
                return;
            };
            match self.settle(&rule) {
                Ok(_) => {}
                Err(SettleError::Cancelled(_)) => return,
                Err(e) => tracing::error!(worker, rule = %rule, error = %e, "could not settle rule"),
            }
        }
    }

    /// The rule's published outcome, settling it first if nobody has.
    pub fn settle(&self, rule: &RuleId) -> Result<Arc<BuildOutcome>, SettleError> {
        self.table.settle_once(rule, |settler| self.resolve(settler))
    }

    fn resolve(&self, settler: Settler) -> Result<Arc<BuildOutcome>, SettleError> {
        let rule = settler.rule().clone();
        let Some(spec) = self.graph.rule(&rule) else {
            let cause = FailureCause::new(format!("rule {rule} is not part of the build graph"))?;
            return Ok(self.finish_failure(settler, cause));
        };

        let mut deps = Vec::with_capacity(spec.deps.len());
        for dep in &spec.deps {
            // Cancellation here drops the settler and leaves the rule unsettled.
            let outcome = self.settle(dep)?;
            if !may_proceed(&outcome) {
                let mut cause = FailureCause::new(format!("dependency {dep} failed"))?;
                if let Some(inner) = outcome.failure_cause() {
                    cause = cause.with_cause(inner.clone());
                }
                return Ok(self.finish_failure(settler, cause));
            }
            deps.push(outcome);
        }

        if self.table.is_cancelled() {
            return Err(SettleError::Cancelled(rule));
        }

        let key = spec.cache_key();
        if let Some(key) = &key {
            if self.ledger.matches(&rule, key) {
                return self.finish_success(settler, SuccessProvenance::MatchingRuleKey, CacheOutcome::Skipped);
            }
        }

        let lookup = match &key {
            Some(key) => self.caches.lookup(key),
            None => CacheLookup {
                outcome: CacheOutcome::Skipped,
                artifact: None,
            },
        };
        let mut cache = lookup.outcome;
        if let (Some(key), Some(artifact)) = (&key, lookup.artifact.as_ref()) {
            match self.action.restore(spec, artifact) {
                Ok(()) => {
                    let outcome = self.finish_success(settler, SuccessProvenance::FetchedFromCache, cache)?;
                    if outcome.is_success() {
                        self.record_key(&rule, key);
                    }
                    return Ok(outcome);
                }
                Err(e) => {
                    tracing::warn!(rule = %rule, error = %e, "could not restore cached artifact; building instead");
                    cache = CacheOutcome::Error;
                }
            }
        }

        match self.action.build(spec, &deps) {
            Ok(artifact) => {
                let outcome = self.finish_success(settler, SuccessProvenance::BuiltLocally, cache)?;
                if let Some(key) = &key {
                    if should_populate_cache(&outcome) {
                        let stored = self.caches.populate(key, &artifact);
                        tracing::debug!(rule = %rule, tiers = stored, "cache populated");
                    }
                    if outcome.is_success() {
                        self.record_key(&rule, key);
                    }
                }
                Ok(outcome)
            }
            Err(e) => {
                if let Err(e) = self.ledger.forget(&rule) {
                    tracing::warn!(rule = %rule, error = %e, "could not clear rule key");
                }
                let cause = FailureCause::from_error(&e.context(format!("building {rule}")));
                Ok(self.finish_failure(settler, cause))
            }
        }
    }

    fn record_key(&self, rule: &RuleId, key: &RuleKey) {
        if let Err(e) = self.ledger.record(rule, key) {
            tracing::warn!(rule = %rule, error = %e, "could not record rule key");
        }
    }

    fn finish_success(
        &self,
        settler: Settler,
        provenance: SuccessProvenance,
        cache: CacheOutcome,
    ) -> Result<Arc<BuildOutcome>, SettleError> {
        match settler.succeed(provenance, cache) {
            Ok(outcome) => {
                tracing::info!(
                    rule = %outcome.rule(),
                    %provenance,
                    %cache,
                    "rule succeeded"
                );
                Ok(outcome)
            }
            Err(Rejected { settler, error }) => {
                let cause = FailureCause::new(error.to_string())?;
                Ok(self.finish_failure(settler, cause))
            }
        }
    }

    fn finish_failure(&self, settler: Settler, cause: FailureCause) -> Arc<BuildOutcome> {
        let outcome = settler.fail(cause);
        tracing::warn!(
            rule = %outcome.rule(),
            cause = outcome.failure_cause().map(|c| c.message()).unwrap_or_default(),
            "rule failed"
        );
        if !self.config.engine.keep_going {
            self.table.cancel();
        }
        outcome
    }
}
