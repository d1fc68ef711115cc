use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError, RwLock};

use crate::{BuildOutcome, CacheOutcome, FailureCause, PairingPolicy, RuleId, SettleError, SuccessProvenance};

/// Index of a rule's slot in an [`OutcomeTable`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SlotId(usize);

impl SlotId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug)]
enum Phase {
    Open,
    Claimed,
    Settled(Arc<BuildOutcome>),
}

#[derive(Debug)]
struct Slot {
    rule: RuleId,
    phase: Mutex<Phase>,
    gate: Condvar,
}

#[derive(Debug, Default)]
struct Arena {
    index: HashMap<RuleId, SlotId>,
    slots: Vec<Arc<Slot>>,
}

#[derive(Debug)]
struct Shared {
    cancelled: AtomicBool,
    policy: PairingPolicy,
}

// Slot state is a plain enum assignment, so a poisoned lock still holds a
// consistent value.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Result of trying to become the producer of a rule's outcome.
#[derive(Debug)]
pub enum Claim {
    /// The caller is the only producer; it must settle or drop the settler.
    Won(Settler),
    /// Another caller holds the settler right now.
    InFlight,
    Settled(Arc<BuildOutcome>),
}

/// Per-run table of published outcomes, one write-once slot per rule.
///
/// Slots are allocated when a rule is first scheduled and never removed.
/// Readers either get the published `Arc` or block on the slot's gate until
/// it is published or the run is cancelled.
#[derive(Debug)]
pub struct OutcomeTable {
    arena: RwLock<Arena>,
    shared: Arc<Shared>,
}

impl Default for OutcomeTable {
    fn default() -> Self {
        Self::new(PairingPolicy::default())
    }
}

impl OutcomeTable {
    pub fn new(policy: PairingPolicy) -> Self {
        Self {
            arena: RwLock::new(Arena::default()),
            shared: Arc::new(Shared {
                cancelled: AtomicBool::new(false),
                policy,
            }),
        }
    }

    pub fn policy(&self) -> &PairingPolicy {
        &self.shared.policy
    }

    pub fn allocate(&self, rule: &RuleId) -> SlotId {
        if let Some(id) = self.slot_id(rule) {
            return id;
        }
        let mut arena = self.arena.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = arena.index.get(rule) {
            return *id;
        }
        let id = SlotId(arena.slots.len());
        arena.slots.push(Arc::new(Slot {
            rule: rule.clone(),
            phase: Mutex::new(Phase::Open),
            gate: Condvar::new(),
        }));
        arena.index.insert(rule.clone(), id);
        id
    }

    pub fn slot_id(&self, rule: &RuleId) -> Option<SlotId> {
        let arena = self.arena.read().unwrap_or_else(PoisonError::into_inner);
        arena.index.get(rule).copied()
    }

    pub fn len(&self) -> usize {
        self.arena.read().unwrap_or_else(PoisonError::into_inner).slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot(&self, rule: &RuleId) -> Result<Arc<Slot>, SettleError> {
        let arena = self.arena.read().unwrap_or_else(PoisonError::into_inner);
        arena
            .index
            .get(rule)
            .map(|id| arena.slots[id.0].clone())
            .ok_or_else(|| SettleError::UnknownRule(rule.clone()))
    }

    pub fn try_claim(&self, rule: &RuleId) -> Result<Claim, SettleError> {
        let slot = self.slot(rule)?;
        self.claim_slot(slot)
    }

    fn claim_slot(&self, slot: Arc<Slot>) -> Result<Claim, SettleError> {
        let mut phase = lock(&slot.phase);
        if let Phase::Settled(outcome) = &*phase {
            return Ok(Claim::Settled(outcome.clone()));
        }
        if matches!(*phase, Phase::Claimed) {
            return Ok(Claim::InFlight);
        }
        if self.is_cancelled() {
            return Err(SettleError::Cancelled(slot.rule.clone()));
        }
        *phase = Phase::Claimed;
        drop(phase);
        Ok(Claim::Won(Settler {
            slot,
            shared: self.shared.clone(),
            published: false,
        }))
    }

    /// Returns the rule's outcome, producing it with `produce` if no other
    /// caller has claimed it. Every caller observes the same `Arc`.
    pub fn settle_once<F>(&self, rule: &RuleId, produce: F) -> Result<Arc<BuildOutcome>, SettleError>
    where
        F: FnOnce(Settler) -> Result<Arc<BuildOutcome>, SettleError>,
    {
        self.allocate(rule);
        let slot = self.slot(rule)?;
        loop {
            match self.claim_slot(slot.clone())? {
                Claim::Won(settler) => return produce(settler),
                Claim::Settled(outcome) => return Ok(outcome),
                Claim::InFlight => {
                    // `None` means the producer gave up; try to claim again.
                    if let Some(outcome) = self.await_release(&slot)? {
                        return Ok(outcome);
                    }
                }
            }
        }
    }

    fn await_release(&self, slot: &Slot) -> Result<Option<Arc<BuildOutcome>>, SettleError> {
        let mut phase = lock(&slot.phase);
        loop {
            match &*phase {
                Phase::Settled(outcome) => return Ok(Some(outcome.clone())),
                Phase::Open => return Ok(None),
                Phase::Claimed => {}
            }
            if self.is_cancelled() {
                return Err(SettleError::Cancelled(slot.rule.clone()));
            }
            phase = slot.gate.wait(phase).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Blocks until the rule's outcome is published.
    pub fn wait(&self, rule: &RuleId) -> Result<Arc<BuildOutcome>, SettleError> {
        let slot = self.slot(rule)?;
        let mut phase = lock(&slot.phase);
        loop {
            if let Phase::Settled(outcome) = &*phase {
                return Ok(outcome.clone());
            }
            if self.is_cancelled() {
                return Err(SettleError::Cancelled(rule.clone()));
            }
            phase = slot.gate.wait(phase).unwrap_or_else(PoisonError::into_inner);
        }
    }

    pub fn get(&self, rule: &RuleId) -> Option<Arc<BuildOutcome>> {
        let slot = self.slot(rule).ok()?;
        let phase = lock(&slot.phase);
        match &*phase {
            Phase::Settled(outcome) => Some(outcome.clone()),
            Phase::Open | Phase::Claimed => None,
        }
    }

    /// Published outcomes in allocation order.
    pub fn outcomes(&self) -> Vec<Arc<BuildOutcome>> {
        let slots = self.arena.read().unwrap_or_else(PoisonError::into_inner).slots.clone();
        slots
            .iter()
            .filter_map(|slot| match &*lock(&slot.phase) {
                Phase::Settled(outcome) => Some(outcome.clone()),
                Phase::Open | Phase::Claimed => None,
            })
            .collect()
    }

    /// Rules that were scheduled but never settled.
    pub fn unsettled(&self) -> Vec<RuleId> {
        let slots = self.arena.read().unwrap_or_else(PoisonError::into_inner).slots.clone();
        slots
            .iter()
            .filter(|slot| !matches!(&*lock(&slot.phase), Phase::Settled(_)))
            .map(|slot| slot.rule.clone())
            .collect()
    }

    /// Stops new claims and wakes every waiter. Published outcomes stay.
    pub fn cancel(&self) {
        if self.shared.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::info!("build run cancelled");
        let slots = self.arena.read().unwrap_or_else(PoisonError::into_inner).slots.clone();
        for slot in slots {
            // Taking the lock orders the flag store before any waiter re-checks it.
            let _phase = lock(&slot.phase);
            slot.gate.notify_all();
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::SeqCst)
    }
}

/// The capability to publish one rule's outcome. Only an [`OutcomeTable`]
/// hands these out, one per slot at a time.
#[derive(Debug)]
pub struct Settler {
    slot: Arc<Slot>,
    shared: Arc<Shared>,
    published: bool,
}

/// A success the pairing policy refused. The settler comes back unused.
#[derive(Debug)]
pub struct Rejected {
    pub settler: Settler,
    pub error: SettleError,
}

impl Settler {
    pub fn rule(&self) -> &RuleId {
        &self.slot.rule
    }

    pub fn succeed(self, provenance: SuccessProvenance, cache: CacheOutcome) -> Result<Arc<BuildOutcome>, Rejected> {
        if let Err(error) = self.shared.policy.check(provenance, cache) {
            return Err(Rejected { settler: self, error });
        }
        let outcome = BuildOutcome::success(self.slot.rule.clone(), provenance, cache);
        Ok(self.publish(outcome))
    }

    pub fn fail(self, cause: FailureCause) -> Arc<BuildOutcome> {
        let outcome = BuildOutcome::failed(self.slot.rule.clone(), cause);
        self.publish(outcome)
    }

    fn publish(mut self, outcome: BuildOutcome) -> Arc<BuildOutcome> {
        let outcome = Arc::new(outcome);
        *lock(&self.slot.phase) = Phase::Settled(outcome.clone());
        self.published = true;
        self.slot.gate.notify_all();
        tracing::debug!(
            rule = %self.slot.rule,
            status = %outcome.status(),
            cache = %outcome.cache_outcome(),
            "outcome published"
        );
        outcome
    }
}

impl Drop for Settler {
    fn drop(&mut self) {
        if self.published {
            return;
        }
        let mut phase = lock(&self.slot.phase);
        if matches!(*phase, Phase::Claimed) {
            *phase = Phase::Open;
        }
        drop(phase);
        self.slot.gate.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn rule(name: &str) -> RuleId {
        RuleId::from_str(name)
    }

    #[test]
    fn allocate_is_idempotent() {
        let table = OutcomeTable::default();
        let a = table.allocate(&rule("//a"));
        let b = table.allocate(&rule("//b"));
        assert_eq!(table.allocate(&rule("//a")), a);
        assert_ne!(a, b);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn unknown_rule_is_an_error() {
        let table = OutcomeTable::default();
        assert_eq!(table.wait(&rule("//nope")).unwrap_err(), SettleError::UnknownRule(rule("//nope")));
        assert!(table.try_claim(&rule("//nope")).is_err());
        assert!(table.get(&rule("//nope")).is_none());
    }

    #[test]
    fn second_claim_sees_in_flight_then_settled() {
        let table = OutcomeTable::default();
        table.allocate(&rule("//a"));
        let settler = match table.try_claim(&rule("//a")).unwrap() {
            Claim::Won(s) => s,
            other => panic!("expected win, got {other:?}"),
        };
        assert!(matches!(table.try_claim(&rule("//a")).unwrap(), Claim::InFlight));
        let published = settler
            .succeed(SuccessProvenance::BuiltLocally, CacheOutcome::Miss)
            .unwrap();
        match table.try_claim(&rule("//a")).unwrap() {
            Claim::Settled(o) => assert!(Arc::ptr_eq(&o, &published)),
            other => panic!("expected settled, got {other:?}"),
        }
    }

    #[test]
    fn concurrent_settlers_produce_exactly_one_outcome() {
        let table = OutcomeTable::default();
        let produced = AtomicUsize::new(0);
        let barrier = Barrier::new(16);
        let r = rule("//lib:shared");

        let results: Vec<Arc<BuildOutcome>> = thread::scope(|s| {
            let handles: Vec<_> = (0..16)
                .map(|_| {
                    s.spawn(|| {
                        barrier.wait();
                        table
                            .settle_once(&r, |settler| {
                                produced.fetch_add(1, Ordering::SeqCst);
                                thread::sleep(Duration::from_millis(10));
                                Ok(settler
                                    .succeed(SuccessProvenance::BuiltLocally, CacheOutcome::Miss)
                                    .unwrap())
                            })
                            .unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(produced.load(Ordering::SeqCst), 1);
        assert!(results.iter().all(|o| Arc::ptr_eq(o, &results[0])));
        assert_eq!(table.outcomes().len(), 1);
    }

    #[test]
    fn waiter_wakes_on_publication() {
        let table = OutcomeTable::default();
        let r = rule("//a");
        table.allocate(&r);
        let settler = match table.try_claim(&r).unwrap() {
            Claim::Won(s) => s,
            other => panic!("expected win, got {other:?}"),
        };
        thread::scope(|s| {
            let waiter = s.spawn(|| table.wait(&r));
            thread::sleep(Duration::from_millis(20));
            settler.fail(FailureCause::new("link error").unwrap());
            let got = waiter.join().unwrap().unwrap();
            assert_eq!(got.failure_cause().map(|c| c.message()), Some("link error"));
        });
    }

    #[test]
    fn dropped_settler_reopens_the_slot() {
        let table = OutcomeTable::default();
        let r = rule("//a");
        table.allocate(&r);
        match table.try_claim(&r).unwrap() {
            Claim::Won(settler) => drop(settler),
            other => panic!("expected win, got {other:?}"),
        }
        assert!(table.get(&r).is_none());
        assert!(matches!(table.try_claim(&r).unwrap(), Claim::Won(_)));
    }

    #[test]
    fn rejected_pairing_returns_the_settler() {
        let table = OutcomeTable::default();
        let r = rule("//a");
        table.allocate(&r);
        let settler = match table.try_claim(&r).unwrap() {
            Claim::Won(s) => s,
            other => panic!("expected win, got {other:?}"),
        };
        let rejected = settler
            .succeed(SuccessProvenance::FetchedFromCache, CacheOutcome::Miss)
            .unwrap_err();
        assert!(matches!(rejected.error, SettleError::InvalidPairing { .. }));
        let outcome = rejected.settler.fail(FailureCause::new(rejected.error.to_string()).unwrap());
        assert!(!outcome.is_success());
        assert_eq!(table.get(&r).as_deref(), Some(&*outcome));
    }

    #[test]
    fn cancel_wakes_waiters_and_keeps_published_outcomes() {
        let table = OutcomeTable::default();
        let done = rule("//done");
        let pending = rule("//pending");
        table.allocate(&done);
        table.allocate(&pending);

        let published = table
            .settle_once(&done, |s| {
                Ok(s.succeed(SuccessProvenance::FetchedFromCache, CacheOutcome::LocalHit).unwrap())
            })
            .unwrap();
        let _holder = match table.try_claim(&pending).unwrap() {
            Claim::Won(s) => s,
            other => panic!("expected win, got {other:?}"),
        };

        thread::scope(|s| {
            let waiter = s.spawn(|| table.wait(&pending));
            thread::sleep(Duration::from_millis(20));
            table.cancel();
            assert_eq!(waiter.join().unwrap().unwrap_err(), SettleError::Cancelled(pending.clone()));
        });

        assert!(table.is_cancelled());
        assert!(Arc::ptr_eq(&table.get(&done).unwrap(), &published));
        assert_eq!(table.wait(&done).unwrap(), published);
        assert_eq!(table.unsettled(), vec![pending]);
    }

    #[test]
    fn no_new_claims_after_cancel() {
        let table = OutcomeTable::default();
        let r = rule("//a");
        table.allocate(&r);
        table.cancel();
        assert_eq!(table.try_claim(&r).unwrap_err(), SettleError::Cancelled(r.clone()));
        let res = table.settle_once(&r, |_| panic!("must not run after cancel"));
        assert_eq!(res.unwrap_err(), SettleError::Cancelled(r));
    }
}
