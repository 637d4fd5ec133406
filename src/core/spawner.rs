//! Bounded recursive spawner
//!
//! Every process in a run executes the same branching step,
//! [`Spawner::decide_and_spawn`], coordinated only through the shared
//! counter. There is no central coordinator: the root starts the chain and
//! each newborn decides on its own how many further rounds to run.

use crate::core::models::{SpawnLimits, SpawnRecord};
use crate::core::shared_counter::SharedCounter;
use crate::core::spawn_log::SpawnLog;
use crate::error::{ForkTreeError, ForkTreeResult};
use crate::logging::{debug, error};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::cell::Cell;

/// Which side of the process-creation primitive the caller ended up on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Creation {
    /// The calling process; `child` is the new process's id
    Original { child: u32 },
    /// The freshly created process
    New,
}

/// Process creation, identity and reaping, injectable for tests.
pub trait ProcessCreator {
    fn create(&self) -> ForkTreeResult<Creation>;

    /// `(parent id, own id)` of the calling process.
    fn identity(&self) -> SpawnRecord;

    /// Block until `child` terminates; abnormal termination is an error.
    fn wait(&self, child: u32) -> ForkTreeResult<()>;

    /// End the calling process without returning to its caller.
    fn terminate(&self, code: i32) -> !;
}

/// Result of one branching step, as seen by the process that returns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// The ceiling was reached; nothing was created
    Leaf,
    /// A child was created and is now running the descendant branch
    SpawnedOne { child: u32 },
    /// The caller is the new process; `counter_snapshot` is the count at its admission
    Newborn { counter_snapshot: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// Initiating process; owns the console and the final display
    Root,
    Descendant,
}

/// What the root observed once its subtree finished.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpawnSummary {
    pub identity: SpawnRecord,
    pub direct_children: Vec<u32>,
    pub final_count: u64,
}

pub struct Spawner<'a, C: ProcessCreator> {
    counter: &'a SharedCounter,
    log: &'a SpawnLog,
    creator: C,
    limits: SpawnLimits,
    role: Cell<Role>,
}

impl<'a, C: ProcessCreator> Spawner<'a, C> {
    pub fn new(
        counter: &'a SharedCounter,
        log: &'a SpawnLog,
        creator: C,
        limits: SpawnLimits,
    ) -> Self {
        Self {
            counter,
            log,
            creator,
            limits,
            role: Cell::new(Role::Root),
        }
    }

    pub fn role(&self) -> Role {
        self.role.get()
    }

    /// Only the root prints; descendants stay silent on stdout.
    pub fn is_display_owner(&self) -> bool {
        self.role.get() == Role::Root
    }

    /// One branching step.
    ///
    /// Under the lock: stop if the ceiling is reached, otherwise admit one
    /// more process and remember the new count. The lock is released before
    /// the process is created so no process ever forks while holding it.
    pub fn decide_and_spawn(&self) -> ForkTreeResult<SpawnOutcome> {
        let mut guard = self.counter.acquire()?;
        if guard.get() >= self.limits.max_processes {
            guard.release()?;
            return Ok(SpawnOutcome::Leaf);
        }
        let counter_snapshot = guard.increment();
        guard.release()?;

        match self.creator.create()? {
            Creation::Original { child } => {
                debug(format!("created child {} (admitted #{})", child, counter_snapshot));
                Ok(SpawnOutcome::SpawnedOne { child })
            }
            Creation::New => {
                self.role.set(Role::Descendant);
                Ok(SpawnOutcome::Newborn { counter_snapshot })
            }
        }
    }

    /// Entry point for the initiating process.
    ///
    /// Logs the bootstrap record, runs a single branching step and reaps the
    /// resulting child. Returns only in the root; the new process continues
    /// in the descendant branch and terminates there.
    pub fn run_root(&self) -> ForkTreeResult<SpawnSummary> {
        let identity = self.creator.identity();
        self.log.append(&identity)?;

        let direct_children: Vec<u32> = self.spawn_round()?.into_iter().collect();
        self.reap(&direct_children)?;

        let guard = self.counter.acquire()?;
        let final_count = guard.get();
        guard.release()?;

        Ok(SpawnSummary {
            identity,
            direct_children,
            final_count,
        })
    }

    /// Run one branching step, diverting into the descendant branch when the
    /// caller turns out to be the new process.
    fn spawn_round(&self) -> ForkTreeResult<Option<u32>> {
        match self.decide_and_spawn()? {
            SpawnOutcome::Leaf => Ok(None),
            SpawnOutcome::SpawnedOne { child } => Ok(Some(child)),
            SpawnOutcome::Newborn { counter_snapshot } => self.descend(counter_snapshot),
        }
    }

    fn descend(&self, counter_snapshot: u64) -> ! {
        let code = match self.run_newborn(counter_snapshot) {
            Ok(children) => {
                debug(format!("subtree done, {} direct children", children.len()));
                0
            }
            Err(err) => {
                error(format!("descendant aborting: {}", err));
                1
            }
        };
        self.creator.terminate(code)
    }

    /// Body of a newborn: pick a fan-out, log itself, spawn, reap.
    ///
    /// The clamp works from the snapshot taken at admission, which may be
    /// stale by now; every round is still checked against the live counter.
    pub fn run_newborn(&self, counter_snapshot: u64) -> ForkTreeResult<Vec<u32>> {
        let mut rng = StdRng::from_entropy();
        let drawn = choose_fan_out(&mut rng, &self.limits);
        let fan_out = clamp_fan_out(drawn, counter_snapshot, self.limits.max_processes);

        let identity = self.creator.identity();
        self.log.append(&identity)?;
        debug(format!(
            "registered under {} (snapshot {}, fan-out {} of {})",
            identity.parent, counter_snapshot, fan_out, drawn
        ));

        let mut children = Vec::new();
        for _ in 0..fan_out {
            match self.spawn_round()? {
                Some(child) => children.push(child),
                None => break,
            }
        }

        self.reap(&children)?;
        Ok(children)
    }

    /// Wait for every child, reporting the first failure after all are reaped.
    fn reap(&self, children: &[u32]) -> ForkTreeResult<()> {
        let mut first_failure: Option<ForkTreeError> = None;
        for &child in children {
            if let Err(err) = self.creator.wait(child) {
                first_failure.get_or_insert(err);
            }
        }
        match first_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

/// Uniform draw from the inclusive `[min_spawn, max_spawn]` range.
pub fn choose_fan_out<R: Rng + ?Sized>(rng: &mut R, limits: &SpawnLimits) -> u64 {
    rng.gen_range(limits.min_spawn..=limits.max_spawn)
}

/// Shrink `fan_out` until `fan_out + counter_snapshot` fits under the ceiling.
pub fn clamp_fan_out(fan_out: u64, counter_snapshot: u64, max_processes: u64) -> u64 {
    fan_out.min(max_processes.saturating_sub(counter_snapshot))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashSet;

    /// Always lands on the original side and hands out increasing pids.
    struct ScriptedCreator {
        next_pid: Cell<u32>,
        identity: SpawnRecord,
        waited: RefCell<Vec<u32>>,
        failing: HashSet<u32>,
    }

    impl ScriptedCreator {
        fn new() -> Self {
            Self {
                next_pid: Cell::new(1000),
                identity: SpawnRecord::new(1, 500),
                waited: RefCell::new(Vec::new()),
                failing: HashSet::new(),
            }
        }
    }

    impl ProcessCreator for &ScriptedCreator {
        fn create(&self) -> ForkTreeResult<Creation> {
            let child = self.next_pid.get();
            self.next_pid.set(child + 1);
            Ok(Creation::Original { child })
        }

        fn identity(&self) -> SpawnRecord {
            self.identity
        }

        fn wait(&self, child: u32) -> ForkTreeResult<()> {
            self.waited.borrow_mut().push(child);
            if self.failing.contains(&child) {
                return Err(ForkTreeError::DescendantFailed {
                    pid: child,
                    status: "exit code 1".to_string(),
                });
            }
            Ok(())
        }

        fn terminate(&self, code: i32) -> ! {
            panic!("scripted creator never becomes the new process (code {code})")
        }
    }

    fn limits(max_processes: u64, min_spawn: u64, max_spawn: u64) -> SpawnLimits {
        SpawnLimits {
            max_processes,
            min_spawn,
            max_spawn,
        }
    }

    fn fixture() -> (tempfile::TempDir, SpawnLog, SharedCounter) {
        let dir = tempfile::tempdir().expect("failed to create temp dir");
        let log = SpawnLog::create(dir.path().join("out.txt")).unwrap();
        let counter = SharedCounter::allocate(1).unwrap();
        (dir, log, counter)
    }

    fn counter_value(counter: &SharedCounter) -> u64 {
        counter.acquire().unwrap().get()
    }

    #[test]
    fn ceiling_of_one_makes_root_a_leaf() {
        let (_dir, log, counter) = fixture();
        let creator = ScriptedCreator::new();
        let spawner = Spawner::new(&counter, &log, &creator, limits(1, 1, 3));

        let summary = spawner.run_root().unwrap();

        assert!(summary.direct_children.is_empty());
        assert_eq!(summary.final_count, 1);
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "1,500\n");
        assert!(spawner.is_display_owner());
    }

    #[test]
    fn admits_until_ceiling_then_leafs() {
        let (_dir, log, counter) = fixture();
        let creator = ScriptedCreator::new();
        let spawner = Spawner::new(&counter, &log, &creator, limits(5, 1, 3));

        let mut outcomes = Vec::new();
        loop {
            let outcome = spawner.decide_and_spawn().unwrap();
            outcomes.push(outcome);
            if outcome == SpawnOutcome::Leaf {
                break;
            }
        }

        assert_eq!(
            outcomes,
            vec![
                SpawnOutcome::SpawnedOne { child: 1000 },
                SpawnOutcome::SpawnedOne { child: 1001 },
                SpawnOutcome::SpawnedOne { child: 1002 },
                SpawnOutcome::SpawnedOne { child: 1003 },
                SpawnOutcome::Leaf,
            ]
        );
        assert_eq!(counter_value(&counter), 5);
    }

    #[test]
    fn leaf_path_releases_the_lock_and_keeps_counter() {
        let (_dir, log, counter) = fixture();
        let creator = ScriptedCreator::new();
        let spawner = Spawner::new(&counter, &log, &creator, limits(1, 1, 1));

        for _ in 0..3 {
            assert_eq!(spawner.decide_and_spawn().unwrap(), SpawnOutcome::Leaf);
        }
        assert_eq!(counter_value(&counter), 1);
    }

    #[test]
    fn root_reaps_its_single_direct_child() {
        let (_dir, log, counter) = fixture();
        let creator = ScriptedCreator::new();
        let spawner = Spawner::new(&counter, &log, &creator, limits(20, 1, 3));

        let summary = spawner.run_root().unwrap();

        assert_eq!(summary.direct_children, vec![1000]);
        assert_eq!(*creator.waited.borrow(), vec![1000]);
        assert_eq!(summary.final_count, 2);
        assert_eq!(summary.identity, SpawnRecord::new(1, 500));
    }

    #[test]
    fn newborn_logs_itself_before_spawning_and_reaps_all() {
        let (_dir, log, counter) = fixture();
        let creator = ScriptedCreator::new();
        let spawner = Spawner::new(&counter, &log, &creator, limits(20, 3, 3));

        let children = spawner.run_newborn(2).unwrap();

        assert_eq!(children, vec![1000, 1001, 1002]);
        assert_eq!(*creator.waited.borrow(), children);
        assert_eq!(std::fs::read_to_string(log.path()).unwrap(), "1,500\n");
        assert_eq!(counter_value(&counter), 4);
    }

    #[test]
    fn newborn_fan_out_is_clamped_by_snapshot() {
        let (_dir, log, counter) = fixture();
        let creator = ScriptedCreator::new();
        let spawner = Spawner::new(&counter, &log, &creator, limits(20, 3, 3));

        // admitted as #19 of 20: only one more slot is worth trying
        let children = spawner.run_newborn(19).unwrap();
        assert_eq!(children.len(), 1);
    }

    #[test]
    fn newborn_stops_at_live_ceiling_despite_stale_snapshot() {
        let (_dir, log, counter) = fixture();
        {
            let mut guard = counter.acquire().unwrap();
            guard.set(9);
        }
        let creator = ScriptedCreator::new();
        let spawner = Spawner::new(&counter, &log, &creator, limits(10, 3, 3));

        // snapshot says plenty of room, the live counter disagrees
        let children = spawner.run_newborn(2).unwrap();
        assert_eq!(children, vec![1000]);
        assert_eq!(counter_value(&counter), 10);
    }

    #[test]
    fn failed_child_is_reported_after_reaping_siblings() {
        let (_dir, log, counter) = fixture();
        let mut creator = ScriptedCreator::new();
        creator.failing.insert(1000);
        let spawner = Spawner::new(&counter, &log, &creator, limits(20, 2, 2));

        let err = spawner.run_newborn(1).unwrap_err();

        assert!(matches!(err, ForkTreeError::DescendantFailed { pid: 1000, .. }));
        assert_eq!(*creator.waited.borrow(), vec![1000, 1001]);
    }

    #[test]
    fn fan_out_draw_covers_inclusive_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let limits = limits(20, 1, 3);
        let draws: HashSet<u64> = (0..500).map(|_| choose_fan_out(&mut rng, &limits)).collect();
        assert_eq!(draws, HashSet::from([1, 2, 3]));
    }

    #[test]
    fn fixed_range_always_draws_that_value() {
        let mut rng = StdRng::seed_from_u64(1);
        let limits = limits(20, 2, 2);
        assert!((0..50).all(|_| choose_fan_out(&mut rng, &limits) == 2));
    }

    #[test]
    fn clamp_keeps_total_under_ceiling() {
        assert_eq!(clamp_fan_out(3, 10, 20), 3);
        assert_eq!(clamp_fan_out(3, 18, 20), 2);
        assert_eq!(clamp_fan_out(3, 20, 20), 0);
        assert_eq!(clamp_fan_out(3, 25, 20), 0);
        assert_eq!(clamp_fan_out(0, 1, 20), 0);
    }
}
