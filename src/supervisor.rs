//! Root-side orchestration of a run
//!
//! Sets up the shared resources, drives the root's branch of the spawner,
//! releases the segment and, as the display owner, reconstructs and prints
//! the tree. Descendants never return here.

use crate::config::RunConfig;
use crate::core::models::{ProcessTree, SpawnRecord, TreeStats, ROOT_REGISTRATION};
use crate::core::process_tree::{build_from_path, render};
use crate::core::shared_counter::SharedCounter;
use crate::core::spawn_log::SpawnLog;
use crate::core::spawner::Spawner;
use crate::error::{ForkTreeError, ForkTreeResult};
use crate::logging::{info, warn};
use crate::platform::ForkCreator;
use chrono::{DateTime, Utc};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Outcome of a completed run, only ever produced in the root.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub root: SpawnRecord,
    pub final_count: u64,
    pub tree: ProcessTree,
    pub stats: TreeStats,
    pub log_file: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn summary(&self) -> String {
        let elapsed = self.finished_at.signed_duration_since(self.started_at);
        format!(
            "root {}: {}; counter={} in {}ms",
            self.root.child,
            self.stats,
            self.final_count,
            elapsed.num_milliseconds()
        )
    }
}

/// Spawn the tree, wait for it, then render it to `out`.
pub fn run<W: Write>(config: &RunConfig, out: &mut W) -> ForkTreeResult<RunReport> {
    config.validate()?;
    let started_at = Utc::now();

    let log = SpawnLog::create(&config.log_file)?;
    let mut counter = SharedCounter::allocate(ROOT_REGISTRATION)?;

    let summary = {
        let spawner = Spawner::new(&counter, &log, ForkCreator, config.limits());
        let summary = spawner.run_root()?;
        if !spawner.is_display_owner() {
            // unreachable with a fork-backed creator: descendants terminate
            // inside the spawner
            return Err(ForkTreeError::sync(
                "display",
                "descendant reached the root's display path",
            ));
        }
        summary
    };
    counter.release()?;

    let tree = build_from_path(log.path())?;
    render(&tree, out).map_err(|err| ForkTreeError::io("render tree", "<stdout>", err))?;

    let stats = tree.stats();
    if stats.spawned as u64 + 1 != summary.final_count {
        warn(format!(
            "log lists {} spawned processes but the counter admitted {}",
            stats.spawned,
            summary.final_count.saturating_sub(1)
        ));
    }

    let report = RunReport {
        root: summary.identity,
        final_count: summary.final_count,
        tree,
        stats,
        log_file: log.path().to_path_buf(),
        started_at,
        finished_at: Utc::now(),
    };
    info(report.summary());

    if config.cleanup_log {
        cleanup_log(log.path())?;
    }

    Ok(report)
}

/// Rebuild and render an existing spawn log.
pub fn show<W: Write>(log_file: &Path, out: &mut W) -> ForkTreeResult<TreeStats> {
    let tree = build_from_path(log_file)?;
    render(&tree, out).map_err(|err| ForkTreeError::io("render tree", "<stdout>", err))?;
    Ok(tree.stats())
}

fn cleanup_log(path: &Path) -> ForkTreeResult<()> {
    std::fs::remove_file(path).map_err(|err| ForkTreeError::io("remove spawn log", path, err))
}
