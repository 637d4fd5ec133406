//! forktree library
//!
//! Bounded, randomized recursive process spawning. Every process consults a
//! counter kept in an anonymous shared segment under a process-shared mutex
//! before it forks, records itself in an append-only spawn log, and the root
//! rebuilds and prints the resulting tree once its subtree has exited.
//!
//! Unix only: the design depends on `fork` inheriting the shared mapping and
//! the log descriptor.

pub mod commands;
pub mod config;
pub mod core;
pub mod error;
pub mod logging;
pub mod platform;
pub mod supervisor;
pub mod utils;

// Re-export commonly used types for convenience
pub use config::RunConfig;
pub use crate::core::models::{ProcessTree, SpawnLimits, SpawnRecord, TreeStats};
pub use crate::core::process_tree::{build, render};
pub use crate::core::shared_counter::{CounterGuard, SharedCounter};
pub use crate::core::spawn_log::SpawnLog;
pub use crate::core::spawner::{Creation, ProcessCreator, SpawnOutcome, Spawner};
pub use error::{ForkTreeError, ForkTreeResult};
pub use supervisor::RunReport;
