//! Data model shared by the spawner, the spawn log and the reconstructor

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// Counter value the root starts from: the root is the first admitted process.
pub const ROOT_REGISTRATION: u64 = 1;

/// One edge of the spawn tree, written once by the process it names as `child`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SpawnRecord {
    pub parent: u32,
    pub child: u32,
}

impl SpawnRecord {
    pub fn new(parent: u32, child: u32) -> Self {
        Self { parent, child }
    }

    /// `<parent>,<child>\n`, the on-disk form of a record.
    pub fn to_line(&self) -> String {
        format!("{},{}\n", self.parent, self.child)
    }
}

impl fmt::Display for SpawnRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.parent, self.child)
    }
}

/// Population ceiling and fan-out range for one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpawnLimits {
    pub max_processes: u64,
    pub min_spawn: u64,
    pub max_spawn: u64,
}

/// Parent id to ordered children, rebuilt from a finished spawn log.
///
/// Parents keep the order in which they first appear in the log and every
/// child list keeps log order, so rendering the same log always yields the
/// same text.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessTree {
    root_edge: Option<SpawnRecord>,
    parents: Vec<(u32, Vec<u32>)>,
    index: HashMap<u32, usize>,
    record_count: usize,
}

impl ProcessTree {
    pub fn from_records<I>(records: I) -> Self
    where
        I: IntoIterator<Item = SpawnRecord>,
    {
        let mut tree = Self::default();
        for record in records {
            tree.insert(record);
        }
        tree
    }

    fn insert(&mut self, record: SpawnRecord) {
        if self.root_edge.is_none() {
            self.root_edge = Some(record);
        }
        self.record_count += 1;
        let slot = match self.index.get(&record.parent) {
            Some(&slot) => slot,
            None => {
                self.parents.push((record.parent, Vec::new()));
                self.index.insert(record.parent, self.parents.len() - 1);
                self.parents.len() - 1
            }
        };
        self.parents[slot].1.push(record.child);
    }

    /// The bootstrap record: the root process and whoever launched it.
    pub fn root_edge(&self) -> Option<SpawnRecord> {
        self.root_edge
    }

    pub fn root(&self) -> Option<u32> {
        self.root_edge.map(|edge| edge.child)
    }

    pub fn children_of(&self, parent: u32) -> &[u32] {
        self.index
            .get(&parent)
            .map(|&slot| self.parents[slot].1.as_slice())
            .unwrap_or(&[])
    }

    /// Parents in first-appearance order with their children.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &[u32])> {
        self.parents
            .iter()
            .map(|(parent, children)| (*parent, children.as_slice()))
    }

    pub fn record_count(&self) -> usize {
        self.record_count
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    /// Ids that appear as a child more than once; empty for a well-formed log.
    pub fn duplicate_children(&self) -> Vec<u32> {
        let mut seen = HashSet::new();
        let mut duplicates = Vec::new();
        for (_, children) in &self.parents {
            for child in children {
                if !seen.insert(*child) && !duplicates.contains(child) {
                    duplicates.push(*child);
                }
            }
        }
        duplicates
    }

    pub fn stats(&self) -> TreeStats {
        let Some(root) = self.root() else {
            return TreeStats::default();
        };

        let mut depth_of: HashMap<u32, usize> = HashMap::new();
        let mut queue = VecDeque::from([(root, 0usize)]);
        while let Some((pid, depth)) = queue.pop_front() {
            if depth_of.contains_key(&pid) {
                continue;
            }
            depth_of.insert(pid, depth);
            for child in self.children_of(pid) {
                queue.push_back((*child, depth + 1));
            }
        }

        let processes = depth_of.len();
        let parents = depth_of
            .keys()
            .filter(|pid| !self.children_of(**pid).is_empty())
            .count();

        TreeStats {
            processes,
            spawned: processes.saturating_sub(1),
            parents,
            leaves: processes - parents,
            max_depth: depth_of.values().copied().max().unwrap_or(0),
        }
    }
}

/// Shape summary of a reconstructed tree, counted from the root down.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    /// Processes reachable from the root, the root included
    pub processes: usize,
    /// Processes created during the run (everything but the root)
    pub spawned: usize,
    pub parents: usize,
    pub leaves: usize,
    pub max_depth: usize,
}

impl fmt::Display for TreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processes ({} spawned), {} parents, {} leaves, depth {}",
            self.processes, self.spawned, self.parents, self.leaves, self.max_depth
        )
    }
}
