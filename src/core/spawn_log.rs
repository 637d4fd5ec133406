//! Append-only spawn log shared by every process in a run.
//!
//! The file is opened with `O_APPEND` before the first fork and the
//! descriptor is inherited by all descendants. Each record is formatted in
//! full and handed to the kernel in a single `write`, so concurrent appends
//! interleave only at line boundaries. Writers never read the file back.

use crate::core::models::SpawnRecord;
use crate::error::{ForkTreeError, ForkTreeResult};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct SpawnLog {
    path: PathBuf,
    file: File,
}

impl SpawnLog {
    /// Truncate (or create) the log at `path` and open it for appending.
    pub fn create(path: impl AsRef<Path>) -> ForkTreeResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|err| ForkTreeError::io("create spawn log directory", parent, err))?;
            }
        }

        File::create(&path).map_err(|err| ForkTreeError::io("truncate spawn log", &path, err))?;
        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|err| ForkTreeError::io("open spawn log", &path, err))?;

        Ok(Self { path, file })
    }

    pub fn append(&self, record: &SpawnRecord) -> ForkTreeResult<()> {
        let line = record.to_line();
        (&self.file)
            .write_all(line.as_bytes())
            .map_err(|err| ForkTreeError::io("append spawn record", &self.path, err))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
