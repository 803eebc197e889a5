//! Bounded directory scanning.
//!
//! Databases walk their root only while opening (to confirm the layout) and
//! for listing; never on the query path.

use std::ops::ControlFlow;
use std::path::Path;

use walkdir::WalkDir;

/// Result of a walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkSummary {
    /// Regular files handed to the callback.
    pub visited: usize,
    /// Entries that could not be read.
    pub errors: usize,
    /// The callback or the file budget ended the walk.
    pub stopped_early: bool,
}

/// Depth- and count-limited walk over regular files, in file name order.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryWalker {
    max_depth: Option<usize>,
    max_files: Option<usize>,
}

impl DirectoryWalker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Descend at most `depth` directories below the root (1 = root only).
    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = Some(depth);
        self
    }

    /// Visit at most `count` files.
    pub fn max_files(mut self, count: usize) -> Self {
        self.max_files = Some(count);
        self
    }

    /// Call `callback` for every regular file under `root`.
    ///
    /// Symlinks are followed. Return `ControlFlow::Break(())` to stop early.
    pub fn for_each_file<F>(&self, root: &Path, mut callback: F) -> WalkSummary
    where
        F: FnMut(&Path) -> ControlFlow<()>,
    {
        let mut walk = WalkDir::new(root).follow_links(true).sort_by_file_name();
        if let Some(depth) = self.max_depth {
            walk = walk.max_depth(depth);
        }

        let mut summary = WalkSummary::default();
        for entry in walk {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable entry");
                    summary.errors += 1;
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if self.max_files.is_some_and(|max| summary.visited >= max) {
                summary.stopped_early = true;
                break;
            }

            summary.visited += 1;
            if callback(entry.path()).is_break() {
                summary.stopped_early = true;
                break;
            }
        }
        summary
    }
}
