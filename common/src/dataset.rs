//! Dataset enumeration seam.

use std::path::{Path, PathBuf};

use error_stack::ResultExt;

use crate::core::DatasetIdentity;
use crate::error::{Result, SlabError};

/// Enumerate the items of a dataset in a deterministic order.
///
/// An empty item list is valid output; it is rejected later, at
/// profiling time.
pub trait DatasetSource {
    /// Stable key identifying this dataset instance.
    fn identity(&self) -> DatasetIdentity;

    /// Item references in their canonical order.
    fn items(&self) -> Result<Vec<PathBuf>>;
}

/// A dataset stored as one file per item inside a directory.
#[derive(Debug, Clone)]
pub struct DirectoryDataset {
    root: PathBuf,
}

impl DirectoryDataset {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl DatasetSource for DirectoryDataset {
    fn identity(&self) -> DatasetIdentity {
        DatasetIdentity::from_path(&self.root)
    }

    /// Entries sorted by path, so every process sees the same order.
    fn items(&self) -> Result<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.root)
            .change_context(SlabError::Io)
            .attach_printable("failed to list dataset directory")
            .attach_printable_lazy(|| format!("dir: {:?}", self.root))?;

        let mut items = Vec::new();
        for entry in entries {
            let entry = entry
                .change_context(SlabError::Io)
                .attach_printable("failed to read dataset directory entry")?;
            items.push(entry.path());
        }
        items.sort();

        Ok(items)
    }
}
