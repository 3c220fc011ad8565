//! Named shared memory segments.
//!
//! On Linux a file on the shared memory backed mount (`/dev/shm` by
//! default) is a POSIX shared memory object: the file name is the
//! segment name, and unlinking removes the name from the namespace while
//! existing mappings stay valid. The mount is configurable so tests can
//! run against a scratch directory.

use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use clap::Args;
use error_stack::ResultExt;
use memmap2::{Mmap, MmapMut};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Result, SlabError};

/// Default mount point backing shared memory segments.
pub const DEFAULT_SHM_MOUNT: &str = "/dev/shm";

/// Options for locating shared memory segments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedSegmentOptions {
    /// Mount point of the shared memory backed filesystem.
    pub mount: PathBuf,
}

impl Default for SharedSegmentOptions {
    fn default() -> Self {
        Self {
            mount: DEFAULT_SHM_MOUNT.into(),
        }
    }
}

#[derive(Debug, Args, Clone)]
pub struct SharedSegmentArgs {
    /// Mount point of the shared memory backed filesystem.
    #[arg(long, env)]
    pub shm_mount: Option<PathBuf>,
}

impl SharedSegmentArgs {
    /// Convert the segment arguments into segment options.
    pub fn to_segment_options(&self) -> SharedSegmentOptions {
        let mut options = SharedSegmentOptions::default();

        if let Some(shm_mount) = &self.shm_mount {
            options.mount = shm_mount.clone();
        }

        options
    }
}

/// A named, byte addressable shared memory segment.
#[derive(Debug)]
pub struct SharedSegment {
    name: String,
    path: PathBuf,
    file: File,
}

impl SharedSegment {
    /// Create a new, exclusively owned segment of exactly `size` bytes.
    ///
    /// Creation is exclusive: a leftover or concurrently built segment
    /// under the same name fails with `SegmentAlreadyExists` instead of
    /// being reused or overwritten.
    pub fn create(name: &str, size: u64, options: &SharedSegmentOptions) -> Result<Self> {
        let path = options.mount.join(name);

        let file = match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                return Err(SlabError::SegmentAlreadyExists)
                    .attach_printable_lazy(|| format!("segment: {}", name));
            }
            Err(err) => {
                return Err(err)
                    .change_context(SlabError::Io)
                    .attach_printable("failed to create segment file")
                    .attach_printable_lazy(|| format!("file: {:?}", path));
            }
        };

        if let Err(err) = file.set_len(size) {
            // Don't leave a zero-sized segment registered under the name.
            let _ = std::fs::remove_file(&path);
            return Err(err)
                .change_context(SlabError::Io)
                .attach_printable("failed to size segment file")
                .attach_printable_lazy(|| format!("file: {:?}, size: {}", path, size));
        }

        debug!(segment = %name, size, "created shared memory segment");

        Ok(Self {
            name: name.to_string(),
            path,
            file,
        })
    }

    /// Open an existing segment by name, without creating or resizing.
    pub fn open(name: &str, options: &SharedSegmentOptions) -> Result<Self> {
        let path = options.mount.join(name);

        let file = match OpenOptions::new().read(true).open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(SlabError::SegmentNotFound)
                    .attach_printable_lazy(|| format!("segment: {}", name));
            }
            Err(err) => {
                return Err(err)
                    .change_context(SlabError::Io)
                    .attach_printable("failed to open segment file")
                    .attach_printable_lazy(|| format!("file: {:?}", path));
            }
        };

        debug!(segment = %name, "opened shared memory segment");

        Ok(Self {
            name: name.to_string(),
            path,
            file,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Total size of the segment, in bytes.
    pub fn size(&self) -> Result<u64> {
        let metadata = self
            .file
            .metadata()
            .change_context(SlabError::Io)
            .attach_printable("failed to stat segment file")
            .attach_printable_lazy(|| format!("file: {:?}", self.path))?;
        Ok(metadata.len())
    }

    /// Map the whole segment writable.
    pub fn map_mut(&self) -> Result<MmapMut> {
        let mmap = unsafe { MmapMut::map_mut(&self.file) }
            .change_context(SlabError::Io)
            .attach_printable("failed to map segment writable")
            .attach_printable_lazy(|| format!("file: {:?}", self.path))?;
        Ok(mmap)
    }

    /// Map the whole segment read only.
    pub fn map(&self) -> Result<Mmap> {
        let mmap = unsafe { Mmap::map(&self.file) }
            .change_context(SlabError::Io)
            .attach_printable("failed to map segment")
            .attach_printable_lazy(|| format!("file: {:?}", self.path))?;
        Ok(mmap)
    }

    /// Remove the segment name from the mount namespace.
    ///
    /// Mappings held by other processes stay valid until they unmap.
    pub fn unlink(&self) -> Result<()> {
        std::fs::remove_file(&self.path)
            .change_context(SlabError::Io)
            .attach_printable("failed to unlink segment")
            .attach_printable_lazy(|| format!("file: {:?}", self.path))?;

        debug!(segment = %self.name, "unlinked shared memory segment");
        Ok(())
    }
}
