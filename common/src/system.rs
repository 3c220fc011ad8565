//! Capacity introspection for the shared memory mount and system memory.

use std::ffi::CString;
use std::os::unix::ffi::OsStrExt;
use std::path::Path;

use error_stack::ResultExt;

use crate::error::{Result, SlabError};

/// Capacity statistics of the shared memory backed filesystem.
#[derive(Debug, Clone, Copy)]
pub struct ShmMountStats {
    /// Bytes available to a non-root allocator.
    pub available: u64,
    /// Bytes already in use on the mount.
    pub used: u64,
}

/// Read capacity statistics for the filesystem mounted at `path`.
pub fn shm_mount_stats(path: &Path) -> Result<ShmMountStats> {
    let path_c = CString::new(path.as_os_str().as_bytes())
        .change_context(SlabError::Io)
        .attach_printable("mount path contains an interior nul byte")?;

    let mut stats: libc::statvfs = unsafe { std::mem::zeroed() };
    let ret = unsafe { libc::statvfs(path_c.as_ptr(), &mut stats) };
    if ret != 0 {
        return Err(SlabError::Io)
            .attach_printable("statvfs failed on the shared memory mount")
            .attach_printable_lazy(|| format!("mount: {:?}", path))
            .attach_printable_lazy(|| format!("cause: {}", std::io::Error::last_os_error()));
    }

    let frsize = stats.f_frsize as u64;
    let available = stats.f_bavail as u64 * frsize;
    let used = (stats.f_blocks as u64).saturating_sub(stats.f_bfree as u64) * frsize;

    Ok(ShmMountStats { available, used })
}

/// Bytes of memory available to new allocations, system wide.
///
/// Parses the `MemAvailable` row of a meminfo-format file. The path is a
/// parameter so callers can point at something other than
/// `/proc/meminfo`, tests in particular.
pub fn available_system_memory(meminfo: &Path) -> Result<u64> {
    let contents = std::fs::read_to_string(meminfo)
        .change_context(SlabError::Io)
        .attach_printable("failed to read meminfo")
        .attach_printable_lazy(|| format!("file: {:?}", meminfo))?;

    parse_mem_available(&contents)
        .ok_or(SlabError::Io)
        .attach_printable("meminfo has no parseable MemAvailable row")
        .attach_printable_lazy(|| format!("file: {:?}", meminfo))
}

fn parse_mem_available(contents: &str) -> Option<u64> {
    for line in contents.lines() {
        if let Some(rest) = line.strip_prefix("MemAvailable:") {
            // Value is reported in kiB.
            let kib: u64 = rest.split_whitespace().next()?.parse().ok()?;
            return Some(kib * 1024);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::{parse_mem_available, shm_mount_stats};

    #[test]
    pub fn test_parse_mem_available() {
        let meminfo = "MemTotal:       32590584 kB\n\
                       MemFree:         1699016 kB\n\
                       MemAvailable:   16265456 kB\n\
                       Buffers:          790060 kB\n";
        assert_eq!(parse_mem_available(meminfo), Some(16265456 * 1024));
    }

    #[test]
    pub fn test_parse_mem_available_missing_row() {
        assert_eq!(parse_mem_available("MemTotal: 1 kB\n"), None);
    }

    #[test]
    pub fn test_mount_stats_on_root() {
        let stats = shm_mount_stats(Path::new("/")).unwrap();
        // Not asserting exact numbers, only that the call reports a
        // coherent filesystem.
        assert!(stats.available > 0 || stats.used > 0);
    }
}
