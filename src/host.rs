//! Facts about the machine the child runs on: logical CPUs and physical memory.
//!
//! Probing never fails as a whole. A query the host cannot answer leaves its field `None`.

use serde::Serialize;
use std::ffi::c_int;
use tracing::debug;

use crate::libc_util::sysconf;

#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Sys(#[from] crate::error::Error),

    #[error("malformed {field} line in /proc/meminfo")]
    Malformed { field: &'static str },

    #[error("{0} missing from /proc/meminfo")]
    Missing(&'static str),

    #[error("malformed value in {0}")]
    Parse(&'static str),

    #[error("host_statistics64 returned {0}")]
    HostStatistics(i32),

    #[error("available memory is not reported on this platform")]
    Unsupported,
}

/// Snapshot of host CPU and memory figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct HostInfo {
    pub cpu_count: Option<u32>,
    pub page_size: Option<u64>,
    pub mem_total: Option<u64>,
    pub mem_avail: Option<u64>,
}

impl HostInfo {
    /// Query the host.
    pub fn probe() -> HostInfo {
        HostInfo {
            cpu_count: settle("cpu_count", cpu_count()),
            page_size: settle("page_size", page_size()),
            mem_total: settle("mem_total", memory_total()),
            mem_avail: settle("mem_avail", memory_available()),
        }
    }
}

fn settle<T>(what: &'static str, result: Result<T, HostError>) -> Option<T> {
    result
        .map_err(|err| debug!(what, %err, "host query failed"))
        .ok()
}

fn sysconf_u64(name: c_int) -> Result<u64, HostError> {
    Ok(sysconf(name)? as u64)
}

/// Number of logical CPUs currently online.
pub fn cpu_count() -> Result<u32, HostError> {
    Ok(sysconf_u64(libc::_SC_NPROCESSORS_ONLN)? as u32)
}

pub fn page_size() -> Result<u64, HostError> {
    sysconf_u64(libc::_SC_PAGESIZE)
}

/// Total physical memory, in bytes.
pub fn memory_total() -> Result<u64, HostError> {
    let n_pages = sysconf_u64(libc::_SC_PHYS_PAGES)?;
    Ok(n_pages * page_size()?)
}

/// Memory available for starting new applications without swapping, in bytes.
#[cfg(any(target_os = "linux", target_os = "android"))]
pub fn memory_available() -> Result<u64, HostError> {
    const MEMINFO: &str = "/proc/meminfo";
    const MIN_FREE_KBYTES: &str = "/proc/sys/vm/min_free_kbytes";

    let meminfo = std::fs::read_to_string(MEMINFO).map_err(|source| HostError::Io {
        path: MEMINFO,
        source,
    })?;

    available_from_meminfo(&meminfo, || {
        std::fs::read_to_string(MIN_FREE_KBYTES)
            .map_err(|source| HostError::Io {
                path: MIN_FREE_KBYTES,
                source,
            })?
            .trim()
            .parse()
            .map_err(|_| HostError::Parse(MIN_FREE_KBYTES))
    })
}

/// Memory available without paging, in bytes: free pages plus file-backed and purgeable pages
/// the VM can drop.
#[cfg(target_os = "macos")]
pub fn memory_available() -> Result<u64, HostError> {
    let mut stats = std::mem::MaybeUninit::<libc::vm_statistics64>::zeroed();
    let mut count = libc::HOST_VM_INFO64_COUNT;

    #[allow(deprecated)]
    let ret = unsafe {
        libc::host_statistics64(
            libc::mach_host_self(),
            libc::HOST_VM_INFO64,
            stats.as_mut_ptr().cast(),
            &mut count,
        )
    };
    if ret != libc::KERN_SUCCESS {
        return Err(HostError::HostStatistics(ret));
    }

    // SAFETY: host_statistics64 succeeded, so it filled in `stats`.
    let stats = unsafe { stats.assume_init() };
    Ok(available_from_page_counts(
        PageCounts {
            free: stats.free_count.into(),
            external: stats.external_page_count.into(),
            purgeable: stats.purgeable_count.into(),
            speculative: stats.speculative_count.into(),
        },
        page_size()?,
    ))
}

#[cfg(not(any(target_os = "linux", target_os = "android", target_os = "macos")))]
pub fn memory_available() -> Result<u64, HostError> {
    Err(HostError::Unsupported)
}

/// Page counts from the Mach VM statistics.
#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
#[derive(Debug, Clone, Copy)]
pub(crate) struct PageCounts {
    pub free: u64,
    pub external: u64,
    pub purgeable: u64,
    /// Already counted in `free`, but holding read-ahead data.
    pub speculative: u64,
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
pub(crate) fn available_from_page_counts(pages: PageCounts, page_size: u64) -> u64 {
    (pages.free + pages.external + pages.purgeable).saturating_sub(pages.speculative) * page_size
}

/// Read the kilobyte figure from the value half of a `/proc/meminfo` line, e.g. `  123 kB`.
fn kilobytes(value: &str, field: &'static str) -> Result<u64, HostError> {
    value
        .split_whitespace()
        .next()
        .and_then(|n| n.parse().ok())
        .ok_or(HostError::Malformed { field })
}

/// Compute available memory in bytes from the contents of `/proc/meminfo`.
///
/// Kernels since 3.14 report `MemAvailable` directly. Older kernels get the same estimate the
/// kernel itself makes: free memory above the low watermark, plus the half of the page cache and
/// reclaimable slab that can be dropped. `min_free_kbytes` is only consulted in that case.
pub(crate) fn available_from_meminfo(
    meminfo: &str,
    min_free_kbytes: impl FnOnce() -> Result<u64, HostError>,
) -> Result<u64, HostError> {
    let mut avail = None;
    let mut free = None;
    let mut active_file = None;
    let mut inactive_file = None;
    let mut s_reclaimable = None;

    for line in meminfo.lines() {
        let Some((field, value)) = line.split_once(':') else {
            continue;
        };
        let (slot, field) = match field {
            "MemAvailable" => (&mut avail, "MemAvailable"),
            "MemFree" => (&mut free, "MemFree"),
            "Active(file)" => (&mut active_file, "Active(file)"),
            "Inactive(file)" => (&mut inactive_file, "Inactive(file)"),
            "SReclaimable" => (&mut s_reclaimable, "SReclaimable"),
            _ => continue,
        };
        *slot = Some(kilobytes(value, field)?);
    }

    if let Some(avail) = avail {
        return Ok(avail * 1024);
    }

    let free = free.ok_or(HostError::Missing("MemFree"))?;
    let page_cache = active_file.ok_or(HostError::Missing("Active(file)"))?
        + inactive_file.ok_or(HostError::Missing("Inactive(file)"))?;
    let s_reclaimable = s_reclaimable.ok_or(HostError::Missing("SReclaimable"))?;

    let low = min_free_kbytes()? * 5 / 4;
    let avail = (free + page_cache + s_reclaimable)
        .saturating_sub(low)
        .saturating_sub((page_cache / 2).min(low))
        .saturating_sub((s_reclaimable / 2).min(low));

    Ok(avail * 1024)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MODERN: &str = "\
MemTotal:       16314720 kB
MemFree:         1021220 kB
MemAvailable:    9876543 kB
Buffers:          402116 kB
Active(file):    3000000 kB
Inactive(file):  4000000 kB
SReclaimable:     600000 kB
";

    const LEGACY: &str = "\
MemTotal:       16314720 kB
MemFree:         1000000 kB
Active(file):     300000 kB
Inactive(file):   100000 kB
SReclaimable:      50000 kB
";

    #[test]
    fn prefers_mem_available() -> eyre::Result<()> {
        let avail = available_from_meminfo(MODERN, || panic!("should not be consulted"))?;
        assert_eq!(avail, 9_876_543 * 1024);
        Ok(())
    }

    #[test]
    fn estimates_without_mem_available() -> eyre::Result<()> {
        // low = 8000 * 5 / 4 = 10000
        // 1000000 - 10000 + (400000 - 10000) + (50000 - 10000) = 1420000
        let avail = available_from_meminfo(LEGACY, || Ok(8000))?;
        assert_eq!(avail, 1_420_000 * 1024);
        Ok(())
    }

    #[test]
    fn missing_fields_are_reported() {
        let err = available_from_meminfo("MemTotal: 1 kB\n", || Ok(0)).unwrap_err();
        assert!(matches!(err, HostError::Missing("MemFree")));
    }

    #[test]
    fn malformed_line_is_reported() {
        let err = available_from_meminfo("MemAvailable: lots\n", || Ok(0)).unwrap_err();
        assert!(matches!(
            err,
            HostError::Malformed {
                field: "MemAvailable"
            }
        ));
    }

    #[test]
    fn page_counts_exclude_speculative_pages() {
        let pages = PageCounts {
            free: 1000,
            external: 300,
            purgeable: 20,
            speculative: 120,
        };
        assert_eq!(available_from_page_counts(pages, 16384), 1200 * 16384);

        let empty = PageCounts {
            free: 0,
            external: 0,
            purgeable: 0,
            speculative: 5,
        };
        assert_eq!(available_from_page_counts(empty, 4096), 0);
    }

    #[test]
    fn probe_reports_cpus_and_memory() {
        let info = HostInfo::probe();
        assert!(info.cpu_count.unwrap_or(0) >= 1);
        assert!(info.page_size.unwrap_or(0) > 0);
        assert!(info.mem_total.unwrap_or(0) > 0);
        if let (Some(avail), Some(total)) = (info.mem_avail, info.mem_total) {
            assert!(avail <= total);
        }
        if cfg!(any(target_os = "linux", target_os = "macos")) {
            assert!(info.mem_avail.is_some());
        }
    }
}
