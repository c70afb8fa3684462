use std::time::Duration;

use crate::libc_util::timeval_to_duration;

/// Resources consumed by a terminated child, decoded from `struct rusage`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResourceUsage {
    /// CPU time spent in user mode.
    pub user: Duration,
    /// CPU time spent in kernel mode.
    pub sys: Duration,
    /// Peak resident set size, in bytes.
    pub max_rss: u64,
    pub soft_page_faults: i64,
    pub hard_page_faults: i64,
    pub disk_inputs: i64,
    pub disk_outputs: i64,
    pub voluntary_csw: i64,
    pub involuntary_csw: i64,
}

/// Multiplier from `ru_maxrss` units to bytes. Linux reports kilobytes, macOS bytes.
#[cfg(target_os = "macos")]
const MAX_RSS_UNIT: u64 = 1;
#[cfg(not(target_os = "macos"))]
const MAX_RSS_UNIT: u64 = 1024;

impl ResourceUsage {
    /// Total CPU time, user plus system.
    pub fn cpu(&self) -> Duration {
        self.user + self.sys
    }

    /// CPU time as a percentage of `real`. Exceeds 100 for children running on several cores.
    pub fn percent_cpu(&self, real: Duration) -> f64 {
        if real.is_zero() {
            return 0.0;
        }
        self.cpu().as_secs_f64() / real.as_secs_f64() * 100.0
    }
}

impl From<libc::rusage> for ResourceUsage {
    fn from(u: libc::rusage) -> Self {
        ResourceUsage {
            user: timeval_to_duration(u.ru_utime),
            sys: timeval_to_duration(u.ru_stime),
            max_rss: (u.ru_maxrss.max(0) as u64) * MAX_RSS_UNIT,
            soft_page_faults: u.ru_minflt as i64,
            hard_page_faults: u.ru_majflt as i64,
            disk_inputs: u.ru_inblock as i64,
            disk_outputs: u.ru_oublock as i64,
            voluntary_csw: u.ru_nvcsw as i64,
            involuntary_csw: u.ru_nivcsw as i64,
        }
    }
}
