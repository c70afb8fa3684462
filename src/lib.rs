mod libc_util;

mod error;
pub mod host;
pub mod report;
mod spawn;
pub mod units;
mod usage;

mod command;

pub use command::{Child, Command, ExitStatus, Measurement};
pub use error::{Error, Result};
pub use host::HostInfo;
pub use report::{OutputFormat, Report};
pub use units::TimeFormat;
pub use usage::ResourceUsage;

/// In test builds, use alloc_counter to verify at runtime that the functions which must be
/// async-signal-safe do not allocate.
#[cfg(debug_assertions)]
#[global_allocator]
static ALLOC: alloc_counter::AllocCounterSystem = alloc_counter::AllocCounterSystem;
