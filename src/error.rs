use alloc_counter::no_alloc;
use std::ffi::c_int;

/// Result type for our error type.
pub type Result<T> = std::result::Result<T, Error>;

/// An error type which can track cause (reason the error happened) and context (what we were
/// doing when the error happened) without allocating.
///
/// Errors raised in a forked child before `exec` are built from this type, so nothing in here
/// may touch the heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Error {
    pub errno: c_int,
    pub cause: Option<&'static str>,
    pub context: Option<&'static str>,
}

#[cfg(any(target_os = "linux", target_os = "android"))]
unsafe fn errno_location() -> *mut c_int {
    libc::__errno_location()
}

#[cfg(any(target_os = "macos", target_os = "ios", target_os = "freebsd"))]
unsafe fn errno_location() -> *mut c_int {
    libc::__error()
}

/// Reset errno, for calls whose failure is only distinguishable by errno changing.
#[cfg_attr(debug_assertions, no_alloc)]
pub(crate) fn clear_errno() {
    unsafe { *errno_location() = 0 };
}

impl Error {
    /// Create an empty error.
    #[cfg_attr(debug_assertions, no_alloc)]
    pub fn new() -> Error {
        Error {
            errno: 0,
            cause: None,
            context: None,
        }
    }

    /// Create an error carrying a specific errno value.
    #[cfg_attr(debug_assertions, no_alloc)]
    pub fn from_errno(errno: c_int) -> Error {
        Error {
            errno,
            cause: None,
            context: None,
        }
    }

    /// Create an error from the last OS error.
    #[cfg_attr(debug_assertions, no_alloc)]
    pub fn last_os_error() -> Error {
        Error::from_errno(unsafe { *errno_location() })
    }

    /// Replace the cause of an error.
    #[cfg_attr(debug_assertions, no_alloc)]
    pub fn cause(self, msg: &'static str) -> Error {
        Error {
            errno: self.errno,
            cause: Some(msg),
            context: self.context,
        }
    }

    /// Replace the context of an error.
    #[cfg_attr(debug_assertions, no_alloc)]
    pub fn context(self, msg: &'static str) -> Error {
        Error {
            errno: self.errno,
            cause: self.cause,
            context: Some(msg),
        }
    }
}

impl Default for Error {
    fn default() -> Self {
        Self::new()
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Error {
        Error::from_errno(e.raw_os_error().unwrap_or(0))
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        // errno 0 means the error did not come from the OS; only print the messages.
        if self.errno == 0 {
            return match (self.context, self.cause) {
                (Some(context), Some(cause)) => write!(f, "{}: {}", context, cause),
                (Some(msg), None) | (None, Some(msg)) => write!(f, "{}", msg),
                (None, None) => write!(f, "unknown error"),
            };
        }

        // Get the error message from errno.
        let error_msg = unsafe { libc::strerror(self.errno) };
        let error_msg_len = unsafe { libc::strlen(error_msg) };
        let error_msg_str: &str = unsafe {
            std::str::from_utf8_unchecked(std::slice::from_raw_parts(
                error_msg as *const u8,
                error_msg_len,
            ))
        };

        match (self.context, self.cause) {
            (Some(context), None) => {
                write!(f, "{}: {} (errno {})", context, error_msg_str, self.errno)
            }
            (None, Some(cause)) => write!(f, "{}: {} (errno {})", cause, error_msg_str, self.errno),
            (Some(context), Some(cause)) => write!(
                f,
                "{}: {}: {} (errno {})",
                context, cause, error_msg_str, self.errno
            ),
            (None, None) => write!(f, "{} (errno {})", error_msg_str, self.errno),
        }
    }
}

impl std::error::Error for Error {}

// Define a macro, bail!, which returns an error with no errno and a custom message.
macro_rules! bail {
    ($msg:expr) => {
        return Err(Error {
            errno: 0,
            cause: Some($msg),
            context: None,
        })
    };
}
pub(crate) use bail;

// Define a macro, bail_errno!, which returns an error with the last OS error:
//
// - `bail_errno!()` returns an error with the last OS error.
// - `bail_errno!(msg)` returns an error with the last OS error and a cause message.
macro_rules! bail_errno {
    () => {
        return Err(Error::last_os_error());
    };
    ($msg:expr) => {
        return Err(Error::last_os_error().cause($msg));
    };
}
pub(crate) use bail_errno;
