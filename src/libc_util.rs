use alloc_counter::no_alloc;
use std::ffi::{c_int, c_long, c_void, CStr};
use std::mem;
use std::time::Duration;

use crate::error::{bail, bail_errno, clear_errno, Error, Result};

/// Create a Unix stream socket pair whose ends are closed on `exec`.
#[cfg_attr(debug_assertions, no_alloc)]
pub fn socket_pair() -> Result<(c_int, c_int)> {
    let mut socket_fds = [0; 2];
    let 0.. =
        (unsafe { libc::socketpair(libc::AF_UNIX, libc::SOCK_STREAM, 0, socket_fds.as_mut_ptr()) })
    else {
        bail_errno!("failed to create socketpair");
    };

    // Set FD_CLOEXEC separately, since SOCK_CLOEXEC is not available everywhere.
    for fd in socket_fds {
        let 0.. = (unsafe { libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC) }) else {
            let err = Error::last_os_error().cause("failed to set FD_CLOEXEC on socket");
            let [a, b] = socket_fds;
            close(a);
            close(b);
            return Err(err);
        };
    }

    let [a, b] = socket_fds;
    Ok((a, b))
}

/// Close a file descriptor, ignoring errors.
#[cfg_attr(debug_assertions, no_alloc)]
pub fn close(fd: c_int) {
    let _ = unsafe { libc::close(fd) };
}

/// Send a value, interpretable as bytes, to a socket's file descriptor.
#[cfg_attr(debug_assertions, no_alloc)]
pub unsafe fn socket_send<T: Copy>(sock_fd: c_int, value: T) -> Result<()> {
    let size = mem::size_of::<T>();

    let result = libc::write(sock_fd, (&value) as *const T as *const c_void, size);

    if result == -1 {
        return Err(Error::last_os_error().cause("failed to send to socket"));
    }

    if (result as usize) != size {
        return Err(Error::new().cause("failed to send socket message in single write call"));
    }

    Ok(())
}

/// Receive a value, interpretable as bytes, from a socket's file descriptor.
///
/// Returns `None` if the other end was closed without sending anything.
pub unsafe fn socket_recv<T: Copy>(sock_fd: c_int) -> Result<Option<T>> {
    let size = mem::size_of::<T>();

    let mut output_slot = mem::MaybeUninit::<T>::uninit();
    let result = loop {
        let result = libc::read(sock_fd, output_slot.as_mut_ptr().cast(), size);
        if result == -1 && Error::last_os_error().errno == libc::EINTR {
            continue;
        }
        break result;
    };

    if result == -1 {
        return Err(Error::last_os_error().cause("failed to receive from socket"));
    };

    if result == 0 {
        return Ok(None);
    }

    if (result as usize) != size {
        return Err(Error::new().cause("failed to receive socket message in single read call"));
    }

    Ok(Some(output_slot.assume_init()))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Code(c_int),
    Signal(c_int),
}

impl ExitStatus {
    pub fn from_wait_status(wait_status: c_int) -> Result<ExitStatus> {
        if libc::WIFEXITED(wait_status) {
            return Ok(ExitStatus::Code(libc::WEXITSTATUS(wait_status)));
        }
        if libc::WIFSIGNALED(wait_status) {
            return Ok(ExitStatus::Signal(libc::WTERMSIG(wait_status)));
        }

        bail!("invalid wait status")
    }

    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Code(0))
    }
}

/// Block until `pid` terminates, returning its exit status and the resources it consumed.
pub fn wait4(pid: libc::pid_t) -> Result<(ExitStatus, libc::rusage)> {
    let mut status: c_int = 0;
    let mut usage = mem::MaybeUninit::<libc::rusage>::uninit();

    loop {
        let ret = unsafe { libc::wait4(pid, &mut status as *mut c_int, 0, usage.as_mut_ptr()) };
        if ret == pid {
            break;
        }
        if ret == -1 {
            let err = Error::last_os_error();
            if err.errno == libc::EINTR {
                continue;
            }
            return Err(err.cause("wait4 failed"));
        }
    }

    // SAFETY: wait4 returned the pid, so the kernel filled in `usage`.
    let usage = unsafe { usage.assume_init() };
    Ok((ExitStatus::from_wait_status(status)?, usage))
}

/// Look up a system configuration value.
///
/// `sysconf(3)` returns -1 both on error and for unsupported names; only the former sets errno.
pub fn sysconf(name: c_int) -> Result<c_long> {
    clear_errno();
    let value = unsafe { libc::sysconf(name) };
    if value < 0 {
        let err = Error::last_os_error();
        if err.errno == 0 {
            bail!("sysconf value unsupported");
        }
        return Err(err.cause("sysconf failed"));
    }
    Ok(value)
}

/// Human readable description of a signal, as given by `strsignal(3)`.
pub fn signal_description(signal: c_int) -> String {
    let msg = unsafe { libc::strsignal(signal) };
    if msg.is_null() {
        return format!("Unknown signal {signal}");
    }
    unsafe { CStr::from_ptr(msg) }.to_string_lossy().into_owned()
}

pub fn timeval_to_duration(t: libc::timeval) -> Duration {
    Duration::new(t.tv_sec as u64, (t.tv_usec as u32) * 1_000)
}
