use alloc_counter::no_alloc;
use std::ffi::{c_char, c_int};
use std::time::{Duration, Instant};

use tracing::{debug, span, Level};

use crate::error::{bail_errno, Error, Result};
use crate::libc_util::*;

/// Exit code of a child which could not exec its command.
const EXEC_FAILED_EXIT: c_int = 127;

/// Exit code of a child which panicked before exec.
const PANICKED_EXIT: c_int = 126;

/// Sent over the exec error socket in place of an errno when the child panicked.
const PANICKED_ERRNO: c_int = -1;

/// Context for launching a child.
#[derive(Debug)]
pub struct Context {
    /// Command to execute, looked up in `PATH` if it contains no slash.
    pub command: *const c_char,

    /// Null-element-terminated argument list.
    pub args: Vec<*const c_char>,
}

/// Handle to a running child process.
#[derive(Debug)]
pub struct Child {
    pid: libc::pid_t,

    /// Taken just before `fork(2)`.
    started: Instant,
}

/// Everything the kernel tells us about a child once it has terminated.
pub struct Exit {
    pub status: ExitStatus,
    pub usage: libc::rusage,
    pub real: Duration,
}

/// Fork, and `execvp(3)` the command in `ctx` in the child, returning a [`Child`].
///
/// This only returns once the child has either successfully called `exec` or reported why it
/// could not. An `exec` failure in the child is returned as an error carrying the child's errno.
///
/// # Safety
///
/// The pointers in `ctx` must be valid until this function returns.
pub unsafe fn spawn(ctx: Context) -> Result<Child> {
    let span = span!(Level::DEBUG, "spawn");
    let _span_guard = span.enter();

    // Create the exec error socket.
    // Both ends are close-on-exec. If the child execs successfully, the parent reads EOF. If
    // not, the child sends its errno before exiting.
    let (exec_err_tx_fd, exec_err_rx_fd) = socket_pair()
        .map_err(|e| e.context("Failed to create socketpair for exec error socket"))?;

    let started = Instant::now();
    let pid = libc::fork();
    if pid == -1 {
        let err = Error::last_os_error().cause("fork(2) failed");
        close(exec_err_tx_fd);
        close(exec_err_rx_fd);
        return Err(err);
    }

    if pid == 0 {
        close(exec_err_rx_fd);
        child_extern(&ctx, exec_err_tx_fd);
    }

    // Close our copy of the send end, so we see EOF once the child has exec'd.
    close(exec_err_tx_fd);
    debug!(%pid, "forked child");

    let exec_result = socket_recv::<c_int>(exec_err_rx_fd);
    close(exec_err_rx_fd);

    match exec_result {
        Ok(None) => {
            debug!(%pid, "child exec'd");
            Ok(Child { pid, started })
        }
        Ok(Some(errno)) => {
            // Reap the child, which exits right after reporting.
            let reaped = wait4(pid);
            debug!(%pid, errno, reaped = reaped.is_ok(), "child failed to exec");
            Err(exec_error(errno))
        }
        Err(e) => Err(e.context("Failed to receive from exec error socket")),
    }
}

impl Child {
    pub fn pid(&self) -> libc::pid_t {
        self.pid
    }

    /// Wait for the child to exit, returning the exit status, its resource usage, and the
    /// elapsed wall-clock time since just before it was forked.
    pub fn wait(&self) -> Result<Exit> {
        let (status, usage) = wait4(self.pid).map_err(|e| e.context("failed to wait for child"))?;
        let real = self.started.elapsed();
        debug!(pid = self.pid, ?status, ?real, "child exited");
        Ok(Exit {
            status,
            usage,
            real,
        })
    }
}

/// Turn the value a child sent over the exec error socket into an error.
fn exec_error(errno: c_int) -> Error {
    match errno {
        PANICKED_ERRNO => Error::new().cause("child panicked before exec"),
        errno => Error::from_errno(errno).cause("execvp failed"),
    }
}

/// Runs in the forked child. Never returns.
fn child_extern(ctx: &Context, exec_err_tx_fd: c_int) -> ! {
    // Catch any panics.
    let (errno, exit_code) = match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| unsafe {
        exec_child(ctx)
    })) {
        Ok(Ok(())) => (0, EXEC_FAILED_EXIT),
        Ok(Err(e)) => (e.errno, EXEC_FAILED_EXIT),
        Err(_) => (PANICKED_ERRNO, PANICKED_EXIT),
    };

    let _ = unsafe { socket_send::<c_int>(exec_err_tx_fd, errno) };
    unsafe { libc::_exit(exit_code) }
}

/// Prepare the child's signal state and exec the command. Only returns on failure.
#[cfg_attr(debug_assertions, no_alloc)]
unsafe fn exec_child(ctx: &Context) -> Result<()> {
    // The Rust runtime ignores SIGPIPE, and ignored signals stay ignored across exec.
    if libc::signal(libc::SIGPIPE, libc::SIG_DFL) == libc::SIG_ERR {
        bail_errno!("failed to reset SIGPIPE");
    }

    libc::execvp(ctx.command, ctx.args.as_ptr());
    bail_errno!("execvp failed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::CString;
    use std::ptr;

    fn context(args: &[CString]) -> Context {
        let mut argv: Vec<*const c_char> = args.iter().map(|a| a.as_ptr()).collect();
        argv.push(ptr::null());
        Context {
            command: args[0].as_ptr(),
            args: argv,
        }
    }

    #[test]
    fn false_exits_1() {
        let args = [CString::new("false").unwrap()];
        let child = unsafe { spawn(context(&args)) }.unwrap();
        assert_eq!(child.wait().unwrap().status, ExitStatus::Code(1));
    }

    #[test]
    fn missing_command_reports_enoent() {
        let args = [CString::new("/nonexistent/definitely-not-here").unwrap()];
        let err = unsafe { spawn(context(&args)) }.unwrap_err();
        assert_eq!(err.errno, libc::ENOENT);
        assert_eq!(err.cause, Some("execvp failed"));
    }

    #[test]
    fn panic_in_child_is_not_an_exec_failure() {
        let err = exec_error(PANICKED_ERRNO);
        assert_eq!(err.errno, 0);
        assert_eq!(err.cause, Some("child panicked before exec"));

        let err = exec_error(libc::EACCES);
        assert_eq!(err.errno, libc::EACCES);
        assert_eq!(err.cause, Some("execvp failed"));
    }

    #[test]
    fn killed_child_reports_signal() {
        let args = [
            CString::new("sh").unwrap(),
            CString::new("-c").unwrap(),
            CString::new("kill -KILL $$").unwrap(),
        ];
        let child = unsafe { spawn(context(&args)) }.unwrap();
        assert_eq!(
            child.wait().unwrap().status,
            ExitStatus::Signal(libc::SIGKILL)
        );
    }

    #[test]
    fn sigpipe_is_default_in_child() {
        // A shell that inherited an ignored SIGPIPE would survive this and exit 0.
        let args = [
            CString::new("sh").unwrap(),
            CString::new("-c").unwrap(),
            CString::new("kill -PIPE $$; exit 0").unwrap(),
        ];
        let child = unsafe { spawn(context(&args)) }.unwrap();
        assert_eq!(
            child.wait().unwrap().status,
            ExitStatus::Signal(libc::SIGPIPE)
        );
    }
}
