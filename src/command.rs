use std::ffi::{c_char, c_int, CString, OsStr, OsString};
use std::os::unix::ffi::OsStrExt;
use std::ptr;
use std::time::Duration;

use crate::error::{bail, Error, Result};
use crate::usage::ResourceUsage;
use crate::{libc_util, spawn};

/// A command to be launched and measured.
#[derive(Debug, Clone)]
pub struct Command {
    program: OsString,
    args: Vec<OsString>,
}

/// A handle to a running child process.
#[derive(Debug)]
pub struct Child(spawn::Child);

/// The exit status of a child process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus(libc_util::ExitStatus);

/// What it took to run a command to completion.
#[derive(Debug, Clone, Copy)]
pub struct Measurement {
    pub status: ExitStatus,

    /// Wall-clock time from just before the fork until the child was reaped.
    pub real: Duration,

    pub usage: ResourceUsage,
}

impl Command {
    /// Create a new command. The program is looked up in `PATH` unless it contains a slash.
    pub fn new(program: impl AsRef<OsStr>) -> Command {
        Command {
            program: program.as_ref().to_owned(),
            args: vec![program.as_ref().to_owned()],
        }
    }

    /// Append an argument.
    pub fn arg(&mut self, arg: impl AsRef<OsStr>) -> &mut Command {
        self.args.push(arg.as_ref().to_owned());
        self
    }

    /// Append several arguments.
    pub fn args(&mut self, args: impl IntoIterator<Item = impl AsRef<OsStr>>) -> &mut Command {
        self.args
            .extend(args.into_iter().map(|e| e.as_ref().to_owned()));
        self
    }

    /// Gets the executable name.
    pub fn get_program(&self) -> &OsStr {
        &self.program
    }

    /// Returns an iterator over the arguments passed to the program, excluding `argv[0]`.
    pub fn get_args(&self) -> impl Iterator<Item = &OsStr> {
        self.args.iter().skip(1).map(|e| e.as_os_str())
    }

    /// The full command line, space separated, for display.
    pub fn command_line(&self) -> String {
        self.args
            .iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Run the command to completion, measuring it.
    pub fn measure(&self) -> Result<Measurement> {
        self.spawn()?.wait()
    }

    /// Spawn the subprocess, and return a handle to it.
    ///
    /// Fails if the fork fails, or if the child could not exec the program.
    pub fn spawn(&self) -> Result<Child> {
        // Null-terminate the command.
        let Ok(command) = CString::new(self.program.as_bytes()) else {
            bail!("command contains an interior NUL");
        };

        // Collect the arguments.
        let args_buf = self
            .args
            .iter()
            .map(|e| {
                CString::new(e.as_bytes())
                    .map_err(|_| Error::new().cause("argument contains internal NUL"))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut args: Vec<*const c_char> = args_buf.iter().map(|a| a.as_ptr()).collect();
        args.push(ptr::null());

        let ctx = spawn::Context {
            command: command.as_ptr(),
            args,
        };

        // Spawn the child.
        let child = unsafe { spawn::spawn(ctx) }.map_err(|e| e.context("failed to spawn child"))?;

        Ok(Child(child))
    }
}

impl Child {
    pub fn id(&self) -> u32 {
        self.0.pid() as u32
    }

    /// Wait for the child to terminate, collecting its status and resource usage.
    pub fn wait(self) -> Result<Measurement> {
        let exit = self.0.wait()?;
        Ok(Measurement {
            status: ExitStatus(exit.status),
            real: exit.real,
            usage: exit.usage.into(),
        })
    }
}

impl ExitStatus {
    /// The exit code, if the child exited normally.
    pub fn code(&self) -> Option<c_int> {
        match self.0 {
            libc_util::ExitStatus::Code(code) => Some(code),
            libc_util::ExitStatus::Signal(_) => None,
        }
    }

    /// The terminating signal, if the child was killed by one.
    pub fn signal(&self) -> Option<c_int> {
        match self.0 {
            libc_util::ExitStatus::Code(_) => None,
            libc_util::ExitStatus::Signal(signal) => Some(signal),
        }
    }

    /// Description of the terminating signal, such as `Killed`.
    pub fn signal_description(&self) -> Option<String> {
        self.signal().map(libc_util::signal_description)
    }

    pub fn success(&self) -> bool {
        self.0.success()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sh(script: &str) -> Command {
        let mut cmd = Command::new("sh");
        cmd.args(["-c", script]);
        cmd
    }

    #[test]
    fn exit_code_is_propagated() -> eyre::Result<()> {
        for code in [0, 1, 42, 255] {
            let m = sh(&format!("exit {code}")).measure()?;
            assert_eq!(m.status.code(), Some(code));
            assert_eq!(m.status.signal(), None);
            assert_eq!(m.status.success(), code == 0);
        }
        Ok(())
    }

    #[test]
    fn terminating_signal_is_reported() -> eyre::Result<()> {
        let m = sh("kill -TERM $$").measure()?;
        assert_eq!(m.status.code(), None);
        assert_eq!(m.status.signal(), Some(libc::SIGTERM));
        assert!(m.status.signal_description().is_some());
        Ok(())
    }

    #[test]
    fn real_time_covers_cpu_time() -> eyre::Result<()> {
        let m = sh("i=0; while [ $i -lt 20000 ]; do i=$((i+1)); done").measure()?;
        assert!(m.status.success());
        assert!(m.real >= m.usage.cpu());
        assert!(m.usage.max_rss > 0);
        Ok(())
    }

    #[test]
    fn sleep_is_mostly_real_time() -> eyre::Result<()> {
        let m = sh("sleep 0.2").measure()?;
        assert!(m.real >= Duration::from_millis(200));
        assert!(m.usage.cpu() < m.real);
        Ok(())
    }

    #[test]
    fn missing_program_fails_to_spawn() {
        let err = Command::new("runstat-no-such-program").measure().unwrap_err();
        assert_eq!(err.errno, libc::ENOENT);
        assert_eq!(err.context, Some("failed to spawn child"));
    }

    #[test]
    fn interior_nul_is_rejected() {
        let mut cmd = Command::new("true");
        cmd.arg("a\0b");
        let err = cmd.spawn().unwrap_err();
        assert_eq!(err.errno, 0);
    }

    #[test]
    fn command_line_joins_arguments() {
        let cmd = sh("echo hi");
        assert_eq!(cmd.command_line(), "sh -c echo hi");
        assert_eq!(cmd.get_program(), "sh");
        assert_eq!(cmd.get_args().count(), 2);
    }
}
