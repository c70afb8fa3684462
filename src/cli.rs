use clap::{ArgAction, Parser};
use runstat::{OutputFormat, TimeFormat};
use std::ffi::OsString;

/// Run a command, then report how long it took and what it used.
///
/// Options are only recognised before the command. Everything from the command on is passed
/// to the child untouched.
#[derive(Debug, Parser)]
#[command(name = "runstat", version, about)]
#[command(after_help = "EXAMPLES:\n    runstat -- cat some/file\n    runstat --time nano sh -c 'echo \"do something\"'")]
pub struct Cli {
    /// Unit for real, user and sys times.
    #[arg(short, long, value_enum, default_value_t = TimeFormat::Seconds, env = "RUNSTAT_TIME")]
    pub time: TimeFormat,

    /// Report format.
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Standard, env = "RUNSTAT_OUTPUT")]
    pub output: OutputFormat,

    /// Leave out the CPU count and memory figures.
    #[arg(short, long, env = "RUNSTAT_BRIEF")]
    pub brief: bool,

    /// Also report max RSS, page faults, block I/O, context switches and CPU percentage.
    #[arg(short = 'x', long)]
    pub extended: bool,

    /// Log more to stderr. Repeat for trace output.
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// The command to run, and its arguments.
    #[arg(
        required = true,
        trailing_var_arg = true,
        value_name = "COMMAND"
    )]
    pub command: Vec<OsString>,
}
