mod cli;
mod logging;

use clap::Parser;
use std::io::Write;
use std::process::ExitCode;
use tracing::debug;

use runstat::{Command, HostInfo, Report};

/// Exit status when the child could not be spawned or waited for.
const FAILURE: u8 = 255;

fn main() -> ExitCode {
    let cli = cli::Cli::parse();
    logging::configure_logging(cli.verbose);

    let mut cmd = Command::new(&cli.command[0]);
    cmd.args(&cli.command[1..]);
    debug!(cmdline = %cmd.command_line(), "running");

    let measurement = match cmd.measure() {
        Ok(m) => m,
        Err(err) => {
            debug!(?err, "measurement failed");
            eprintln!("runstat: {err}");
            return ExitCode::from(FAILURE);
        }
    };
    debug!(?measurement);

    let mut report = Report::new(cmd.command_line(), measurement)
        .time_format(cli.time)
        .output_format(cli.output)
        .extended(cli.extended);
    if !cli.brief {
        report = report.host(HostInfo::probe());
    }

    if let Err(err) = write!(std::io::stdout().lock(), "{report}") {
        eprintln!("runstat: failed to write report: {err}");
        return ExitCode::from(FAILURE);
    }

    ExitCode::SUCCESS
}
