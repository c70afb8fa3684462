use serde::Serialize;
use std::fmt::{self, Display};

use crate::command::Measurement;
use crate::host::HostInfo;
use crate::units::{format_duration, human_size, TimeFormat};

/// Placeholder for a figure the host could not provide.
pub const NO_DATA: &str = "-";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Aligned `label: value` lines.
    #[default]
    Standard,
    /// A single JSON object on one line.
    Json,
}

/// The statistics printed once the child has terminated.
#[derive(Debug, Clone)]
pub struct Report {
    command_line: String,
    measurement: Measurement,
    host: Option<HostInfo>,
    time_format: TimeFormat,
    output_format: OutputFormat,
    extended: bool,
}

impl Report {
    pub fn new(command_line: impl Into<String>, measurement: Measurement) -> Report {
        Report {
            command_line: command_line.into(),
            measurement,
            host: None,
            time_format: TimeFormat::default(),
            output_format: OutputFormat::default(),
            extended: false,
        }
    }

    /// Include host CPU and memory figures.
    pub fn host(mut self, host: HostInfo) -> Report {
        self.host = Some(host);
        self
    }

    pub fn time_format(mut self, time_format: TimeFormat) -> Report {
        self.time_format = time_format;
        self
    }

    pub fn output_format(mut self, output_format: OutputFormat) -> Report {
        self.output_format = output_format;
        self
    }

    /// Include the command line, the rest of the child's resource usage (max RSS, page faults,
    /// block I/O, context switches and CPU percentage) and the host page size.
    pub fn extended(mut self, extended: bool) -> Report {
        self.extended = extended;
        self
    }

    fn to_json(&self) -> JsonReport<'_> {
        let m = &self.measurement;
        JsonReport {
            cmdline: &self.command_line,
            exit_code: m.status.code(),
            term_signal: m.status.signal(),
            term_signal_name: m.status.signal_description(),
            time_format: self.time_format,
            time_real: format_duration(m.real, self.time_format),
            time_user: format_duration(m.usage.user, self.time_format),
            time_sys: format_duration(m.usage.sys, self.time_format),
            time_real_ns: m.real.as_nanos() as u64,
            time_user_ns: m.usage.user.as_nanos() as u64,
            time_sys_ns: m.usage.sys.as_nanos() as u64,
            percent_cpu: m.usage.percent_cpu(m.real),
            max_rss: m.usage.max_rss,
            soft_page_faults: m.usage.soft_page_faults,
            hard_page_faults: m.usage.hard_page_faults,
            disk_inputs: m.usage.disk_inputs,
            disk_outputs: m.usage.disk_outputs,
            voluntary_csw: m.usage.voluntary_csw,
            involuntary_csw: m.usage.involuntary_csw,
            host: self.host,
        }
    }

    fn fmt_standard(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = &self.measurement;
        let time = |d| format_duration(d, self.time_format);

        writeln!(f, "=== stats ===")?;
        if let Some(code) = m.status.code() {
            writeln!(f, "{:<11}{}", "exit code:", code)?;
        }
        if let Some(signal) = m.status.signal() {
            let name = m.status.signal_description().unwrap_or_default();
            writeln!(f, "{:<11}({}) {}", "signal:", signal, name)?;
        }
        writeln!(f, "{:<11}{}", "real:", time(m.real))?;
        writeln!(f, "{:<11}{}", "user:", time(m.usage.user))?;
        writeln!(f, "{:<11}{}", "sys:", time(m.usage.sys))?;

        if self.extended {
            let u = &m.usage;
            let page_size = self.host.and_then(|h| h.page_size);
            writeln!(f, "{:<11}{}", "cmdline:", self.command_line)?;
            writeln!(f, "{:<11}{:.2}%", "cpu:", u.percent_cpu(m.real))?;
            writeln!(f, "{:<11}{}", "max_rss:", bytes(Some(u.max_rss)))?;
            writeln!(f, "{:<11}{}", "minflt:", u.soft_page_faults)?;
            writeln!(f, "{:<11}{}", "majflt:", u.hard_page_faults)?;
            writeln!(f, "{:<11}{}", "inblock:", u.disk_inputs)?;
            writeln!(f, "{:<11}{}", "oublock:", u.disk_outputs)?;
            writeln!(f, "{:<11}{}", "nvcsw:", u.voluntary_csw)?;
            writeln!(f, "{:<11}{}", "nivcsw:", u.involuntary_csw)?;
            writeln!(f, "{:<11}{}", "page_size:", bytes(page_size))?;
        }

        if let Some(host) = &self.host {
            let n_cpu = host.cpu_count.map_or(NO_DATA.into(), |n| n.to_string());
            writeln!(f, "{:<11}{}", "n_cpu:", n_cpu)?;
            writeln!(f, "{:<11}{}", "mem_avail:", bytes(host.mem_avail))?;
            writeln!(f, "{:<11}{}", "mem_total:", bytes(host.mem_total))?;
        }

        Ok(())
    }
}

/// `1536 (1.5000 KB)`, or the placeholder.
fn bytes(value: Option<u64>) -> String {
    value.map_or(NO_DATA.into(), |b| format!("{} ({})", b, human_size(b)))
}

#[derive(Serialize)]
struct JsonReport<'a> {
    cmdline: &'a str,
    exit_code: Option<i32>,
    term_signal: Option<i32>,
    term_signal_name: Option<String>,
    time_format: TimeFormat,
    time_real: String,
    time_user: String,
    time_sys: String,
    time_real_ns: u64,
    time_user_ns: u64,
    time_sys_ns: u64,
    percent_cpu: f64,
    max_rss: u64,
    soft_page_faults: i64,
    hard_page_faults: i64,
    disk_inputs: i64,
    disk_outputs: i64,
    voluntary_csw: i64,
    involuntary_csw: i64,
    host: Option<HostInfo>,
}

impl Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.output_format {
            OutputFormat::Standard => self.fmt_standard(f),
            OutputFormat::Json => {
                let json_string = serde_json::to_string(&self.to_json()).map_err(|_| fmt::Error)?;
                writeln!(f, "{}", json_string)
            }
        }
    }
}
