use serde::Serialize;
use std::time::Duration;

/// Binary (1024) byte units, smallest first.
const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

/// Round to the four decimal places `human_size` prints.
fn round4(value: f64) -> f64 {
    (value * 10_000.0).round() / 10_000.0
}

/// Format a byte count with the largest unit for which the value is at least one, e.g.
/// `1.5000 KB`. Values beyond the last unit stay in terabytes.
///
/// The unit is picked on the rounded value, so nothing prints as `1024.0000` of a unit.
pub fn human_size(bytes: u64) -> String {
    let mut value = bytes as f64;
    let mut unit = 0;
    while round4(value) >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.4} {}", value, BYTE_UNITS[unit])
}

/// How durations are rendered in the report.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum TimeFormat {
    /// Pick a unit to suit the magnitude.
    Normal,
    /// Seconds, with nine decimal places.
    #[default]
    Seconds,
    Milli,
    Micro,
    Nano,
}

/// Milliseconds, with nanoseconds kept in the fraction.
fn millis_f64(d: Duration) -> f64 {
    (d.as_secs() * 1_000) as f64 + (d.subsec_nanos() as f64 / 1_000_000.0)
}

/// Microseconds, with nanoseconds kept in the fraction.
fn micros_f64(d: Duration) -> f64 {
    (d.as_secs() * 1_000_000) as f64 + (d.subsec_nanos() as f64 / 1_000.0)
}

pub fn format_duration(d: Duration, format: TimeFormat) -> String {
    match format {
        TimeFormat::Normal => {
            if d.as_secs() > 0 {
                format!("{:.9}s", d.as_secs_f64())
            } else if d.subsec_nanos() >= 1_000_000 {
                format!("{:.6}ms", millis_f64(d))
            } else if d.subsec_nanos() >= 1_000 {
                format!("{:.3}µs", micros_f64(d))
            } else {
                format!("{}ns", d.as_nanos())
            }
        }
        TimeFormat::Seconds => format!("{:.9}", d.as_secs_f64()),
        TimeFormat::Milli => format!("{:.6}ms", millis_f64(d)),
        TimeFormat::Micro => format!("{:.3}µs", micros_f64(d)),
        TimeFormat::Nano => format!("{}ns", d.as_nanos()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values_stay_in_bytes() {
        assert_eq!(human_size(0), "0.0000 B");
        assert_eq!(human_size(1023), "1023.0000 B");
    }

    #[test]
    fn picks_largest_unit_at_least_one() {
        assert_eq!(human_size(1024), "1.0000 KB");
        assert_eq!(human_size(1536), "1.5000 KB");
        assert_eq!(human_size(3 * 1024 * 1024), "3.0000 MB");
        assert_eq!(human_size(16 * 1024 * 1024 * 1024), "16.0000 GB");
        assert_eq!(human_size(2 * 1024u64.pow(4)), "2.0000 TB");
    }

    #[test]
    fn unit_is_picked_after_rounding() {
        assert_eq!(human_size(1024 * 1024 - 1), "1023.9990 KB");
        assert_eq!(human_size(1024 * 1024 * 1024 - 1), "1.0000 GB");
        assert_eq!(human_size(1024u64.pow(4) - 1), "1.0000 TB");
    }

    #[test]
    fn terabytes_is_the_ceiling() {
        assert_eq!(human_size(2048 * 1024u64.pow(4)), "2048.0000 TB");
    }

    #[test]
    fn human_size_is_monotonic() {
        let to_bytes = |s: String| -> f64 {
            let (value, unit) = s.split_once(' ').unwrap();
            let power = BYTE_UNITS.iter().position(|u| *u == unit).unwrap();
            value.parse::<f64>().unwrap() * 1024f64.powi(power as i32)
        };

        let mut samples = vec![0u64, 1, 999, 1000];
        for power in 1..=5u32 {
            let boundary = 1024u64.pow(power);
            samples.extend([boundary - 1, boundary, boundary + 1, boundary * 3 / 2]);
        }
        samples.sort_unstable();

        let mut previous = 0.0;
        for bytes in samples {
            let shown = to_bytes(human_size(bytes));
            assert!(shown >= previous, "{bytes} rendered smaller than a smaller value");
            previous = shown;
        }
    }

    #[test]
    fn seconds_have_nine_places() {
        let d = Duration::new(1, 500_000_000);
        assert_eq!(format_duration(d, TimeFormat::Seconds), "1.500000000");
        assert_eq!(format_duration(Duration::ZERO, TimeFormat::Seconds), "0.000000000");
    }

    #[test]
    fn normal_adapts_to_magnitude() {
        assert_eq!(
            format_duration(Duration::from_secs(2), TimeFormat::Normal),
            "2.000000000s"
        );
        assert_eq!(
            format_duration(Duration::from_micros(1_500), TimeFormat::Normal),
            "1.500000ms"
        );
        assert_eq!(
            format_duration(Duration::from_nanos(2_500), TimeFormat::Normal),
            "2.500µs"
        );
        assert_eq!(
            format_duration(Duration::from_nanos(12), TimeFormat::Normal),
            "12ns"
        );
    }

    #[test]
    fn fixed_units() {
        let d = Duration::from_micros(1_234_567);
        assert_eq!(format_duration(d, TimeFormat::Milli), "1234.567000ms");
        assert_eq!(format_duration(d, TimeFormat::Micro), "1234567.000µs");
        assert_eq!(format_duration(d, TimeFormat::Nano), "1234567000ns");
    }
}
