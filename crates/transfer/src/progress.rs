//! rclone one-line stats parsing
//!
//! With `--stats-one-line -v` rclone periodically logs a line such as
//! `INFO  :   45.000 MiB / 100.000 MiB, 45%, 5.000 MiB/s, ETA 11s`.
//! Only the percentage, speed and ETA are read; the byte count is derived
//! from the task's known size so units never need parsing.

use std::sync::LazyLock;

use regex::Regex;

static STATS_LINE: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(r"(\d{1,3})%,\s*([\d.]+\s*[KMGTP]?i?B(?:ytes)?/s)(?:,\s*ETA\s+(\S+))?").ok()
});

/// Progress reported by one stats line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProgress {
    pub percent: u8,
    pub speed: String,
    /// `None` while rclone cannot estimate (`ETA -`).
    pub eta: Option<String>,
}

impl TransferProgress {
    /// Bytes done out of `size`, per the reported percentage.
    pub fn transferred(&self, size: u64) -> u64 {
        size.saturating_mul(u64::from(self.percent)) / 100
    }
}

/// Parse a stats line, `None` for any other output.
pub fn parse_stats_line(line: &str) -> Option<TransferProgress> {
    let caps = STATS_LINE.as_ref()?.captures(line)?;
    let percent: u8 = caps.get(1)?.as_str().parse().ok()?;
    let eta = caps
        .get(3)
        .map(|m| m.as_str().trim_end_matches(','))
        .filter(|eta| !eta.is_empty() && *eta != "-")
        .map(str::to_string);
    Some(TransferProgress {
        percent: percent.min(100),
        speed: caps.get(2)?.as_str().to_string(),
        eta,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_one_line_stats() {
        let line = "2024/05/01 10:00:05 INFO  :   45.000 MiB / 100.000 MiB, 45%, 5.000 MiB/s, ETA 11s";
        let progress = parse_stats_line(line).unwrap();
        assert_eq!(
            progress,
            TransferProgress {
                percent: 45,
                speed: "5.000 MiB/s".into(),
                eta: Some("11s".into()),
            }
        );
        assert_eq!(progress.transferred(1000), 450);
    }

    #[test]
    fn unknown_eta_is_none() {
        let line = "INFO  :         0 B / 1.000 GiB, 0%, 0 B/s, ETA -";
        let progress = parse_stats_line(line).unwrap();
        assert_eq!(progress.percent, 0);
        assert_eq!(progress.speed, "0 B/s");
        assert_eq!(progress.eta, None);
    }

    #[test]
    fn legacy_bytes_per_second_unit() {
        let progress = parse_stats_line("Transferred: 1.5M / 3M, 50%, 1.2 MBytes/s, ETA 1m2s").unwrap();
        assert_eq!(progress.speed, "1.2 MBytes/s");
        assert_eq!(progress.eta.as_deref(), Some("1m2s"));
    }

    #[test]
    fn other_lines_are_ignored() {
        assert!(parse_stats_line("INFO  : a.bin: Copied (new)").is_none());
        assert!(parse_stats_line("ERROR : quota 100% used").is_none());
        assert!(parse_stats_line("").is_none());
    }

    #[test]
    fn transferred_never_exceeds_size() {
        let done = TransferProgress {
            percent: 100,
            speed: "1 MiB/s".into(),
            eta: None,
        };
        assert_eq!(done.transferred(u64::MAX), u64::MAX / 100);
        assert_eq!(done.transferred(7), 7);
    }
}
