//! Schedule Expressions
//!
//! The importer treats scheduling as an in/out-of-schedule oracle over daily
//! time windows. An expression is a `;`-separated list of `HHMM-HHMM`
//! windows in local time; a window wrapping midnight (`2200-0300`) is
//! valid. The empty expression means always in schedule.

use anyhow::{bail, Context, Result};
use chrono::{Local, NaiveTime, Timelike};

/// Parsed daily schedule windows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schedule {
    windows: Vec<(NaiveTime, NaiveTime)>,
}

fn parse_hhmm(s: &str) -> Result<NaiveTime> {
    if s.len() != 4 || !s.bytes().all(|b| b.is_ascii_digit()) {
        bail!("expected HHMM, got {s:?}");
    }
    let hh: u32 = s[..2].parse()?;
    let mm: u32 = s[2..].parse()?;
    NaiveTime::from_hms_opt(hh, mm, 0).with_context(|| format!("invalid time {s:?}"))
}

impl Schedule {
    /// Parse an expression like `0845-1345;1500-0500`.
    pub fn parse(expr: &str) -> Result<Self> {
        let mut windows = Vec::new();
        for part in expr.split(';').map(str::trim).filter(|p| !p.is_empty()) {
            let (start, end) = part
                .split_once('-')
                .with_context(|| format!("expected HHMM-HHMM window, got {part:?}"))?;
            windows.push((parse_hhmm(start.trim())?, parse_hhmm(end.trim())?));
        }
        Ok(Self { windows })
    }

    /// No windows configured: always in schedule.
    pub fn is_always(&self) -> bool {
        self.windows.is_empty()
    }

    /// Whether `t` falls inside any window. Start is inclusive, end
    /// exclusive; a window with start > end wraps midnight.
    pub fn is_in(&self, t: NaiveTime) -> bool {
        if self.windows.is_empty() {
            return true;
        }
        self.windows.iter().any(|&(start, end)| {
            if start <= end {
                start <= t && t < end
            } else {
                t >= start || t < end
            }
        })
    }

    pub fn is_in_now(&self) -> bool {
        let now = Local::now().time();
        // Truncate to the minute; windows are minute-granular.
        let t = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or(now);
        self.is_in(t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(hh: u32, mm: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hh, mm, 0).unwrap()
    }

    #[test]
    fn test_empty_is_always_in() {
        let s = Schedule::parse("").unwrap();
        assert!(s.is_always());
        assert!(s.is_in(t(3, 14)));
    }

    #[test]
    fn test_simple_window() {
        let s = Schedule::parse("0845-1345").unwrap();
        assert!(s.is_in(t(8, 45)));
        assert!(s.is_in(t(12, 0)));
        assert!(!s.is_in(t(13, 45)));
        assert!(!s.is_in(t(8, 44)));
    }

    #[test]
    fn test_overnight_window() {
        let s = Schedule::parse("1500-0500").unwrap();
        assert!(s.is_in(t(23, 0)));
        assert!(s.is_in(t(2, 0)));
        assert!(!s.is_in(t(5, 0)));
        assert!(!s.is_in(t(12, 0)));
    }

    #[test]
    fn test_multiple_windows() {
        let s = Schedule::parse("0845-1345;1500-0500").unwrap();
        assert!(s.is_in(t(9, 0)));
        assert!(s.is_in(t(16, 0)));
        assert!(!s.is_in(t(14, 0)));
    }

    #[test]
    fn test_parse_errors() {
        assert!(Schedule::parse("banana").is_err());
        assert!(Schedule::parse("08x5-1345").is_err());
        assert!(Schedule::parse("2500-1345").is_err());
    }
}
