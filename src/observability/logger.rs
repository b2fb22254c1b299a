//! Structured JSON logger
//!
//! One line per event: `{"ts":..,"event":..,"severity":..,<fields>}`.
//! Fields are sorted by key so identical events render identically apart
//! from the timestamp. ERROR and FATAL go to stderr, everything else to
//! stdout. Lines below the minimum severity are dropped.

use std::collections::HashSet;
use std::fmt;
use std::io::{self, Write};
use std::sync::atomic::{AtomicU8, Ordering};

use chrono::{SecondsFormat, Utc};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Severity {
    Trace = 0,
    Info = 1,
    Warn = 2,
    Error = 3,
    /// Data corruption; the owning query cannot continue
    Fatal = 4,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Trace => "TRACE",
            Severity::Info => "INFO",
            Severity::Warn => "WARN",
            Severity::Error => "ERROR",
            Severity::Fatal => "FATAL",
        }
    }

    pub fn is_failure(&self) -> bool {
        *self >= Severity::Error
    }

    fn from_u8(level: u8) -> Self {
        match level {
            0 => Severity::Trace,
            1 => Severity::Info,
            2 => Severity::Warn,
            3 => Severity::Error,
            _ => Severity::Fatal,
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

static MIN_SEVERITY: AtomicU8 = AtomicU8::new(Severity::Info as u8);

pub struct Logger;

impl Logger {
    /// Lines below `severity` are dropped from now on (process-wide)
    pub fn set_min_severity(severity: Severity) {
        MIN_SEVERITY.store(severity as u8, Ordering::Relaxed);
    }

    pub fn min_severity() -> Severity {
        Severity::from_u8(MIN_SEVERITY.load(Ordering::Relaxed))
    }

    pub fn log(severity: Severity, event: &str, fields: &[(&str, &str)]) {
        if severity < Self::min_severity() {
            return;
        }
        let ts = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        let line = render(&ts, severity, event, fields);
        // a failed log write is dropped
        if severity.is_failure() {
            let _ = io::stderr().lock().write_all(line.as_bytes());
        } else {
            let _ = io::stdout().lock().write_all(line.as_bytes());
        }
    }

    pub fn info(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Info, event, fields);
    }

    pub fn warn(event: &str, fields: &[(&str, &str)]) {
        Self::log(Severity::Warn, event, fields);
    }
}

/// One JSON line, newline-terminated. `ts`, `event` and `severity` lead;
/// a field that reuses one of those keys is dropped.
fn render(ts: &str, severity: Severity, event: &str, fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);

    let mut out = String::with_capacity(128);
    out.push('{');
    push_pair(&mut out, "ts", ts);
    out.push(',');
    push_pair(&mut out, "event", event);
    out.push(',');
    push_pair(&mut out, "severity", severity.as_str());

    let mut seen = HashSet::new();
    for (key, value) in sorted {
        if matches!(*key, "ts" | "event" | "severity") || !seen.insert(*key) {
            continue;
        }
        out.push(',');
        push_pair(&mut out, key, value);
    }
    out.push_str("}\n");
    out
}

fn push_pair(out: &mut String, key: &str, value: &str) {
    out.push_str(&Value::from(key).to_string());
    out.push(':');
    out.push_str(&Value::from(value).to_string());
}

#[cfg(test)]
mod tests {
    use super::*;

    const TS: &str = "2024-01-01T00:00:00.000Z";

    fn parse(line: &str) -> serde_json::Value {
        serde_json::from_str(line).unwrap()
    }

    #[test]
    fn test_render_leading_keys() {
        let line = render(TS, Severity::Info, "GLOBAL_PLAN_BUILT", &[("blocks", "10")]);
        let parsed = parse(&line);
        assert_eq!(parsed["ts"], TS);
        assert_eq!(parsed["event"], "GLOBAL_PLAN_BUILT");
        assert_eq!(parsed["severity"], "INFO");
        assert_eq!(parsed["blocks"], "10");
        assert!(line.find("\"event\"").unwrap() < line.find("\"severity\"").unwrap());
    }

    #[test]
    fn test_render_sorted_and_stable() {
        let a = render(TS, Severity::Warn, "X", &[("zebra", "1"), ("apple", "2")]);
        let b = render(TS, Severity::Warn, "X", &[("apple", "2"), ("zebra", "1")]);
        assert_eq!(a, b);
        assert!(a.find("apple").unwrap() < a.find("zebra").unwrap());
    }

    #[test]
    fn test_render_escapes_and_single_line() {
        let line = render(TS, Severity::Error, "X", &[("reason", "bad \"key\"\nat 4")]);
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(parse(&line)["reason"], "bad \"key\"\nat 4");
    }

    #[test]
    fn test_reserved_and_duplicate_keys_dropped() {
        let line = render(
            TS,
            Severity::Info,
            "X",
            &[("event", "spoof"), ("block", "1"), ("block", "2")],
        );
        let parsed = parse(&line);
        assert_eq!(parsed["event"], "X");
        assert_eq!(parsed["block"], "1");
    }

    #[test]
    fn test_severity_order() {
        assert!(Severity::Trace < Severity::Info);
        assert!(Severity::Error.is_failure());
        assert!(!Severity::Warn.is_failure());
        assert_eq!(Severity::from_u8(Severity::Warn as u8), Severity::Warn);
    }
}
