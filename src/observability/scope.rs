//! Begin/complete bracketing for multi-step operations
//!
//! A scope logs `{name}_BEGIN` when opened and exactly one of
//! `{name}_COMPLETE`, `{name}_FAILED` or `{name}_INCOMPLETE` when it ends.
//! Completion lines carry `elapsed_ms`.

use std::cell::Cell;
use std::time::Instant;

use super::logger::{Logger, Severity};

/// Logs the start and outcome of a named operation.
///
/// ```ignore
/// let scope = ObservationScope::with_fields("GLOBAL_PLAN", &[("query_id", &id)]);
/// let plan = planner.build(id, &root)?;
/// scope.complete_with_fields(&[("blocks", &plan.len().to_string())]);
/// ```
pub struct ObservationScope<'a> {
    name: &'a str,
    completed: Cell<bool>,
    fields: Vec<(&'a str, String)>,
    timer: Timer,
}

impl<'a> ObservationScope<'a> {
    pub fn new(name: &'a str) -> Self {
        Self::with_fields(name, &[])
    }

    /// Opens a scope whose fields repeat on the closing line
    pub fn with_fields(name: &'a str, fields: &[(&'a str, &str)]) -> Self {
        Logger::info(&format!("{}_BEGIN", name), fields);

        Self {
            name,
            completed: Cell::new(false),
            fields: fields.iter().map(|(k, v)| (*k, v.to_string())).collect(),
            timer: Timer::new(),
        }
    }

    pub fn complete(self) {
        self.complete_with_fields(&[]);
    }

    pub fn complete_with_fields(self, extra_fields: &[(&str, &str)]) {
        self.completed.set(true);
        let elapsed = self.timer.elapsed_ms();

        let mut all_fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        all_fields.extend(extra_fields.iter().copied());
        all_fields.push(("elapsed_ms", &elapsed));

        Logger::info(&format!("{}_COMPLETE", self.name), &all_fields);
    }

    /// Logs `{name}_FAILED` at ERROR
    pub fn fail(self, reason: &str) {
        self.finish_failed(Severity::Error, reason);
    }

    /// Logs `{name}_FAILED` at FATAL
    pub fn fail_fatal(self, reason: &str) {
        self.finish_failed(Severity::Fatal, reason);
    }

    fn finish_failed(self, severity: Severity, reason: &str) {
        self.completed.set(true);
        let mut all_fields: Vec<(&str, &str)> =
            self.fields.iter().map(|(k, v)| (*k, v.as_str())).collect();
        all_fields.push(("reason", reason));
        Logger::log(severity, &format!("{}_FAILED", self.name), &all_fields);
    }

    pub fn is_completed(&self) -> bool {
        self.completed.get()
    }
}

impl Drop for ObservationScope<'_> {
    fn drop(&mut self) {
        if !self.completed.get() {
            Logger::warn(
                &format!("{}_INCOMPLETE", self.name),
                &[("reason", "scope dropped without completion")],
            );
        }
    }
}

/// Wall-clock timer for `elapsed_ms` fields
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_ms(&self) -> String {
        self.start.elapsed().as_millis().to_string()
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_lifecycle() {
        let scope = ObservationScope::with_fields("GLOBAL_PLAN", &[("query_id", "q-1")]);
        assert!(!scope.is_completed());
        scope.complete_with_fields(&[("blocks", "3")]);
    }

    #[test]
    fn test_scope_fail_variants() {
        ObservationScope::new("INDEX_BUILD").fail("order violation");
        ObservationScope::new("INDEX_OPEN").fail_fatal("bad magic");
    }

    #[test]
    fn test_scope_drop_without_complete() {
        let scope = ObservationScope::new("BLOCK_EXEC");
        drop(scope);
    }

    #[test]
    fn test_timer() {
        let timer = Timer::new();
        std::thread::sleep(std::time::Duration::from_millis(10));
        let ms: u64 = timer.elapsed_ms().parse().unwrap();
        assert!(ms >= 10);
    }
}
