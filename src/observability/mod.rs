//! Observability for tessera
//!
//! - Structured JSON log lines (`Logger`)
//! - Typed lifecycle events (`Event`)
//! - Monotonic counters (`MetricsRegistry`)
//! - Begin/complete bracketing (`ObservationScope`)
//!
//! Observability is synchronous and read-only: it never changes the outcome
//! of planning or execution, and a failed log write is dropped.

mod events;
mod logger;
mod metrics;
mod scope;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{MetricsRegistry, MetricsSnapshot};
pub use scope::{ObservationScope, Timer};

fn severity_of(event: Event) -> Severity {
    if event.is_fatal() {
        Severity::Fatal
    } else if event.is_failure() {
        Severity::Error
    } else {
        Severity::Info
    }
}

/// Log a lifecycle event
pub fn log_event(event: Event) {
    Logger::log(severity_of(event), event.as_str(), &[]);
}

/// Log a lifecycle event with fields
pub fn log_event_with_fields(event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity_of(event), event.as_str(), fields);
}
