//! Observability for the posting list core
//!
//! - Structured logging (JSON lines)
//! - Process-wide counters
//! - Typed lifecycle events
//!
//! Observability never changes the outcome of the operation it observes.

mod events;
mod logger;
mod metrics;

pub use events::Event;
pub use logger::{Logger, Severity};
pub use metrics::{metrics, MetricsRegistry, MetricsSnapshot};

/// Log a lifecycle event with fields at its natural severity
pub fn log_event(event: Event, fields: &[(&str, &str)]) {
    let severity = if event.is_fatal() {
        Severity::Fatal
    } else {
        Severity::Info
    };
    Logger::log(severity, event.as_str(), fields);
}

/// Log a lifecycle event at an explicit severity
pub fn log_event_at(severity: Severity, event: Event, fields: &[(&str, &str)]) {
    Logger::log(severity, event.as_str(), fields);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_event() {
        log_event(Event::ListRead, &[("key", "k1")]);
        log_event(Event::CorruptRecord, &[("meta", "0")]);
    }

    #[test]
    fn test_log_event_at() {
        log_event_at(Severity::Warn, Event::UnparseableKey, &[("key", "zz")]);
    }
}
