//! Event-log collaborator contract and an in-process implementation.

use std::time::SystemTime;

use parking_lot::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EnumEventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpecEvent {
    pub source: String,
    pub severity: EnumEventSeverity,
    pub category: String,
    pub message: String,
    pub timestamp: SystemTime,
}

impl SpecEvent {
    pub fn now(
        source: impl Into<String>,
        severity: EnumEventSeverity,
        category: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            severity,
            category: category.into(),
            message: message.into(),
            timestamp: SystemTime::now(),
        }
    }
}

/// Query for [`EventLog::find`]; `None` leaves a field unconstrained.
/// `begin` and `end` are inclusive.
#[derive(Debug, Clone, Default)]
pub struct SpecEventFilter {
    pub source: Option<String>,
    pub severity: Option<EnumEventSeverity>,
    pub category: Option<String>,
    pub begin: Option<SystemTime>,
    pub end: Option<SystemTime>,
}

impl SpecEventFilter {
    pub fn matches(&self, event: &SpecEvent) -> bool {
        self.source.as_deref().is_none_or(|v| v == event.source)
            && self.severity.is_none_or(|v| v == event.severity)
            && self.category.as_deref().is_none_or(|v| v == event.category)
            && self.begin.is_none_or(|v| event.timestamp >= v)
            && self.end.is_none_or(|v| event.timestamp <= v)
    }
}

pub trait EventLog {
    /// Matching events, earliest first.
    fn find(&self, filter: &SpecEventFilter) -> Vec<SpecEvent>;

    fn log(&self, event: SpecEvent) -> bool;
}

#[derive(Debug, Default)]
pub struct MemoryEventLog {
    l_events: Mutex<Vec<SpecEvent>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EventLog for MemoryEventLog {
    fn find(&self, filter: &SpecEventFilter) -> Vec<SpecEvent> {
        let mut l_found: Vec<SpecEvent> = self
            .l_events
            .lock()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect();
        l_found.sort_by_key(|e| e.timestamp);
        l_found
    }

    fn log(&self, event: SpecEvent) -> bool {
        self.l_events.lock().push(event);
        true
    }
}
