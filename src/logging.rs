use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured log event, in case a caller wants to collect events rather
/// than (or in addition to) plain `log` crate output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub timestamp: DateTime<Utc>,
    pub level: LogLevel,
    pub component: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LogLevel::Debug => write!(f, "DEBUG"),
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Warn => write!(f, "WARN"),
            LogLevel::Error => write!(f, "ERROR"),
        }
    }
}

impl LogEvent {
    pub fn new(component: impl Into<String>, level: LogLevel, message: impl Into<String>) -> Self {
        LogEvent {
            timestamp: Utc::now(),
            level,
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn to_text(&self) -> String {
        format!(
            "[{}] {} {}: {}",
            self.timestamp.format("%Y-%m-%d %H:%M:%S%.3f"),
            self.level,
            self.component,
            self.message
        )
    }
}

/// Bounded in-memory event buffer, for callers (tests, CLI `status`)
/// that want to inspect what the engine logged without scraping stdout.
pub struct EventLog {
    events: Vec<LogEvent>,
    max_size: usize,
}

impl EventLog {
    pub fn new(max_size: usize) -> Self {
        EventLog {
            events: Vec::new(),
            max_size,
        }
    }

    pub fn log(&mut self, event: LogEvent) {
        self.events.push(event);
        if self.events.len() > self.max_size {
            self.events.remove(0);
        }
    }

    pub fn events(&self) -> &[LogEvent] {
        &self.events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_prunes_oldest() {
        let mut log = EventLog::new(2);
        log.log(LogEvent::new("gc", LogLevel::Info, "a"));
        log.log(LogEvent::new("gc", LogLevel::Info, "b"));
        log.log(LogEvent::new("gc", LogLevel::Info, "c"));
        assert_eq!(log.events().len(), 2);
        assert_eq!(log.events()[0].message, "b");
    }
}
