//! Bounded record of notable simulation events
//!
//! Entries are mirrored to the `log` facade at debug level so a headless run
//! with `RUST_LOG=traffic_control=debug` shows the same history.

use log::debug;
use std::collections::VecDeque;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogCategory {
    Info,
    Jam,
    Emergency,
    Optimization,
    Override,
}

impl LogCategory {
    pub fn name(self) -> &'static str {
        match self {
            LogCategory::Info => "INFO",
            LogCategory::Jam => "JAM",
            LogCategory::Emergency => "EMERGENCY",
            LogCategory::Optimization => "OPTIMIZATION",
            LogCategory::Override => "OVERRIDE",
        }
    }
}

impl fmt::Display for LogCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// Simulated seconds at which the event happened
    pub time: f64,
    pub category: LogCategory,
    pub message: String,
}

impl fmt::Display for LogEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:>8.1}s] {:<12} {}", self.time, self.category, self.message)
    }
}

/// Fixed-capacity ring buffer; the oldest entry is evicted once full
#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    capacity: usize,
    /// Entries pushed over the whole run, including evicted ones
    total: u64,
}

impl EventLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
            total: 0,
        }
    }

    pub fn push(&mut self, time: f64, category: LogCategory, message: impl Into<String>) {
        let entry = LogEntry {
            time,
            category,
            message: message.into(),
        };
        debug!("{}", entry);

        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
        self.total += 1;
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    /// Copy of the retained entries, oldest first
    pub fn to_vec(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn total_pushed(&self) -> u64 {
        self.total
    }

    pub fn count(&self, category: LogCategory) -> usize {
        self.entries.iter().filter(|e| e.category == category).count()
    }
}
