//! The session log: a diagnostic side channel.
//!
//! Every inbound and outbound event is recorded here with a one-line
//! summary, for display on demand. The log has no effect on protocol
//! handling; recording never fails and never blocks ingestion.

use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::debug;

const LOG_CAPACITY: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Inbound,
    Outbound,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Inbound => write!(f, "<-"),
            Direction::Outbound => write!(f, "->"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogEntry {
    pub seq: u64,
    pub direction: Direction,
    pub summary: String,
}

#[derive(Debug, Default)]
struct Inner {
    next_seq: u64,
    entries: VecDeque<LogEntry>,
}

/// Shared, capped, in-memory event log. Cloning shares the same buffer.
#[derive(Debug, Clone, Default)]
pub struct SessionLog {
    inner: Arc<Mutex<Inner>>,
}

impl SessionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, direction: Direction, summary: impl Into<String>) {
        let summary = summary.into();
        debug!(target: "session", %direction, %summary);
        let Ok(mut inner) = self.inner.lock() else {
            return;
        };
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.entries.push_back(LogEntry {
            seq,
            direction,
            summary,
        });
        if inner.entries.len() > LOG_CAPACITY {
            inner.entries.pop_front();
        }
    }

    /// The most recent `count` entries, oldest first.
    pub fn recent(&self, count: usize) -> Vec<LogEntry> {
        let Ok(inner) = self.inner.lock() else {
            return Vec::new();
        };
        inner
            .entries
            .iter()
            .skip(inner.entries.len().saturating_sub(count))
            .cloned()
            .collect()
    }
}
