// ABOUTME: Destinations for host-prefixed output lines.
// ABOUTME: The default sink forwards every line to tracing with its command prefix.

use parking_lot::Mutex;
use std::fmt;
use tracing::Level;

/// Receives every line a host's command prints, plus the engine's own
/// per-host notices (invocation echo, stall warnings, soft failures).
///
/// Implementations are shared by all workers of a group and must be safe to
/// call concurrently.
pub trait OutputSink: Send + Sync + fmt::Debug {
    fn line(&self, prefix: &str, level: Level, message: &str);
}

/// Emits lines as `tracing` events on the `fleetrun::command` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn line(&self, prefix: &str, level: Level, message: &str) {
        if level == Level::ERROR {
            tracing::error!(target: "fleetrun::command", command_prefix = prefix, "{message}");
        } else if level == Level::WARN {
            tracing::warn!(target: "fleetrun::command", command_prefix = prefix, "{message}");
        } else if level == Level::INFO {
            tracing::info!(target: "fleetrun::command", command_prefix = prefix, "{message}");
        } else {
            tracing::debug!(target: "fleetrun::command", command_prefix = prefix, "{message}");
        }
    }
}

/// A line captured by [`MemorySink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SinkLine {
    pub prefix: String,
    pub level: Level,
    pub message: String,
}

/// Keeps every line in memory, in arrival order.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<SinkLine>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<SinkLine> {
        self.lines.lock().clone()
    }

    /// Messages logged for one prefix at one level.
    pub fn messages(&self, prefix: &str, level: Level) -> Vec<String> {
        self.lines
            .lock()
            .iter()
            .filter(|l| l.prefix == prefix && l.level == level)
            .map(|l| l.message.clone())
            .collect()
    }
}

impl OutputSink for MemorySink {
    fn line(&self, prefix: &str, level: Level, message: &str) {
        self.lines.lock().push(SinkLine {
            prefix: prefix.to_string(),
            level,
            message: message.to_string(),
        });
    }
}
