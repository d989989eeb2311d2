//! Operator-facing progress output.

use std::sync::Mutex;

use console::style;

/// Receives ordered, human-readable progress lines.
///
/// Implementations must not panic or block for long; the deployment does not
/// wait on them.
pub trait ProgressSink: Send + Sync {
    fn line(&self, line: &str);
}

/// Forwards every line to `tracing` at info level.
#[derive(Debug, Default)]
pub struct TracingSink;

impl ProgressSink for TracingSink {
    fn line(&self, line: &str) {
        tracing::info!("{}", line);
    }
}

/// Prints lines to stderr, keeping stdout free for command output.
#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ProgressSink for ConsoleSink {
    fn line(&self, line: &str) {
        eprintln!("{} {}", style("›").cyan().bold(), line);
    }
}

/// Keeps every line in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    lines: Mutex<Vec<String>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().map(|l| l.clone()).unwrap_or_default()
    }
}

impl ProgressSink for MemorySink {
    fn line(&self, line: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(line.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemorySink::new();
        sink.line("one");
        sink.line("two");
        assert_eq!(sink.lines(), vec!["one", "two"]);
    }
}
