//! Pluggable structured logging for the kernel.
//!
//! The kernel never assumes a particular logging backend is present: a
//! [`LogSink`] is a trait object the scheduler writes to, with a
//! `tracing`-backed implementation behind the `tracing` cargo feature and a
//! no-op default otherwise.

use tickgraph_common::{GroupId, Phase, Tick};

#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

/// A single structured log record, carrying the firing coordinates the
/// scheduler had when it was emitted.
#[derive(Debug, Clone)]
pub struct LogRecord<'a> {
    pub level: Level,
    pub tick: Tick,
    pub phase: Phase,
    pub group: GroupId,
    pub component: &'a str,
    pub message: &'a str,
}

/// A destination for structured log records.
pub trait LogSink {
    fn log(&self, record: &LogRecord<'_>);
}

/// Discards every record. The default when the `tracing` feature is off.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn log(&self, _record: &LogRecord<'_>) {}
}

#[cfg(feature = "tracing")]
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

#[cfg(feature = "tracing")]
impl LogSink for TracingLogSink {
    fn log(&self, record: &LogRecord<'_>) {
        match record.level {
            Level::Debug => tracing::debug!(
                tick = record.tick.0,
                phase = %record.phase,
                group = record.group.0,
                component = record.component,
                "{}",
                record.message
            ),
            Level::Info => tracing::info!(
                tick = record.tick.0,
                phase = %record.phase,
                group = record.group.0,
                component = record.component,
                "{}",
                record.message
            ),
            Level::Warn => tracing::warn!(
                tick = record.tick.0,
                phase = %record.phase,
                group = record.group.0,
                component = record.component,
                "{}",
                record.message
            ),
            Level::Error => tracing::error!(
                tick = record.tick.0,
                phase = %record.phase,
                group = record.group.0,
                component = record.component,
                "{}",
                record.message
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct CapturingSink {
        messages: RefCell<Vec<String>>,
    }

    impl LogSink for CapturingSink {
        fn log(&self, record: &LogRecord<'_>) {
            self.messages.borrow_mut().push(record.message.to_string());
        }
    }

    #[test]
    fn null_sink_drops_everything() {
        let sink = NullLogSink;
        sink.log(&LogRecord {
            level: Level::Info,
            tick: Tick::ZERO,
            phase: Phase::Tick,
            group: GroupId::UNSORTED,
            component: "test",
            message: "hello",
        });
    }

    #[test]
    fn capturing_sink_records_messages() {
        let sink = CapturingSink::default();
        sink.log(&LogRecord {
            level: Level::Warn,
            tick: Tick(3),
            phase: Phase::Flush,
            group: GroupId(2),
            component: "lsu",
            message: "stall",
        });
        assert_eq!(sink.messages.borrow().as_slice(), ["stall"]);
    }
}
