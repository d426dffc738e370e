//! Log sinks for worker output
//!
//! Append-only, arrival-ordered, never blocks the producer.

use tokio::sync::mpsc;
use tracing::info;

pub trait LogSink: Send + Sync {
    fn emit(&self, line: &str);
}

/// Forwards lines to whoever holds the receiving end (a console, a UI, a test).
#[derive(Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl LogSink for ChannelSink {
    fn emit(&self, line: &str) {
        // receiver gone means nobody is watching; dropping the line is fine
        let _ = self.tx.send(line.to_string());
    }
}

/// Routes lines into the tracing pipeline under the `worker` target.
#[derive(Clone, Copy, Default)]
pub struct TracingSink;

impl LogSink for TracingSink {
    fn emit(&self, line: &str) {
        info!(target: "worker", "{}", line);
    }
}
