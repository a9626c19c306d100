//! The response channel: how engine output travels from an adapter to the
//! registered handler.
//!
//! Adapters never touch the process's standard output. Each one is handed a
//! [`ResponseSink`] at construction and either writes whole lines into it
//! directly or wraps it in a [`SinkWriter`], which behaves like a captured
//! stdout stream and splits arbitrary writes into lines.

use std::io::{self, Write};

use async_trait::async_trait;
use log::{trace, warn};
use tokio::sync::mpsc;

/// Receives engine output, one call per line, never concurrently.
#[async_trait]
pub trait ResponseHandler: Send + Sync {
    async fn on_response(&self, response: String);
}

#[async_trait]
impl<F> ResponseHandler for F
where
    F: Fn(String) + Send + Sync,
{
    async fn on_response(&self, response: String) {
        self(response)
    }
}

/// Anything an engine core can print a line to.
pub trait Output {
    fn emit(&mut self, line: &str);
}

/// Producer half of the response channel.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    tx: mpsc::UnboundedSender<String>,
}

impl ResponseSink {
    /// Creates a sink together with the queue that receives its lines.
    pub fn channel() -> (ResponseSink, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ResponseSink { tx }, rx)
    }

    pub fn send_line(&self, line: impl Into<String>) {
        // a closed channel means the session is gone, late output is dropped
        if self.tx.send(line.into()).is_err() {
            trace!("response channel closed, dropping engine output");
        }
    }

    /// Wraps the sink into a line-buffered byte stream.
    pub fn writer(&self) -> SinkWriter {
        SinkWriter::new(self.clone())
    }
}

impl Output for ResponseSink {
    fn emit(&mut self, line: &str) {
        self.send_line(line);
    }
}

/// `io::Write` adapter that forwards every complete line to a [`ResponseSink`].
///
/// Partial lines stay buffered until their newline arrives; whatever is left
/// over is flushed as a final line on drop.
#[derive(Debug)]
pub struct SinkWriter {
    sink: ResponseSink,
    pending: Vec<u8>,
}

impl SinkWriter {
    pub fn new(sink: ResponseSink) -> Self {
        Self {
            sink,
            pending: Vec::new(),
        }
    }

    fn push_line(&mut self, mut line: Vec<u8>) {
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        self.sink
            .send_line(String::from_utf8_lossy(&line).into_owned());
    }
}

impl Write for SinkWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        for &byte in buf {
            if byte == b'\n' {
                let line = std::mem::take(&mut self.pending);
                self.push_line(line);
            } else {
                self.pending.push(byte);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Output for SinkWriter {
    fn emit(&mut self, line: &str) {
        if let Err(e) = writeln!(self, "{line}") {
            warn!("failed writing engine output: {e}");
        }
    }
}

impl Drop for SinkWriter {
    fn drop(&mut self) {
        if !self.pending.is_empty() {
            let line = std::mem::take(&mut self.pending);
            self.push_line(line);
        }
    }
}
