use parking_lot::Mutex;

use super::{Io, Verbosity};

/// Sink that records every line, in order.
#[derive(Default)]
pub struct BufferOutput {
    lines: Mutex<Vec<String>>,
    verbosity: Verbosity,
}

impl BufferOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// All lines written so far, regular and diagnostic interleaved
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }

    pub fn output(&self) -> String {
        self.lines.lock().join("\n")
    }

    pub fn clear(&self) {
        self.lines.lock().clear();
    }
}

impl Io for BufferOutput {
    fn write(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }

    fn write_error(&self, message: &str) {
        self.lines.lock().push(message.to_string());
    }

    fn verbosity(&self) -> Verbosity {
        self.verbosity
    }
}

/// Sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl Io for NullOutput {
    fn write(&self, _message: &str) {}

    fn write_error(&self, _message: &str) {}

    fn verbosity(&self) -> Verbosity {
        Verbosity::Normal
    }
}
