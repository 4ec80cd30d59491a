use std::io::Write;

use console::{style, Term};

use super::{Io, Verbosity};

/// Terminal sink writing to stderr
pub struct ConsoleOutput {
    term: Term,
    verbosity: Verbosity,
}

impl ConsoleOutput {
    pub fn new() -> Self {
        Self {
            term: Term::stderr(),
            verbosity: Verbosity::Normal,
        }
    }

    pub fn with_verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    fn should_output(&self, min_verbosity: Verbosity) -> bool {
        self.verbosity >= min_verbosity
    }

    fn write_line(&self, message: &str) {
        if !self.should_output(Verbosity::Normal) {
            return;
        }
        // Downgrades are highlighted the same way Composer does
        let _ = if message.contains("Downgrading") {
            writeln!(&self.term, "{}", style(message).yellow())
        } else {
            writeln!(&self.term, "{}", message)
        };
    }
}

impl Default for ConsoleOutput {
    fn default() -> Self {
        Self::new()
    }
}

impl Io for ConsoleOutput {
    fn write(&self, message: &str) {
        self.write_line(message);
    }

    fn write_error(&self, message: &str) {
        self.write_line(message);
    }

    fn verbosity(&self) -> Verbosity {
        self.verbosity
    }
}
