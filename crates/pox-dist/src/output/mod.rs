//! User-facing output sinks.
//!
//! The downloader reports progress ("Installing", "Loading from cache") and
//! warnings ("Downgrading") through the [`Io`] trait. Sinks never fail: a line
//! that cannot be written is dropped.

mod buffer;
mod terminal;

pub use buffer::{BufferOutput, NullOutput};
pub use terminal::ConsoleOutput;

/// Verbosity levels
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
    VeryVerbose,
    Debug,
}

pub trait Io: Send + Sync {
    /// Write a line to the regular output
    fn write(&self, message: &str);

    /// Write a line to the diagnostic output
    fn write_error(&self, message: &str);

    fn verbosity(&self) -> Verbosity {
        Verbosity::Normal
    }

    fn is_verbose(&self) -> bool {
        self.verbosity() >= Verbosity::Verbose
    }

    fn is_debug(&self) -> bool {
        self.verbosity() >= Verbosity::Debug
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_ordering() {
        assert!(Verbosity::Quiet < Verbosity::Normal);
        assert!(Verbosity::Normal < Verbosity::Verbose);
        assert!(Verbosity::Verbose < Verbosity::VeryVerbose);
        assert!(Verbosity::VeryVerbose < Verbosity::Debug);
    }

    #[test]
    fn test_default_verbosity_helpers() {
        let io = NullOutput;
        assert_eq!(io.verbosity(), Verbosity::Normal);
        assert!(!io.is_verbose());
        assert!(!io.is_debug());
    }
}
