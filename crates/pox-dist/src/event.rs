//! Download lifecycle events.
//!
//! Each event type has its own struct; all of them implement [`DownloadEvent`].
//! Listeners observe downloads, they cannot change their outcome: a failing
//! listener is logged and skipped.

use std::any::Any;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

/// Trait implemented by all download events.
pub trait DownloadEvent: Send + Sync + Any {
    fn event_type(&self) -> EventType;

    /// Name of the plugin hook this event maps to
    fn name(&self) -> &'static str {
        self.event_type().name()
    }

    /// Downcast to a concrete event type.
    fn as_any(&self) -> &dyn Any;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    PreFileDownload,
    PostFileDownload,
}

impl EventType {
    pub fn name(&self) -> &'static str {
        match self {
            EventType::PreFileDownload => "pre-file-download",
            EventType::PostFileDownload => "post-file-download",
        }
    }

    pub fn all() -> &'static [EventType] {
        &[EventType::PreFileDownload, EventType::PostFileDownload]
    }
}

/// Fired before a dist url is requested from the transport.
#[derive(Debug, Clone)]
pub struct PreFileDownloadEvent {
    pub package: String,
    pub url: String,
}

impl PreFileDownloadEvent {
    pub fn new(package: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            package: package.into(),
            url: url.into(),
        }
    }
}

impl DownloadEvent for PreFileDownloadEvent {
    fn event_type(&self) -> EventType {
        EventType::PreFileDownload
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Fired once an artifact has been verified, whether it came from the cache or
/// from a dist url.
#[derive(Debug, Clone)]
pub struct PostFileDownloadEvent {
    pub package: String,
    /// Url the bytes came from; `None` for cache hits
    pub url: Option<String>,
    /// File the artifact is being installed to; `None` for plain fetches
    pub file_name: Option<PathBuf>,
    pub from_cache: bool,
}

impl PostFileDownloadEvent {
    pub fn new(package: impl Into<String>, url: Option<String>, from_cache: bool) -> Self {
        Self {
            package: package.into(),
            url,
            file_name: None,
            from_cache,
        }
    }

    pub fn with_file_name(mut self, file_name: PathBuf) -> Self {
        self.file_name = Some(file_name);
        self
    }
}

impl DownloadEvent for PostFileDownloadEvent {
    fn event_type(&self) -> EventType {
        EventType::PostFileDownload
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Error type returned by listeners
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

pub trait EventListener: Send + Sync {
    fn handle(&self, event: &dyn DownloadEvent) -> Result<(), ListenerError>;

    /// Returns the priority of this listener (higher = earlier execution).
    fn priority(&self) -> i32 {
        0
    }
}

/// Event dispatcher that manages listeners and dispatches events.
#[derive(Default)]
pub struct EventDispatcher {
    listeners: HashMap<EventType, Vec<Arc<dyn EventListener>>>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a listener for a specific event type.
    pub fn add_listener(&mut self, event_type: EventType, listener: Arc<dyn EventListener>) {
        self.listeners.entry(event_type).or_default().push(listener);
    }

    /// Dispatch an event to every listener, highest priority first.
    ///
    /// Returns the number of listeners that handled it successfully.
    pub fn dispatch<E: DownloadEvent>(&self, event: &E) -> usize {
        let Some(listeners) = self.listeners.get(&event.event_type()) else {
            return 0;
        };

        let mut sorted_listeners: Vec<_> = listeners.iter().collect();
        sorted_listeners.sort_by(|a, b| b.priority().cmp(&a.priority()));

        let mut handled = 0;
        for listener in sorted_listeners {
            match listener.handle(event) {
                Ok(()) => handled += 1,
                Err(e) => log::warn!("{} listener failed: {}", event.name(), e),
            }
        }

        handled
    }
}
