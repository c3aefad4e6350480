//! A compositor stand-in that records what the daemon asked it to do.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use kestrel_config::AppConfig;
use kestrel_core::Compositor;

/// One call observed by a [`RecordingCompositor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CompositorEvent {
    ReloadStarted,
    Reloaded { log_level: String },
    Quit,
}

/// Records every call, optionally blocking the event loop to simulate
/// slow compositor work.
///
/// Clones share the same event log, so a test keeps one clone and hands the
/// other to the daemon.
#[derive(Debug, Clone, Default)]
pub struct RecordingCompositor {
    events: Arc<Mutex<Vec<CompositorEvent>>>,
    reload_delay: Duration,
    quit_delay: Duration,
}

impl RecordingCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block for `delay` inside every reload.
    pub fn with_reload_delay(mut self, delay: Duration) -> Self {
        self.reload_delay = delay;
        self
    }

    /// Block for `delay` inside quit.
    pub fn with_quit_delay(mut self, delay: Duration) -> Self {
        self.quit_delay = delay;
        self
    }

    pub fn events(&self) -> Vec<CompositorEvent> {
        self.events.lock().expect("event log poisoned").clone()
    }

    pub fn reload_count(&self) -> usize {
        self.count(|e| matches!(e, CompositorEvent::Reloaded { .. }))
    }

    pub fn quit_count(&self) -> usize {
        self.count(|e| matches!(e, CompositorEvent::Quit))
    }

    fn count(&self, pred: impl Fn(&CompositorEvent) -> bool) -> usize {
        self.events
            .lock()
            .expect("event log poisoned")
            .iter()
            .filter(|e| pred(e))
            .count()
    }

    fn record(&self, event: CompositorEvent) {
        self.events.lock().expect("event log poisoned").push(event);
    }
}

impl Compositor for RecordingCompositor {
    fn reload_config(&mut self, config: &AppConfig) {
        self.record(CompositorEvent::ReloadStarted);
        std::thread::sleep(self.reload_delay);
        self.record(CompositorEvent::Reloaded {
            log_level: config.logging.level.clone(),
        });
    }

    fn quit(&mut self) {
        std::thread::sleep(self.quit_delay);
        self.record(CompositorEvent::Quit);
    }
}
