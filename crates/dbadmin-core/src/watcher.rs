//! File watcher used for configuration hot reload

use crate::error::{AdminError, Result};
use notify::{RecommendedWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer, DebouncedEventKind, Debouncer};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{channel, Receiver};
use std::time::Duration;

const DEBOUNCE: Duration = Duration::from_millis(200);

/// Events emitted by the file watcher
#[derive(Debug, Clone)]
pub enum WatchEvent {
    Changed(PathBuf),
    Error(String),
}

/// Debounced watcher over a single directory
pub struct Watcher {
    rx: Option<Receiver<WatchEvent>>,
    debouncer: Option<Debouncer<RecommendedWatcher>>,
}

impl Default for Watcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Watcher {
    /// Create a new file watcher
    pub fn new() -> Self {
        Self {
            rx: None,
            debouncer: None,
        }
    }

    /// Start watching a directory (non-recursive).
    ///
    /// Editors often replace a file instead of writing it in place, so callers
    /// watch the parent directory and filter events with [`is_target_file`].
    pub fn watch(&mut self, dir: &Path) -> Result<()> {
        let (tx, rx) = channel();

        let mut debouncer = new_debouncer(
            DEBOUNCE,
            move |res: std::result::Result<
                Vec<notify_debouncer_mini::DebouncedEvent>,
                notify::Error,
            >| match res {
                Ok(events) => {
                    for event in events {
                        if event.kind == DebouncedEventKind::Any {
                            let _ = tx.send(WatchEvent::Changed(event.path));
                        }
                    }
                }
                Err(e) => {
                    let _ = tx.send(WatchEvent::Error(e.to_string()));
                }
            },
        )
        .map_err(|e| AdminError::Watch(e.to_string()))?;

        debouncer
            .watcher()
            .watch(dir, RecursiveMode::NonRecursive)
            .map_err(|e| AdminError::Watch(e.to_string()))?;

        self.rx = Some(rx);
        self.debouncer = Some(debouncer);
        Ok(())
    }

    /// Get the next event (blocking). Returns `None` once watching stopped.
    pub fn next_event(&self) -> Option<WatchEvent> {
        self.rx.as_ref().and_then(|rx| rx.recv().ok())
    }
}

/// Whether an event path refers to the watched file
pub fn is_target_file(event_path: &Path, target: &Path) -> bool {
    match (event_path.file_name(), target.file_name()) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
