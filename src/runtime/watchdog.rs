//! Stall detection for running flowgraphs
//!
//! Every block thread reports progress to the watchdog; a background
//! thread periodically scans for blocks that have not moved any items for
//! longer than the configured threshold and logs a warning, once per
//! stall. A stalled block is not killed: a stall is usually backpressure
//! from a slow consumer or a starved source, and the log line is the
//! diagnostic.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use tracing::warn;

const SCAN_INTERVAL: Duration = Duration::from_millis(500);

struct WatchEntry {
    last_progress: Instant,
    warned: bool,
}

struct Inner {
    entries: Mutex<HashMap<String, WatchEntry>>,
    stop: AtomicBool,
}

/// Per-block reporting endpoint.
pub struct WatchdogHandle {
    inner: Arc<Inner>,
    name: String,
}

impl WatchdogHandle {
    /// Record that the block moved items this turn.
    pub fn progress(&self) {
        if let Ok(mut entries) = self.inner.entries.lock() {
            if let Some(entry) = entries.get_mut(&self.name) {
                entry.last_progress = Instant::now();
                entry.warned = false;
            }
        }
    }
}

impl Drop for WatchdogHandle {
    fn drop(&mut self) {
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.remove(&self.name);
        }
    }
}

/// Background stall scanner for one running flowgraph.
pub struct Watchdog {
    inner: Arc<Inner>,
    thread: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub fn start(threshold: Duration) -> Self {
        let inner = Arc::new(Inner {
            entries: Mutex::new(HashMap::new()),
            stop: AtomicBool::new(false),
        });
        let scanner = Arc::clone(&inner);
        let thread = thread::Builder::new()
            .name("watchdog".to_string())
            .spawn(move || {
                while !scanner.stop.load(Ordering::Relaxed) {
                    thread::sleep(SCAN_INTERVAL);
                    let Ok(mut entries) = scanner.entries.lock() else {
                        return;
                    };
                    for (name, entry) in entries.iter_mut() {
                        if !entry.warned && entry.last_progress.elapsed() > threshold {
                            warn!(
                                block = %name,
                                stalled_for = ?entry.last_progress.elapsed(),
                                "block has made no progress"
                            );
                            entry.warned = true;
                        }
                    }
                }
            })
            .ok();
        Self { inner, thread }
    }

    pub fn register(&self, name: impl Into<String>) -> WatchdogHandle {
        let name = name.into();
        if let Ok(mut entries) = self.inner.entries.lock() {
            entries.insert(
                name.clone(),
                WatchEntry {
                    last_progress: Instant::now(),
                    warned: false,
                },
            );
        }
        WatchdogHandle {
            inner: Arc::clone(&self.inner),
            name,
        }
    }

    pub fn stop(&mut self) {
        self.inner.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
