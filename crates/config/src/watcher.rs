//! File system watcher for configuration files

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::error::{ConfigError, ConfigResult};

/// What happened to a watched file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// File was created (or replaced by an atomic rename)
    Created,
    /// File contents or metadata changed
    Modified,
    /// File was removed
    Removed,
}

/// A change to one watched configuration file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigChange {
    /// The watched path, as passed to [`ConfigWatcher::start_watching`]
    pub path: PathBuf,
    /// Kind of change
    pub kind: ChangeKind,
}

type Callback = Arc<dyn Fn(ConfigChange) + Send + Sync>;

/// Watches configuration files and reports changes through a callback.
///
/// The parent directory of each file is watched so editors that save by
/// rename are still seen. Repeated events for the same file inside the
/// debounce window are dropped.
pub struct ConfigWatcher {
    watcher: Mutex<Option<RecommendedWatcher>>,
    callback: Callback,
    watching: Arc<AtomicBool>,
    debounce: Duration,
}

impl std::fmt::Debug for ConfigWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigWatcher")
            .field("watching", &self.is_watching())
            .field("debounce", &self.debounce)
            .finish_non_exhaustive()
    }
}

impl ConfigWatcher {
    /// Create a watcher that calls `callback` for every change.
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(ConfigChange) + Send + Sync + 'static,
    {
        Self {
            watcher: Mutex::new(None),
            callback: Arc::new(callback),
            watching: Arc::new(AtomicBool::new(false)),
            debounce: Duration::from_millis(100),
        }
    }

    /// Set debounce duration
    #[must_use = "builder methods must be chained or built"]
    pub fn with_debounce(mut self, duration: Duration) -> Self {
        self.debounce = duration;
        self
    }

    /// Start watching `paths`. An empty list is accepted and watches nothing.
    pub fn start_watching(&self, paths: &[PathBuf]) -> ConfigResult<()> {
        if self.watching.load(Ordering::Acquire) {
            return Err(ConfigError::watch_error("Already watching"));
        }
        if paths.is_empty() {
            tracing::debug!("no configuration files to watch");
            return Ok(());
        }

        // Event paths are absolute; map them back to the caller's paths.
        let targets: HashMap<PathBuf, PathBuf> = paths
            .iter()
            .map(|p| (absolute(p), p.clone()))
            .collect();
        let callback = Arc::clone(&self.callback);
        let debounce = self.debounce;
        let last_seen: Mutex<HashMap<PathBuf, Instant>> = Mutex::new(HashMap::new());

        let mut fs_watcher = notify::recommended_watcher(move |res: Result<Event, notify::Error>| {
            let event = match res {
                Ok(event) => event,
                Err(e) => {
                    tracing::error!(error = %e, "configuration watch error");
                    return;
                }
            };
            let Some(kind) = change_kind(&event.kind) else {
                return;
            };
            for path in &event.paths {
                let Some(original) = targets.get(&absolute(path)) else {
                    continue;
                };
                let now = Instant::now();
                {
                    let mut seen = last_seen.lock();
                    if seen
                        .get(original)
                        .is_some_and(|last| now.duration_since(*last) < debounce)
                    {
                        continue;
                    }
                    seen.insert(original.clone(), now);
                }
                (callback)(ConfigChange {
                    path: original.clone(),
                    kind,
                });
            }
        })
        .map_err(|e| ConfigError::watch_error(e.to_string()))?;

        for path in paths {
            let abs = absolute(path);
            let dir = abs.parent().unwrap_or(&abs);
            fs_watcher
                .watch(dir, RecursiveMode::NonRecursive)
                .map_err(|e| {
                    ConfigError::watch_error(format!("Failed to watch {}: {e}", dir.display()))
                })?;
            tracing::debug!(path = %path.display(), "watching configuration file");
        }

        *self.watcher.lock() = Some(fs_watcher);
        self.watching.store(true, Ordering::Release);
        tracing::info!(files = paths.len(), "started watching configuration");
        Ok(())
    }

    /// Stop watching. Does nothing when not watching.
    pub fn stop_watching(&self) {
        if !self.watching.swap(false, Ordering::AcqRel) {
            return;
        }
        self.watcher.lock().take();
        tracing::info!("stopped watching configuration");
    }

    /// Whether a watch is active.
    pub fn is_watching(&self) -> bool {
        self.watching.load(Ordering::Acquire)
    }
}

impl Drop for ConfigWatcher {
    fn drop(&mut self) {
        self.stop_watching();
    }
}

fn change_kind(kind: &EventKind) -> Option<ChangeKind> {
    match kind {
        EventKind::Create(_) => Some(ChangeKind::Created),
        EventKind::Modify(_) => Some(ChangeKind::Modified),
        EventKind::Remove(_) => Some(ChangeKind::Removed),
        _ => None,
    }
}

fn absolute(path: &Path) -> PathBuf {
    if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }
    // Removed files cannot be canonicalized; resolve through the parent.
    match (path.parent(), path.file_name()) {
        (Some(parent), Some(name)) => {
            let parent = if parent.as_os_str().is_empty() {
                Path::new(".")
            } else {
                parent
            };
            parent
                .canonicalize()
                .map_or_else(|_| path.to_path_buf(), |p| p.join(name))
        }
        _ => path.to_path_buf(),
    }
}
