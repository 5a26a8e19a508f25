//! Handle registry: the sole process-wide mutable state.
//!
//! Opaque handle strings (`ah_*`, `wh_*`, element ids) map to live OS
//! references with TTL-based expiry. Every lookup and mutation goes through
//! one exclusive lock; the periodic sweep copies entries out, probes
//! liveness without the lock, then removes the dead.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::errors::AutomationError;
use crate::platforms::{AppRef, UIElement, WindowRef};

/// Default TTL for application and window handles.
pub const DEFAULT_HANDLE_TTL: Duration = Duration::from_secs(3600);
/// Interval of the periodic sweep.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Clone, Debug)]
pub struct AppEntry {
    pub handle: String,
    pub app: AppRef,
    born: Instant,
    ttl: Duration,
}

impl AppEntry {
    pub fn is_expired(&self) -> bool {
        self.born.elapsed() > self.ttl
    }
}

#[derive(Clone, Debug)]
pub struct WindowEntry {
    pub handle: String,
    pub app_handle: String,
    pub pid: i32,
    pub window: WindowRef,
    born: Instant,
    ttl: Duration,
}

impl WindowEntry {
    pub fn is_expired(&self) -> bool {
        self.born.elapsed() > self.ttl
    }
}

/// An element registered by a snapshot, scoped to its window handle.
#[derive(Clone, Debug)]
pub struct ElementEntry {
    pub id: String,
    pub window_handle: String,
    pub element: UIElement,
    /// Child-index path from the window root, the id's stability anchor.
    pub path: Vec<usize>,
    pub ax_role: String,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepStats {
    pub apps_removed: usize,
    pub windows_removed: usize,
    pub elements_removed: usize,
}

#[derive(Default)]
struct Inner {
    counter: u64,
    apps: HashMap<String, AppEntry>,
    windows: HashMap<String, WindowEntry>,
    elements: HashMap<String, ElementEntry>,
    /// window handle → element ids registered under it.
    window_elements: HashMap<String, HashSet<String>>,
}

impl Inner {
    fn next_handle(&mut self, prefix: &str) -> String {
        self.counter += 1;
        format!("{prefix}_{:X}", self.counter)
    }

    fn drop_window(&mut self, handle: &str) -> usize {
        self.windows.remove(handle);
        let ids = self.window_elements.remove(handle).unwrap_or_default();
        let n = ids.len();
        for id in ids {
            self.elements.remove(&id);
        }
        n
    }
}

/// Process-wide mapping from opaque handle to live OS reference.
pub struct HandleRegistry {
    inner: Mutex<Inner>,
    ttl: Duration,
}

impl Default for HandleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleRegistry {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_HANDLE_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            ttl,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        // A poisoned registry lock means a panic mid-mutation; the maps are
        // still structurally sound, so keep serving.
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Allocate (or reuse) a handle for an application. A non-expired handle
    /// targeting the same pid is returned unchanged so redundant resolves
    /// stay stable.
    pub fn allocate_app(&self, app: AppRef) -> String {
        let mut inner = self.lock();
        if let Some(existing) = inner
            .apps
            .values()
            .find(|e| e.app.pid == app.pid && !e.is_expired())
        {
            return existing.handle.clone();
        }
        let handle = inner.next_handle("ah");
        debug!(handle = %handle, pid = app.pid, "allocated app handle");
        inner.apps.insert(
            handle.clone(),
            AppEntry {
                handle: handle.clone(),
                app,
                born: Instant::now(),
                ttl: self.ttl,
            },
        );
        handle
    }

    /// Allocate (or reuse) a handle for a window owned by `app_handle`.
    pub fn allocate_window(
        &self,
        app_handle: &str,
        window: WindowRef,
    ) -> Result<String, AutomationError> {
        let mut inner = self.lock();
        let status = inner
            .apps
            .get(app_handle)
            .map(|e| (e.app.pid, e.is_expired()));
        let pid = match status {
            Some((pid, false)) => pid,
            Some((_, true)) => {
                inner.apps.remove(app_handle);
                return Err(AutomationError::AppNotFound(format!(
                    "handle {app_handle} expired"
                )));
            }
            None => {
                return Err(AutomationError::AppNotFound(format!(
                    "unknown app handle {app_handle}"
                )))
            }
        };
        if let Some(existing) = inner
            .windows
            .values()
            .find(|e| e.pid == pid && e.window.os_key == window.os_key && !e.is_expired())
        {
            return Ok(existing.handle.clone());
        }
        let handle = inner.next_handle("wh");
        debug!(handle = %handle, app = %app_handle, "allocated window handle");
        inner.windows.insert(
            handle.clone(),
            WindowEntry {
                handle: handle.clone(),
                app_handle: app_handle.to_string(),
                pid,
                window,
                born: Instant::now(),
                ttl: self.ttl,
            },
        );
        Ok(handle)
    }

    /// Look up an application handle, enforcing TTL and liveness.
    pub fn lookup_app(&self, handle: &str) -> Result<AppEntry, AutomationError> {
        let mut inner = self.lock();
        let entry = inner
            .apps
            .get(handle)
            .cloned()
            .ok_or_else(|| AutomationError::AppNotFound(format!("unknown app handle {handle}")))?;
        if entry.is_expired() {
            inner.apps.remove(handle);
            return Err(AutomationError::AppNotFound(format!(
                "handle {handle} expired"
            )));
        }
        if !entry.app.element.is_alive() {
            inner.apps.remove(handle);
            return Err(AutomationError::AppNotFound(format!(
                "application behind {handle} is gone"
            )));
        }
        Ok(entry)
    }

    /// Look up a window handle, enforcing TTL and liveness.
    pub fn lookup_window(&self, handle: &str) -> Result<WindowEntry, AutomationError> {
        let mut inner = self.lock();
        let entry = inner.windows.get(handle).cloned().ok_or_else(|| {
            AutomationError::WindowNotFound(format!("unknown window handle {handle}"))
        })?;
        if entry.is_expired() {
            inner.drop_window(handle);
            return Err(AutomationError::WindowNotFound(format!(
                "handle {handle} expired"
            )));
        }
        if !entry.window.element.is_alive() {
            inner.drop_window(handle);
            return Err(AutomationError::WindowNotFound(format!(
                "window behind {handle} is gone"
            )));
        }
        Ok(entry)
    }

    /// Register an element id produced by a snapshot. Re-registering an id
    /// replaces its live reference with the fresh one.
    pub fn register_element(
        &self,
        window_handle: &str,
        id: &str,
        element: UIElement,
        path: Vec<usize>,
        ax_role: &str,
    ) -> Result<(), AutomationError> {
        let mut inner = self.lock();
        if !inner.windows.contains_key(window_handle) {
            return Err(AutomationError::WindowNotFound(format!(
                "unknown window handle {window_handle}"
            )));
        }
        inner.elements.insert(
            id.to_string(),
            ElementEntry {
                id: id.to_string(),
                window_handle: window_handle.to_string(),
                element,
                path,
                ax_role: ax_role.to_string(),
            },
        );
        inner
            .window_elements
            .entry(window_handle.to_string())
            .or_default()
            .insert(id.to_string());
        Ok(())
    }

    /// Look up an element id. Fails when the id is unknown, its window
    /// handle is gone, or the underlying object no longer answers.
    pub fn lookup_element(&self, id: &str) -> Result<ElementEntry, AutomationError> {
        let mut inner = self.lock();
        let entry = inner.elements.get(id).cloned().ok_or_else(|| {
            AutomationError::ElementNotAccessible(format!("unknown element id {id}"))
        })?;
        let window_live = inner
            .windows
            .get(&entry.window_handle)
            .map(|w| !w.is_expired())
            .unwrap_or(false);
        if !window_live {
            let handle = entry.window_handle.clone();
            inner.drop_window(&handle);
            return Err(AutomationError::ElementNotAccessible(format!(
                "owning window of element {id} is gone"
            )));
        }
        if !entry.element.is_alive() {
            inner.elements.remove(id);
            if let Some(set) = inner.window_elements.get_mut(&entry.window_handle) {
                set.remove(id);
            }
            return Err(AutomationError::ElementNotAccessible(format!(
                "element {id} no longer exists"
            )));
        }
        Ok(entry)
    }

    /// Drop a window handle and every element registered under it.
    pub fn remove_window(&self, handle: &str) {
        self.lock().drop_window(handle);
    }

    /// Remove entries past TTL or whose OS object no longer answers.
    ///
    /// The exclusive lock is held only to copy entries out and to apply the
    /// removals; liveness probes happen unlocked.
    pub fn sweep_expired(&self) -> SweepStats {
        let (app_probes, window_probes) = {
            let inner = self.lock();
            let apps: Vec<(String, bool, UIElement)> = inner
                .apps
                .values()
                .map(|e| (e.handle.clone(), e.is_expired(), e.app.element.clone()))
                .collect();
            let windows: Vec<(String, bool, UIElement)> = inner
                .windows
                .values()
                .map(|e| (e.handle.clone(), e.is_expired(), e.window.element.clone()))
                .collect();
            (apps, windows)
        };

        let dead_apps: Vec<String> = app_probes
            .into_iter()
            .filter(|(_, expired, element)| *expired || !element.is_alive())
            .map(|(handle, _, _)| handle)
            .collect();
        let dead_windows: Vec<String> = window_probes
            .into_iter()
            .filter(|(_, expired, element)| *expired || !element.is_alive())
            .map(|(handle, _, _)| handle)
            .collect();

        let mut stats = SweepStats::default();
        let mut inner = self.lock();
        for handle in &dead_apps {
            if inner.apps.remove(handle).is_some() {
                stats.apps_removed += 1;
            }
        }
        // Windows of removed apps go too, then the independently dead ones.
        let orphaned: Vec<String> = inner
            .windows
            .values()
            .filter(|w| !inner.apps.contains_key(&w.app_handle))
            .map(|w| w.handle.clone())
            .collect();
        for handle in orphaned.iter().chain(dead_windows.iter()) {
            if inner.windows.contains_key(handle) {
                stats.elements_removed += inner.drop_window(handle);
                stats.windows_removed += 1;
            }
        }
        if stats != SweepStats::default() {
            warn!(?stats, "registry sweep removed stale handles");
        }
        stats
    }

    /// Number of live (unswept) entries per kind, for diagnostics.
    pub fn census(&self) -> (usize, usize, usize) {
        let inner = self.lock();
        (inner.apps.len(), inner.windows.len(), inner.elements.len())
    }
}
