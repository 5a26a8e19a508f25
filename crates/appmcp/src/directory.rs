//! Application and window directory.
//!
//! Enumerates what the OS reports as running and resolves caller-supplied
//! selectors into registry handles. Ties break on first match in OS-reported
//! order.

use std::sync::Arc;

use regex::Regex;
use tracing::debug;

use crate::errors::AutomationError;
use crate::platforms::{AccessibilityEngine, AppRef, WindowRef};
use crate::registry::HandleRegistry;

/// Exactly one way of naming an application.
#[derive(Debug, Clone, PartialEq)]
pub enum AppSelector {
    BundleId(String),
    ProcessName(String),
    Pid(i32),
}

impl std::fmt::Display for AppSelector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AppSelector::BundleId(b) => write!(f, "bundle_id={b}"),
            AppSelector::ProcessName(n) => write!(f, "process_name={n}"),
            AppSelector::Pid(p) => write!(f, "pid={p}"),
        }
    }
}

/// How to pick one window of an application. With both a pattern and an
/// index supplied upstream, the pattern wins before this type is built.
#[derive(Debug, Clone, PartialEq)]
pub enum WindowSelector {
    /// Regular expression matched against the window title.
    TitlePattern(String),
    /// Zero-based index into the application's window list.
    Index(usize),
    /// First main window, else first window.
    Default,
}

/// A running application paired with its registry handle.
#[derive(Clone)]
pub struct RunningApp {
    pub handle: String,
    pub app: AppRef,
}

pub struct Directory {
    engine: Arc<dyn AccessibilityEngine>,
    registry: Arc<HandleRegistry>,
}

impl Directory {
    pub fn new(engine: Arc<dyn AccessibilityEngine>, registry: Arc<HandleRegistry>) -> Self {
        Self { engine, registry }
    }

    /// Every running application with UI capability, handles allocated.
    pub fn running_applications(&self) -> Result<Vec<RunningApp>, AutomationError> {
        let apps = self.engine.running_applications()?;
        Ok(apps
            .into_iter()
            .map(|app| {
                let handle = self.registry.allocate_app(app.clone());
                RunningApp { handle, app }
            })
            .collect())
    }

    /// Running applications for which the accessibility-trust probe answers.
    pub fn accessible_applications(&self) -> Result<Vec<RunningApp>, AutomationError> {
        if !self.engine.accessibility_trusted() {
            return Ok(Vec::new());
        }
        Ok(self
            .running_applications()?
            .into_iter()
            .filter(|entry| entry.app.element.is_alive())
            .collect())
    }

    /// Resolve a selector to an application handle.
    pub fn resolve_app(&self, selector: &AppSelector) -> Result<String, AutomationError> {
        let apps = self.engine.running_applications()?;
        let found = apps.into_iter().find(|app| match selector {
            AppSelector::BundleId(bundle) => app.bundle_id.as_deref() == Some(bundle.as_str()),
            AppSelector::ProcessName(name) => app.name.eq_ignore_ascii_case(name),
            AppSelector::Pid(pid) => app.pid == *pid,
        });
        match found {
            Some(app) => {
                let handle = self.registry.allocate_app(app);
                debug!(%selector, %handle, "resolved application");
                Ok(handle)
            }
            None => Err(AutomationError::AppNotFound(format!(
                "no running application matches {selector}"
            ))),
        }
    }

    /// Windows of one application, handles allocated, bounds fresh.
    pub fn windows_for_app(
        &self,
        app_handle: &str,
    ) -> Result<Vec<(String, WindowRef)>, AutomationError> {
        let entry = self.registry.lookup_app(app_handle)?;
        let windows = self.engine.windows_for_app(&entry.app)?;
        windows
            .into_iter()
            .map(|w| {
                let handle = self.registry.allocate_window(app_handle, w.clone())?;
                Ok((handle, w))
            })
            .collect()
    }

    /// Resolve a window selector against an application handle.
    pub fn resolve_window(
        &self,
        app_handle: &str,
        selector: &WindowSelector,
    ) -> Result<String, AutomationError> {
        let entry = self.registry.lookup_app(app_handle)?;
        let windows = self.engine.windows_for_app(&entry.app)?;
        let chosen = match selector {
            WindowSelector::TitlePattern(pattern) => {
                let re = Regex::new(pattern).map_err(|e| {
                    AutomationError::InvalidParams(format!("bad title pattern: {e}"))
                })?;
                windows
                    .into_iter()
                    .find(|w| w.title.as_deref().map(|t| re.is_match(t)).unwrap_or(false))
                    .ok_or_else(|| {
                        AutomationError::WindowNotFound(format!(
                            "no window title matches /{pattern}/"
                        ))
                    })?
            }
            WindowSelector::Index(index) => {
                let count = windows.len();
                windows.into_iter().nth(*index).ok_or_else(|| {
                    AutomationError::WindowNotFound(format!(
                        "index {index} out of range ({count} windows)"
                    ))
                })?
            }
            WindowSelector::Default => {
                let main_idx = windows.iter().position(|w| w.is_main).unwrap_or(0);
                windows.into_iter().nth(main_idx).ok_or_else(|| {
                    AutomationError::WindowNotFound("application has no windows".into())
                })?
            }
        };
        self.registry.allocate_window(app_handle, chosen)
    }
}
