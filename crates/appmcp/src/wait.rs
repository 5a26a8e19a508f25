//! Time- and UI-change-based wait conditions.
//!
//! Polling conditions sample every 100 ms up to the caller's deadline. A
//! timed-out poll is a normal completion (`satisfied == false`); only the
//! plain `time` wait treats expiry as its success. All waits honor
//! cancellation and report how much time had elapsed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::errors::AutomationError;
use crate::platforms::AccessibilityEngine;
use crate::registry::HandleRegistry;
use crate::screenshot::FINGERPRINT_MAX_DIMENSION;

/// Poll cadence for UI-observing conditions.
const POLL_INTERVAL: Duration = Duration::from_millis(100);
/// Upper bound on any single wait.
pub const MAX_WAIT_MS: u64 = 30_000;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "condition")]
pub enum WaitCondition {
    /// Sleep for exactly the requested duration.
    Time,
    /// Return when the target window's coarse fingerprint changes.
    UiChange { window_handle: String },
    /// Return when the app grows a window whose title matches the pattern
    /// (any window when no pattern is given).
    WindowAppear {
        app_handle: String,
        #[serde(default)]
        title_pattern: Option<String>,
    },
    /// Inverse of `WindowAppear`.
    WindowDisappear {
        app_handle: String,
        #[serde(default)]
        title_pattern: Option<String>,
    },
    /// Reserved; no richer completion signal exists, so it sleeps.
    GestureComplete,
}

#[derive(Debug, Clone, Serialize)]
pub struct WaitOutcome {
    pub satisfied: bool,
    pub elapsed_ms: u64,
}

pub struct WaitRunner {
    engine: Arc<dyn AccessibilityEngine>,
    registry: Arc<HandleRegistry>,
}

impl WaitRunner {
    pub fn new(engine: Arc<dyn AccessibilityEngine>, registry: Arc<HandleRegistry>) -> Self {
        Self { engine, registry }
    }

    pub async fn wait(
        &self,
        condition: &WaitCondition,
        duration_ms: u64,
        cancel: &CancellationToken,
    ) -> Result<WaitOutcome, AutomationError> {
        if duration_ms == 0 || duration_ms > MAX_WAIT_MS {
            return Err(AutomationError::InvalidParams(format!(
                "duration_ms must be between 1 and {MAX_WAIT_MS}, got {duration_ms}"
            )));
        }
        let deadline = Duration::from_millis(duration_ms);
        let started = Instant::now();

        match condition {
            WaitCondition::Time | WaitCondition::GestureComplete => {
                self.sleep_until(deadline, started, cancel).await?;
                Ok(WaitOutcome {
                    satisfied: true,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                })
            }
            WaitCondition::UiChange { window_handle } => {
                let initial = self.window_fingerprint(window_handle)?;
                self.poll(deadline, started, cancel, || {
                    Ok(self.window_fingerprint(window_handle)? != initial)
                })
                .await
            }
            WaitCondition::WindowAppear {
                app_handle,
                title_pattern,
            } => {
                let matcher = compile_pattern(title_pattern.as_deref())?;
                self.poll(deadline, started, cancel, || {
                    self.has_matching_window(app_handle, matcher.as_ref())
                })
                .await
            }
            WaitCondition::WindowDisappear {
                app_handle,
                title_pattern,
            } => {
                let matcher = compile_pattern(title_pattern.as_deref())?;
                self.poll(deadline, started, cancel, || {
                    Ok(!self.has_matching_window(app_handle, matcher.as_ref())?)
                })
                .await
            }
        }
    }

    async fn sleep_until(
        &self,
        deadline: Duration,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), AutomationError> {
        tokio::select! {
            _ = tokio::time::sleep(deadline) => Ok(()),
            _ = cancel.cancelled() => Err(AutomationError::Cancelled {
                elapsed_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    async fn poll<F>(
        &self,
        deadline: Duration,
        started: Instant,
        cancel: &CancellationToken,
        mut check: F,
    ) -> Result<WaitOutcome, AutomationError>
    where
        F: FnMut() -> Result<bool, AutomationError>,
    {
        loop {
            if check()? {
                return Ok(WaitOutcome {
                    satisfied: true,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            if started.elapsed() >= deadline {
                debug!("wait condition expired unsatisfied");
                return Ok(WaitOutcome {
                    satisfied: false,
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            tokio::select! {
                _ = tokio::time::sleep(POLL_INTERVAL) => {}
                _ = cancel.cancelled() => {
                    return Err(AutomationError::Cancelled {
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    });
                }
            }
        }
    }

    /// Coarse change fingerprint: window bounds plus a small hash of its
    /// downscaled raster.
    fn window_fingerprint(&self, window_handle: &str) -> Result<[u8; 32], AutomationError> {
        let entry = self.registry.lookup_window(window_handle)?;
        let bounds = entry.window.element.bounds().unwrap_or(entry.window.bounds);
        let mut hasher = blake3::Hasher::new();
        for v in [bounds.x, bounds.y, bounds.width, bounds.height] {
            hasher.update(&v.to_le_bytes());
        }
        if self.engine.screen_capture_allowed() {
            if let Ok(shot) = self.engine.capture_window(&entry.window) {
                let small = shot.downscaled(FINGERPRINT_MAX_DIMENSION)?;
                hasher.update(&small.image_data);
            }
        }
        Ok(*hasher.finalize().as_bytes())
    }

    fn has_matching_window(
        &self,
        app_handle: &str,
        matcher: Option<&Regex>,
    ) -> Result<bool, AutomationError> {
        let entry = self.registry.lookup_app(app_handle)?;
        let windows = self.engine.windows_for_app(&entry.app)?;
        Ok(windows.iter().any(|w| match matcher {
            Some(re) => w.title.as_deref().map(|t| re.is_match(t)).unwrap_or(false),
            None => true,
        }))
    }
}

fn compile_pattern(pattern: Option<&str>) -> Result<Option<Regex>, AutomationError> {
    pattern
        .map(|p| {
            Regex::new(p)
                .map_err(|e| AutomationError::InvalidParams(format!("bad title pattern: {e}")))
        })
        .transpose()
}
