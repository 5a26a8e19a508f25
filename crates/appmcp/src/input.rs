//! Input synthesis: element- or coordinate-addressed actions reduced to
//! ordered low-level events.
//!
//! The synthesizer never posts two event sequences concurrently; a single
//! lock is held across multi-step sequences (a drag, a multi-click burst) so
//! nothing can splice between a down and its up.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::errors::AutomationError;
use crate::geometry::{self, CoordinateSpace, Point, Rect};
use crate::platforms::{AccessibilityEngine, KeyInput, MouseButton, MouseEventKind};
use crate::registry::{ElementEntry, HandleRegistry};

/// Delay between pointer down and up within one click.
const CLICK_HOLD: Duration = Duration::from_millis(50);
/// Delay between the clicks of a multi-click burst.
const CLICK_GAP: Duration = Duration::from_millis(100);
/// Delay between synthesized characters while typing.
const TYPE_GAP: Duration = Duration::from_millis(10);
/// Largest accepted multi-click count.
pub const MAX_CLICK_COUNT: u32 = 10;
/// Longest accepted drag duration in seconds.
pub const MAX_DRAG_SECONDS: f64 = 60.0;

/// Virtual key codes for characters that must not go out as Unicode events.
const VK_RETURN: u16 = 36;
const VK_TAB: u16 = 48;

/// How `input_text` delivers its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextInputMethod {
    /// Per-character key events.
    #[default]
    Type,
    /// Direct write to the element's value attribute.
    SetValue,
}

/// Gestures of the extended surface.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Gesture {
    Swipe {
        direction: SwipeDirection,
        #[serde(default)]
        distance: Option<f64>,
    },
    Pinch {
        /// > 1 zooms in, < 1 zooms out.
        scale: f64,
    },
    Rotate {
        degrees: f64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirection {
    Up,
    Down,
    Left,
    Right,
}

/// What a click actually did.
#[derive(Debug, Clone, Serialize)]
pub struct ClickOutcome {
    /// "accessibility_action" or "synthesized_events".
    pub method: &'static str,
    pub at: Point,
    pub count: u32,
}

pub struct InputSynthesizer {
    engine: Arc<dyn AccessibilityEngine>,
    registry: Arc<HandleRegistry>,
    /// Soft lock around multi-step sequences; see module docs.
    sequence: tokio::sync::Mutex<()>,
}

impl InputSynthesizer {
    pub fn new(engine: Arc<dyn AccessibilityEngine>, registry: Arc<HandleRegistry>) -> Self {
        Self {
            engine,
            registry,
            sequence: tokio::sync::Mutex::new(()),
        }
    }

    fn require_accessibility(&self) -> Result<(), AutomationError> {
        if !self.engine.accessibility_trusted() {
            return Err(AutomationError::PermissionDenied(
                "accessibility permission is required to post input".into(),
            ));
        }
        Ok(())
    }

    /// Resolve an element id to its live entry and current center point,
    /// rejecting disabled or geometry-less elements before any event posts.
    fn resolve_target(&self, element_id: &str) -> Result<(ElementEntry, Point), AutomationError> {
        let entry = self.registry.lookup_element(element_id)?;
        let bounds = entry.element.bounds().map_err(|_| {
            AutomationError::ElementNotAccessible(format!(
                "element {element_id} has no readable geometry"
            ))
        })?;
        if !bounds.has_area() {
            return Err(AutomationError::ElementNotAccessible(format!(
                "element {element_id} has no valid geometry"
            )));
        }
        if !entry.element.is_enabled().unwrap_or(true) {
            return Err(AutomationError::ElementNotAccessible(format!(
                "element {element_id} is disabled"
            )));
        }
        Ok((entry, bounds.center()))
    }

    /// Click an element at its center.
    pub async fn click_element(
        &self,
        element_id: &str,
        button: MouseButton,
        count: u32,
    ) -> Result<ClickOutcome, AutomationError> {
        if count < 1 || count > MAX_CLICK_COUNT {
            return Err(AutomationError::InvalidParams(format!(
                "count must be between 1 and {MAX_CLICK_COUNT}, got {count}"
            )));
        }
        self.require_accessibility()?;
        let (entry, center) = self.resolve_target(element_id)?;

        // The role-bound accessibility action yields correct behavior for
        // default single left clicks; everything else is synthesized.
        if button == MouseButton::Left && count == 1 {
            match entry.element.press() {
                Ok(true) => {
                    debug!(element = %element_id, "clicked via accessibility action");
                    return Ok(ClickOutcome {
                        method: "accessibility_action",
                        at: center,
                        count,
                    });
                }
                Ok(false) => trace!(element = %element_id, "no accessibility action, synthesizing"),
                Err(e) => trace!(element = %element_id, error = %e, "accessibility action failed, synthesizing"),
            }
        }

        let _seq = self.sequence.lock().await;
        for i in 1..=count {
            self.engine
                .post_mouse(MouseEventKind::Down, button, center, i as i64)?;
            tokio::time::sleep(CLICK_HOLD).await;
            self.engine
                .post_mouse(MouseEventKind::Up, button, center, i as i64)?;
            if i < count {
                tokio::time::sleep(CLICK_GAP).await;
            }
        }
        Ok(ClickOutcome {
            method: "synthesized_events",
            at: center,
            count,
        })
    }

    /// Click at a caller-supplied point, converted from its reference frame
    /// into global coordinates. There is no element here, so every click is
    /// synthesized.
    pub async fn click_at(
        &self,
        point: Point,
        space: CoordinateSpace,
        window_bounds: Option<Rect>,
        button: MouseButton,
        count: u32,
    ) -> Result<ClickOutcome, AutomationError> {
        if count < 1 || count > MAX_CLICK_COUNT {
            return Err(AutomationError::InvalidParams(format!(
                "count must be between 1 and {MAX_CLICK_COUNT}, got {count}"
            )));
        }
        self.require_accessibility()?;
        let displays = self.engine.displays()?;
        let at = geometry::to_global(point, space, window_bounds, &displays)?;

        let _seq = self.sequence.lock().await;
        for i in 1..=count {
            self.engine
                .post_mouse(MouseEventKind::Down, button, at, i as i64)?;
            tokio::time::sleep(CLICK_HOLD).await;
            self.engine
                .post_mouse(MouseEventKind::Up, button, at, i as i64)?;
            if i < count {
                tokio::time::sleep(CLICK_GAP).await;
            }
        }
        Ok(ClickOutcome {
            method: "synthesized_events",
            at,
            count,
        })
    }

    /// Deliver text to an element, by key events or by value write.
    pub async fn input_text(
        &self,
        element_id: &str,
        text: &str,
        method: TextInputMethod,
    ) -> Result<(), AutomationError> {
        self.require_accessibility()?;
        let (entry, _center) = self.resolve_target(element_id)?;
        match method {
            TextInputMethod::SetValue => entry.element.set_value(text),
            TextInputMethod::Type => {
                let _seq = self.sequence.lock().await;
                for ch in text.chars() {
                    let key = match ch {
                        '\n' | '\r' => KeyInput::Virtual(VK_RETURN),
                        '\t' => KeyInput::Virtual(VK_TAB),
                        other => KeyInput::Unicode(other),
                    };
                    self.engine.post_key(key, true)?;
                    self.engine.post_key(key, false)?;
                    tokio::time::sleep(TYPE_GAP).await;
                }
                Ok(())
            }
        }
    }

    /// Drag from one element's center to another's over `duration_seconds`.
    pub async fn drag_drop(
        &self,
        from_element_id: &str,
        to_element_id: &str,
        duration_seconds: f64,
        cancel: &CancellationToken,
    ) -> Result<(), AutomationError> {
        if !duration_seconds.is_finite() || duration_seconds <= 0.0 {
            return Err(AutomationError::InvalidParams(format!(
                "duration_seconds must be positive, got {duration_seconds}"
            )));
        }
        if duration_seconds > MAX_DRAG_SECONDS {
            return Err(AutomationError::InvalidParams(format!(
                "duration_seconds must be at most {MAX_DRAG_SECONDS}"
            )));
        }
        self.require_accessibility()?;
        let (_from, origin) = self.resolve_target(from_element_id)?;
        let (_to, destination) = self.resolve_target(to_element_id)?;

        let steps = ((duration_seconds * 30.0).ceil() as usize).max(10);
        let step_delay = Duration::from_secs_f64(duration_seconds / steps as f64);
        let started = Instant::now();

        let _seq = self.sequence.lock().await;
        self.engine
            .post_mouse(MouseEventKind::Down, MouseButton::Left, origin, 1)?;
        for i in 1..=steps {
            if cancel.is_cancelled() {
                // The pointer is down; release it where it is before
                // reporting the cancellation.
                let t = i as f64 / steps as f64;
                let here = lerp(origin, destination, t);
                let _ = self
                    .engine
                    .post_mouse(MouseEventKind::Up, MouseButton::Left, here, 1);
                return Err(AutomationError::Cancelled {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            let t = i as f64 / steps as f64;
            let here = lerp(origin, destination, t);
            self.engine
                .post_mouse(MouseEventKind::Dragged, MouseButton::Left, here, 1)?;
            tokio::time::sleep(step_delay).await;
        }
        self.engine
            .post_mouse(MouseEventKind::Up, MouseButton::Left, destination, 1)?;
        debug!(from = %from_element_id, to = %to_element_id, steps, "drag completed");
        Ok(())
    }

    /// Scroll-wheel event at an element's center.
    pub async fn scroll(
        &self,
        element_id: &str,
        delta_x: i32,
        delta_y: i32,
    ) -> Result<(), AutomationError> {
        self.require_accessibility()?;
        let (_entry, center) = self.resolve_target(element_id)?;
        let _seq = self.sequence.lock().await;
        self.engine.post_scroll(center, delta_x, delta_y)
    }

    /// Extended gesture surface. Returns a description of what was actually
    /// emitted, since pinch and rotate reduce to approximations.
    pub async fn gesture(
        &self,
        element_id: &str,
        gesture: Gesture,
        cancel: &CancellationToken,
    ) -> Result<String, AutomationError> {
        self.require_accessibility()?;
        let (_entry, center) = self.resolve_target(element_id)?;
        match gesture {
            Gesture::Swipe {
                direction,
                distance,
            } => {
                let d = distance.unwrap_or(100.0);
                if !d.is_finite() || d <= 0.0 {
                    return Err(AutomationError::InvalidParams(format!(
                        "swipe distance must be positive, got {d}"
                    )));
                }
                let target = match direction {
                    SwipeDirection::Up => Point::new(center.x, center.y - d),
                    SwipeDirection::Down => Point::new(center.x, center.y + d),
                    SwipeDirection::Left => Point::new(center.x - d, center.y),
                    SwipeDirection::Right => Point::new(center.x + d, center.y),
                };
                self.pointer_sweep(center, target, 0.3, cancel).await?;
                Ok(format!("swipe {direction:?} emitted as pointer drag"))
            }
            Gesture::Pinch { scale } => {
                if !scale.is_finite() || scale <= 0.0 {
                    return Err(AutomationError::InvalidParams(format!(
                        "pinch scale must be positive, got {scale}"
                    )));
                }
                // Nearest scroll approximation: zoom direction maps to
                // vertical wheel motion.
                let delta = if scale >= 1.0 { 5 } else { -5 };
                let _seq = self.sequence.lock().await;
                self.engine.post_scroll(center, 0, delta)?;
                Ok("pinch emitted as scroll-wheel approximation".to_string())
            }
            Gesture::Rotate { degrees } => {
                if !degrees.is_finite() {
                    return Err(AutomationError::InvalidParams(
                        "rotate degrees must be finite".into(),
                    ));
                }
                let delta = if degrees >= 0.0 { 3 } else { -3 };
                let _seq = self.sequence.lock().await;
                self.engine.post_scroll(center, delta, 0)?;
                Ok("rotate emitted as horizontal-scroll approximation".to_string())
            }
        }
    }

    /// Down–drag–up sweep between two global points.
    async fn pointer_sweep(
        &self,
        from: Point,
        to: Point,
        duration_seconds: f64,
        cancel: &CancellationToken,
    ) -> Result<(), AutomationError> {
        let steps = 10usize;
        let step_delay = Duration::from_secs_f64(duration_seconds / steps as f64);
        let started = Instant::now();
        let _seq = self.sequence.lock().await;
        self.engine
            .post_mouse(MouseEventKind::Down, MouseButton::Left, from, 1)?;
        for i in 1..=steps {
            if cancel.is_cancelled() {
                let here = lerp(from, to, i as f64 / steps as f64);
                let _ = self
                    .engine
                    .post_mouse(MouseEventKind::Up, MouseButton::Left, here, 1);
                return Err(AutomationError::Cancelled {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            let here = lerp(from, to, i as f64 / steps as f64);
            self.engine
                .post_mouse(MouseEventKind::Dragged, MouseButton::Left, here, 1)?;
            tokio::time::sleep(step_delay).await;
        }
        self.engine
            .post_mouse(MouseEventKind::Up, MouseButton::Left, to, 1)?;
        Ok(())
    }
}

fn lerp(a: Point, b: Point, t: f64) -> Point {
    Point::new(a.x + (b.x - a.x) * t, a.y + (b.y - a.y) * t)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lerp_endpoints() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(10.0, 20.0);
        assert_eq!(lerp(a, b, 0.0), a);
        assert_eq!(lerp(a, b, 1.0), b);
        assert_eq!(lerp(a, b, 0.5), Point::new(5.0, 10.0));
    }
}
