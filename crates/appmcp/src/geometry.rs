//! Coordinate spaces and conversions.
//!
//! Every action ultimately reduces to a point in *global* coordinates: a
//! single y-down space shared across displays, origin at the top-left of the
//! primary display. The OS's native display space (`screen`) is y-up with its
//! origin at a display's bottom-left; window space is y-down from the
//! window's top-left corner.

use serde::{Deserialize, Serialize};

use crate::errors::AutomationError;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x < self.x + self.width && p.y >= self.y && p.y < self.y + self.height
    }

    /// True when the rectangle can host a pointer event.
    pub fn has_area(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// A physical display in global coordinates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayInfo {
    pub id: u32,
    /// Bounds in global (y-down) coordinates.
    pub bounds: Rect,
    pub is_primary: bool,
    pub scale_factor: f64,
}

/// Reference frame of a caller-supplied point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinateSpace {
    /// Origin at the window's top-left, y-down.
    Window,
    /// Origin at a display's bottom-left, y-up (the OS-native display space).
    Screen,
    /// Shared y-down space across all displays.
    Global,
}

/// The display whose bounds contain the point, if any.
pub fn display_containing(displays: &[DisplayInfo], p: Point) -> Option<&DisplayInfo> {
    displays.iter().find(|d| d.bounds.contains(p))
}

/// Convert a point from `space` into global coordinates.
///
/// `window_bounds` must be supplied (freshly read) for window-space points.
/// Screen-space points are resolved against the display whose flipped bounds
/// contain them; primary display when ambiguous.
pub fn to_global(
    p: Point,
    space: CoordinateSpace,
    window_bounds: Option<Rect>,
    displays: &[DisplayInfo],
) -> Result<Point, AutomationError> {
    let global = match space {
        CoordinateSpace::Global => p,
        CoordinateSpace::Window => {
            let win = window_bounds.ok_or_else(|| {
                AutomationError::InvalidParams(
                    "window-space coordinates require a target window".into(),
                )
            })?;
            Point::new(win.x + p.x, win.y + p.y)
        }
        CoordinateSpace::Screen => {
            let display = displays
                .iter()
                .find(|d| {
                    let local_x = p.x - d.bounds.x;
                    local_x >= 0.0 && local_x < d.bounds.width
                })
                .or_else(|| displays.iter().find(|d| d.is_primary))
                .ok_or_else(|| {
                    AutomationError::CoordinateOutOfBounds(format!(
                        "({}, {}) maps to no display",
                        p.x, p.y
                    ))
                })?;
            // Flip y against the display height: screen space is y-up from
            // the display's bottom-left corner.
            Point::new(
                display.bounds.x + (p.x - display.bounds.x),
                display.bounds.y + (display.bounds.height - p.y),
            )
        }
    };

    if display_containing(displays, global).is_none() {
        return Err(AutomationError::CoordinateOutOfBounds(format!(
            "({}, {}) lies outside every display",
            global.x, global.y
        )));
    }
    Ok(global)
}

/// Convert a global point into window coordinates.
pub fn global_to_window(p: Point, window_bounds: Rect) -> Point {
    Point::new(p.x - window_bounds.x, p.y - window_bounds.y)
}
