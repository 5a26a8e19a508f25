//! Platform abstraction: the operations the engine requires of the host OS.
//!
//! Everything above this module is host-independent; the concrete
//! accessibility, capture and event-post APIs live in per-OS submodules.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::AutomationError;
use crate::geometry::{DisplayInfo, Point, Rect};
use crate::screenshot::ScreenshotResult;
use crate::snapshot::{RecognitionLevel, TextRecognition};

#[cfg(target_os = "macos")]
pub mod macos;

#[cfg(any(test, feature = "mock"))]
pub mod mock;

/// A live reference to one OS accessibility object.
///
/// Attribute reads answer within a short per-call budget enforced by the
/// platform layer; a read that cannot answer yields an error, never a hang.
pub trait UIElementImpl: Send + Sync {
    /// Raw accessibility role, e.g. `AXButton`.
    fn role(&self) -> Result<String, AutomationError>;
    fn title(&self) -> Result<Option<String>, AutomationError>;
    fn value(&self) -> Result<Option<String>, AutomationError>;
    /// Application-assigned identifier, when present.
    fn identifier(&self) -> Result<Option<String>, AutomationError>;
    fn is_enabled(&self) -> Result<bool, AutomationError>;
    /// Bounds in global coordinates.
    fn bounds(&self) -> Result<Rect, AutomationError>;
    fn children(&self) -> Result<Vec<UIElement>, AutomationError>;
    /// Invoke the role's high-level activation action. `Ok(false)` means the
    /// role carries no such action and the caller should synthesize events.
    fn press(&self) -> Result<bool, AutomationError>;
    /// Write the value attribute directly.
    fn set_value(&self, value: &str) -> Result<(), AutomationError>;
    /// Liveness probe: does the underlying object still answer?
    fn is_alive(&self) -> bool;
}

/// Cheaply cloneable handle to a [`UIElementImpl`].
#[derive(Clone)]
pub struct UIElement(Arc<dyn UIElementImpl>);

impl UIElement {
    pub fn new(imp: Arc<dyn UIElementImpl>) -> Self {
        Self(imp)
    }

    pub fn role(&self) -> Result<String, AutomationError> {
        self.0.role()
    }
    pub fn title(&self) -> Result<Option<String>, AutomationError> {
        self.0.title()
    }
    pub fn value(&self) -> Result<Option<String>, AutomationError> {
        self.0.value()
    }
    pub fn identifier(&self) -> Result<Option<String>, AutomationError> {
        self.0.identifier()
    }
    pub fn is_enabled(&self) -> Result<bool, AutomationError> {
        self.0.is_enabled()
    }
    pub fn bounds(&self) -> Result<Rect, AutomationError> {
        self.0.bounds()
    }
    pub fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        self.0.children()
    }
    pub fn press(&self) -> Result<bool, AutomationError> {
        self.0.press()
    }
    pub fn set_value(&self, value: &str) -> Result<(), AutomationError> {
        self.0.set_value(value)
    }
    pub fn is_alive(&self) -> bool {
        self.0.is_alive()
    }
}

impl std::fmt::Debug for UIElement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UIElement")
            .field("role", &self.role().ok())
            .field("title", &self.title().ok().flatten())
            .finish()
    }
}

/// A running application as reported by the OS.
#[derive(Debug, Clone)]
pub struct AppRef {
    pub pid: i32,
    pub name: String,
    pub bundle_id: Option<String>,
    pub is_active: bool,
    /// The application's root accessibility element.
    pub element: UIElement,
}

/// One window of a running application.
#[derive(Debug, Clone)]
pub struct WindowRef {
    pub title: Option<String>,
    /// Bounds in global coordinates, normalized at read time.
    pub bounds: Rect,
    pub is_main: bool,
    pub is_visible: bool,
    /// Stable OS-provided key for this window, used to keep handles stable
    /// across redundant resolves.
    pub os_key: u64,
    pub element: UIElement,
}

/// An application present in the conventional application directories.
#[derive(Debug, Clone, serde::Serialize)]
pub struct InstalledApp {
    pub name: String,
    pub bundle_id: Option<String>,
}

/// A single key event payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyInput {
    /// Platform virtual key code (Return, Tab, ...).
    Virtual(u16),
    /// Arbitrary character delivered as a Unicode key event.
    Unicode(char),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    Left,
    Right,
    Center,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseEventKind {
    Down,
    Up,
    Dragged,
    Moved,
}

/// The operations the automation core requires of the host OS.
#[async_trait]
pub trait AccessibilityEngine: Send + Sync {
    /// Whether the process holds the accessibility permission.
    fn accessibility_trusted(&self) -> bool;
    /// Whether the process holds the screen-capture permission.
    fn screen_capture_allowed(&self) -> bool;

    /// Applications in the conventional application directories.
    fn installed_applications(&self) -> Result<Vec<InstalledApp>, AutomationError>;
    /// Every running process with UI capability, in OS-reported order.
    fn running_applications(&self) -> Result<Vec<AppRef>, AutomationError>;
    fn application_by_pid(&self, pid: i32) -> Result<AppRef, AutomationError>;
    fn windows_for_app(&self, app: &AppRef) -> Result<Vec<WindowRef>, AutomationError>;

    fn displays(&self) -> Result<Vec<DisplayInfo>, AutomationError>;
    /// Rasterize the window's current pixels.
    fn capture_window(&self, window: &WindowRef) -> Result<ScreenshotResult, AutomationError>;

    /// Run text recognition over an image.
    async fn recognize_text(
        &self,
        image: &ScreenshotResult,
        level: RecognitionLevel,
    ) -> Result<TextRecognition, AutomationError>;

    /// Post one pointer event at a global position. `click_state` carries
    /// the 1-based index within a multi-click burst.
    fn post_mouse(
        &self,
        kind: MouseEventKind,
        button: MouseButton,
        at: Point,
        click_state: i64,
    ) -> Result<(), AutomationError>;
    fn post_key(&self, key: KeyInput, down: bool) -> Result<(), AutomationError>;
    fn post_scroll(&self, at: Point, delta_x: i32, delta_y: i32)
        -> Result<(), AutomationError>;
}

/// Create the engine for the current platform.
pub fn create_engine() -> Result<Arc<dyn AccessibilityEngine>, AutomationError> {
    #[cfg(target_os = "macos")]
    {
        Ok(Arc::new(macos::MacOSEngine::new()?))
    }
    #[cfg(not(target_os = "macos"))]
    {
        Err(AutomationError::SystemError(
            "no accessibility engine for this platform".to_string(),
        ))
    }
}
