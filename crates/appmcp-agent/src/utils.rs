//! Tool argument schemas and logging bootstrap.

use appmcp::{AXQuery, Gesture, MouseButton, RecognitionLevel, SwipeDirection, TextInputMethod};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct EmptyArgs {}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResolveAppArgs {
    /// Bundle identifier, e.g. "com.apple.weather"
    #[serde(default)]
    pub bundle_id: Option<String>,
    /// Localized process name, matched case-insensitively
    #[serde(default)]
    pub process_name: Option<String>,
    /// Process id
    #[serde(default)]
    pub pid: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ResolveWindowArgs {
    /// Application handle from resolve_app
    pub app_handle: String,
    /// Regular expression matched against window titles; wins over index
    /// when both are present
    #[serde(default)]
    pub title_pattern: Option<String>,
    /// Zero-based window index
    #[serde(default)]
    pub index: Option<usize>,
}

/// Filter options for snapshot element trees.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct QueryArgs {
    /// Friendly role name (button, textfield, text, image, ...)
    #[serde(default)]
    pub role: Option<String>,
    /// Case-insensitive substring match against element title or value
    #[serde(default)]
    pub title: Option<String>,
    /// Exact match against the application-assigned identifier
    #[serde(default)]
    pub identifier: Option<String>,
    /// Enabled-state filter; defaults to enabled-only
    #[serde(default)]
    pub enabled: Option<bool>,
}

impl QueryArgs {
    pub fn into_query(self) -> AXQuery {
        AXQuery {
            role: self.role,
            title: self.title,
            identifier: self.identifier,
            enabled: self.enabled,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct CaptureUiSnapshotArgs {
    /// Bundle identifier of the target application
    pub bundle_id: String,
    /// Optional window: a zero-based index or a title pattern
    #[serde(default)]
    pub window: Option<String>,
    /// Optional element filter
    #[serde(default)]
    pub query: Option<QueryArgs>,
    /// Run text recognition over the captured image
    #[serde(default)]
    pub include_text_recognition: Option<bool>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ButtonArg {
    Left,
    Right,
    Center,
}

impl From<ButtonArg> for MouseButton {
    fn from(value: ButtonArg) -> Self {
        match value {
            ButtonArg::Left => MouseButton::Left,
            ButtonArg::Right => MouseButton::Right,
            ButtonArg::Center => MouseButton::Center,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClickElementArgs {
    /// Element id from a snapshot
    pub element_id: String,
    /// Mouse button, default left
    #[serde(default)]
    pub button: Option<ButtonArg>,
    /// Click count (1 = single, 2 = double, ...), between 1 and 10
    #[serde(default)]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum InputMethodArg {
    Type,
    SetValue,
}

impl From<InputMethodArg> for TextInputMethod {
    fn from(value: InputMethodArg) -> Self {
        match value {
            InputMethodArg::Type => TextInputMethod::Type,
            InputMethodArg::SetValue => TextInputMethod::SetValue,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum CoordinateSpaceArg {
    Window,
    Screen,
    Global,
}

impl From<CoordinateSpaceArg> for appmcp::CoordinateSpace {
    fn from(value: CoordinateSpaceArg) -> Self {
        match value {
            CoordinateSpaceArg::Window => appmcp::CoordinateSpace::Window,
            CoordinateSpaceArg::Screen => appmcp::CoordinateSpace::Screen,
            CoordinateSpaceArg::Global => appmcp::CoordinateSpace::Global,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClickCoordinatesArgs {
    pub x: f64,
    pub y: f64,
    /// Reference frame of (x, y): window, screen or global (default)
    #[serde(default)]
    pub space: Option<CoordinateSpaceArg>,
    /// Window handle anchoring window-space coordinates
    #[serde(default)]
    pub window_handle: Option<String>,
    /// Mouse button, default left
    #[serde(default)]
    pub button: Option<ButtonArg>,
    /// Click count, between 1 and 10
    #[serde(default)]
    pub count: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct InputTextArgs {
    /// Element id from a snapshot
    pub element_id: String,
    /// Text to deliver
    pub text: String,
    /// "type" synthesizes key events, "set_value" writes the value attribute
    #[serde(default)]
    pub method: Option<InputMethodArg>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct DragDropArgs {
    pub from_element_id: String,
    pub to_element_id: String,
    /// Drag duration in seconds, default 1.0
    #[serde(default)]
    pub duration_seconds: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ScrollWindowArgs {
    /// Element id from a snapshot; the scroll lands at its center
    pub element_id: String,
    /// Vertical wheel delta (positive scrolls up)
    pub delta_y: i32,
    /// Horizontal wheel delta, default 0
    #[serde(default)]
    pub delta_x: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WaitTimeArgs {
    /// Seconds to wait; must be positive
    pub duration_seconds: f64,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionLevelArg {
    Accurate,
    Fast,
}

impl From<RecognitionLevelArg> for RecognitionLevel {
    fn from(value: RecognitionLevelArg) -> Self {
        match value {
            RecognitionLevelArg::Accurate => RecognitionLevel::Accurate,
            RecognitionLevelArg::Fast => RecognitionLevel::Fast,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ReadContentArgs {
    /// Bundle identifier of the target application
    pub bundle_id: String,
    /// Optional window: a zero-based index or a title pattern
    #[serde(default)]
    pub window: Option<String>,
    /// OCR accuracy, default accurate
    #[serde(default)]
    pub recognition_level: Option<RecognitionLevelArg>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum GestureKindArg {
    Swipe,
    Pinch,
    Rotate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SwipeDirectionArg {
    Up,
    Down,
    Left,
    Right,
}

impl From<SwipeDirectionArg> for SwipeDirection {
    fn from(value: SwipeDirectionArg) -> Self {
        match value {
            SwipeDirectionArg::Up => SwipeDirection::Up,
            SwipeDirectionArg::Down => SwipeDirection::Down,
            SwipeDirectionArg::Left => SwipeDirection::Left,
            SwipeDirectionArg::Right => SwipeDirection::Right,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct GestureArgs {
    /// Element id from a snapshot; the gesture anchors at its center
    pub element_id: String,
    pub kind: GestureKindArg,
    /// Swipe direction (swipe only)
    #[serde(default)]
    pub direction: Option<SwipeDirectionArg>,
    /// Swipe distance in pixels, default 100 (swipe only)
    #[serde(default)]
    pub distance: Option<f64>,
    /// Zoom factor, > 1 zooms in (pinch only)
    #[serde(default)]
    pub scale: Option<f64>,
    /// Rotation in degrees, positive is clockwise (rotate only)
    #[serde(default)]
    pub degrees: Option<f64>,
}

impl GestureArgs {
    pub fn into_gesture(self) -> Result<Gesture, appmcp::AutomationError> {
        match self.kind {
            GestureKindArg::Swipe => {
                let direction = self.direction.ok_or_else(|| {
                    appmcp::AutomationError::InvalidParams("swipe requires a direction".into())
                })?;
                Ok(Gesture::Swipe {
                    direction: direction.into(),
                    distance: self.distance,
                })
            }
            GestureKindArg::Pinch => {
                let scale = self.scale.ok_or_else(|| {
                    appmcp::AutomationError::InvalidParams("pinch requires a scale".into())
                })?;
                Ok(Gesture::Pinch { scale })
            }
            GestureKindArg::Rotate => {
                let degrees = self.degrees.ok_or_else(|| {
                    appmcp::AutomationError::InvalidParams("rotate requires degrees".into())
                })?;
                Ok(Gesture::Rotate { degrees })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum WaitConditionArg {
    Time,
    UiChange,
    WindowAppear,
    WindowDisappear,
    GestureComplete,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct WaitForArgs {
    pub condition: WaitConditionArg,
    /// Milliseconds to wait, between 1 and 30000
    pub duration_ms: u64,
    /// Target window handle (ui_change)
    #[serde(default)]
    pub window_handle: Option<String>,
    /// Target application handle (window_appear / window_disappear)
    #[serde(default)]
    pub app_handle: Option<String>,
    /// Window title pattern (window_appear / window_disappear)
    #[serde(default)]
    pub title_pattern: Option<String>,
}

/// Initialize tracing: stderr for the operator, a rolling file for
/// postmortems. Stdout stays untouched; it carries the JSON-RPC stream.
pub fn init_logging(default_level: &str) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_env("APPMCP_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    let timer = tracing_subscriber::fmt::time::OffsetTime::new(
        offset,
        time::macros::format_description!("[year]-[month]-[day] [hour]:[minute]:[second]"),
    );

    let stderr_layer = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(timer.clone())
        .with_target(false);

    match dirs::cache_dir() {
        Some(dir) => {
            let log_dir = dir.join("appmcp").join("logs");
            std::fs::create_dir_all(&log_dir)?;
            let appender = tracing_appender::rolling::daily(log_dir, "appmcp-agent.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_timer(timer)
                .with_ansi(false);
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            Ok(None)
        }
    }
}
