//! Desktop GUI automation through accessibility APIs.
//!
//! This crate is the engine between an MCP dispatcher and the host OS: it
//! resolves opaque handles to live accessibility objects, produces filterable
//! UI snapshots paired with window rasters, and synthesizes ordered input
//! events at global screen positions.

pub mod directory;
pub mod errors;
pub mod geometry;
pub mod health;
pub mod input;
pub mod platforms;
pub mod query;
pub mod registry;
pub mod screenshot;
pub mod snapshot;
#[cfg(test)]
mod tests;
pub mod wait;

pub use directory::{AppSelector, Directory, RunningApp, WindowSelector};
pub use errors::AutomationError;
pub use geometry::{CoordinateSpace, DisplayInfo, Point, Rect};
pub use health::{check_automation_health, AutomationHealth, HealthStatus};
pub use input::{ClickOutcome, Gesture, InputSynthesizer, SwipeDirection, TextInputMethod};
pub use platforms::{
    create_engine, AccessibilityEngine, AppRef, InstalledApp, KeyInput, MouseButton,
    MouseEventKind, UIElement, UIElementImpl, WindowRef,
};
pub use query::AXQuery;
pub use registry::{HandleRegistry, SweepStats, DEFAULT_HANDLE_TTL, SWEEP_INTERVAL};
pub use screenshot::{ScreenshotResult, SNAPSHOT_MAX_DIMENSION};
pub use snapshot::{
    RecognitionLevel, Snapshot, SnapshotOptions, SnapshotPipeline, TextBlock, TextRecognition,
    UiNode,
};
pub use tokio_util::sync::CancellationToken;
pub use wait::{WaitCondition, WaitOutcome, WaitRunner, MAX_WAIT_MS};
