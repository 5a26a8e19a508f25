//! Cross-module scenario tests against the in-memory engine.

mod directory_tests;
mod input_tests;
mod registry_tests;
mod snapshot_tests;

use std::sync::Arc;

use crate::directory::Directory;
use crate::geometry::Rect;
use crate::input::InputSynthesizer;
use crate::platforms::mock::{MockEngine, MockNodeHandle, MockWindowHandle};
use crate::platforms::AccessibilityEngine;
use crate::registry::HandleRegistry;
use crate::snapshot::SnapshotPipeline;
use crate::wait::WaitRunner;

pub(crate) struct Fixture {
    pub engine: Arc<MockEngine>,
    pub registry: Arc<HandleRegistry>,
    pub directory: Directory,
    pub pipeline: SnapshotPipeline,
    pub input: InputSynthesizer,
    pub waits: WaitRunner,
    pub window: MockWindowHandle,
    pub refresh_button: MockNodeHandle,
}

/// One weather-style app with a window and a small control tree.
pub(crate) fn fixture() -> Fixture {
    let engine = Arc::new(MockEngine::new());
    engine.add_app(101, "Weather", Some("com.apple.weather"), true);
    let refresh_button = MockNodeHandle::new("AXButton")
        .title("Refresh")
        .identifier("refresh")
        .bounds(120.0, 140.0, 80.0, 30.0)
        .pressable();
    let tree = MockNodeHandle::new("AXWindow").child(
        MockNodeHandle::new("AXGroup")
            .bounds(100.0, 120.0, 800.0, 560.0)
            .child(refresh_button.clone())
            .child(
                MockNodeHandle::new("AXTextField")
                    .title("Search")
                    .identifier("search-field")
                    .value("")
                    .bounds(220.0, 140.0, 200.0, 30.0),
            )
            .child(
                MockNodeHandle::new("AXStaticText")
                    .value("72°")
                    .bounds(120.0, 200.0, 60.0, 24.0),
            )
            .child(
                MockNodeHandle::new("AXButton")
                    .title("Locate")
                    .bounds(120.0, 240.0, 80.0, 30.0)
                    .disabled(),
            ),
    );
    let window = engine.add_window(
        101,
        "Weather — Cupertino",
        Rect::new(100.0, 100.0, 800.0, 600.0),
        true,
        tree,
    );

    let registry = Arc::new(HandleRegistry::new());
    let dyn_engine: Arc<dyn AccessibilityEngine> = engine.clone();
    Fixture {
        directory: Directory::new(dyn_engine.clone(), registry.clone()),
        pipeline: SnapshotPipeline::new(dyn_engine.clone(), registry.clone()),
        input: InputSynthesizer::new(dyn_engine.clone(), registry.clone()),
        waits: WaitRunner::new(dyn_engine, registry.clone()),
        engine,
        registry,
        window,
        refresh_button,
    }
}

/// Resolve the fixture app and its main window, returning both handles.
pub(crate) fn resolve_weather(fx: &Fixture) -> (String, String) {
    let app = fx
        .directory
        .resolve_app(&crate::directory::AppSelector::BundleId(
            "com.apple.weather".into(),
        ))
        .expect("weather app resolves");
    let win = fx
        .directory
        .resolve_window(&app, &crate::directory::WindowSelector::Default)
        .expect("weather window resolves");
    (app, win)
}
