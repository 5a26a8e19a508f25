use super::fixture;
use crate::directory::{AppSelector, WindowSelector};
use crate::geometry::Rect;
use crate::platforms::mock::MockNodeHandle;

#[tokio::test]
async fn resolves_by_every_selector_kind() {
    let fx = fixture();
    let by_bundle = fx
        .directory
        .resolve_app(&AppSelector::BundleId("com.apple.weather".into()))
        .unwrap();
    let by_name = fx
        .directory
        .resolve_app(&AppSelector::ProcessName("weather".into()))
        .unwrap();
    let by_pid = fx.directory.resolve_app(&AppSelector::Pid(101)).unwrap();
    assert_eq!(by_bundle, by_name);
    assert_eq!(by_bundle, by_pid);
}

#[tokio::test]
async fn missing_app_reports_the_selector() {
    let fx = fixture();
    let err = fx
        .directory
        .resolve_app(&AppSelector::BundleId("com.example.absent".into()))
        .unwrap_err();
    assert_eq!(err.error_code(), "APP_NOT_FOUND");
    assert!(err.to_string().contains("com.example.absent"));
}

#[tokio::test]
async fn first_match_wins_in_os_order() {
    let fx = fixture();
    fx.engine.add_app(202, "Weather", None, false);
    let handle = fx
        .directory
        .resolve_app(&AppSelector::ProcessName("Weather".into()))
        .unwrap();
    let entry = fx.registry.lookup_app(&handle).unwrap();
    assert_eq!(entry.app.pid, 101);
}

#[tokio::test]
async fn window_title_pattern_and_index_agree() {
    let fx = fixture();
    fx.engine.add_window(
        101,
        "Preferences",
        Rect::new(300.0, 300.0, 400.0, 300.0),
        false,
        MockNodeHandle::new("AXWindow"),
    );
    let app = fx.directory.resolve_app(&AppSelector::Pid(101)).unwrap();

    let by_pattern = fx
        .directory
        .resolve_window(&app, &WindowSelector::TitlePattern("Pref.*".into()))
        .unwrap();
    let by_index = fx
        .directory
        .resolve_window(&app, &WindowSelector::Index(1))
        .unwrap();
    assert_eq!(by_pattern, by_index);

    // Default selection prefers the main window.
    let default = fx
        .directory
        .resolve_window(&app, &WindowSelector::Default)
        .unwrap();
    let main = fx
        .directory
        .resolve_window(&app, &WindowSelector::Index(0))
        .unwrap();
    assert_eq!(default, main);
}

#[tokio::test]
async fn bad_window_selectors_are_rejected() {
    let fx = fixture();
    let app = fx.directory.resolve_app(&AppSelector::Pid(101)).unwrap();

    let err = fx
        .directory
        .resolve_window(&app, &WindowSelector::Index(5))
        .unwrap_err();
    assert_eq!(err.error_code(), "WINDOW_NOT_FOUND");

    let err = fx
        .directory
        .resolve_window(&app, &WindowSelector::TitlePattern("[".into()))
        .unwrap_err();
    assert_eq!(err.error_code(), "INVALID_PARAMS");

    let err = fx
        .directory
        .resolve_window(&app, &WindowSelector::TitlePattern("Nope".into()))
        .unwrap_err();
    assert_eq!(err.error_code(), "WINDOW_NOT_FOUND");
}

#[tokio::test]
async fn accessible_listing_respects_the_trust_probe() {
    let fx = fixture();
    assert_eq!(fx.directory.accessible_applications().unwrap().len(), 1);
    fx.engine.set_trusted(false);
    assert!(fx.directory.accessible_applications().unwrap().is_empty());
}

#[tokio::test]
async fn running_listing_carries_windows() {
    let fx = fixture();
    let apps = fx.directory.running_applications().unwrap();
    assert_eq!(apps.len(), 1);
    let windows = fx.directory.windows_for_app(&apps[0].handle).unwrap();
    assert_eq!(windows.len(), 1);
    assert_eq!(windows[0].1.title.as_deref(), Some("Weather — Cupertino"));
    // Window bounds are global-space.
    assert_eq!(windows[0].1.bounds, Rect::new(100.0, 100.0, 800.0, 600.0));
}
