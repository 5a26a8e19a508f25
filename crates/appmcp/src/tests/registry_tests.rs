use std::sync::Arc;
use std::time::Duration;

use super::{fixture, resolve_weather};
use crate::directory::{AppSelector, Directory, WindowSelector};
use crate::platforms::AccessibilityEngine;
use crate::registry::HandleRegistry;

#[tokio::test]
async fn redundant_resolves_return_the_same_handle() {
    let fx = fixture();
    let selector = AppSelector::BundleId("com.apple.weather".into());
    let first = fx.directory.resolve_app(&selector).unwrap();
    let second = fx.directory.resolve_app(&selector).unwrap();
    assert_eq!(first, second);
    assert!(first.starts_with("ah_"));

    let (_, win_a) = resolve_weather(&fx);
    let (_, win_b) = resolve_weather(&fx);
    assert_eq!(win_a, win_b);
    assert!(win_a.starts_with("wh_"));
}

#[tokio::test]
async fn handles_expire_after_ttl() {
    let fx = fixture();
    let registry = Arc::new(HandleRegistry::with_ttl(Duration::from_millis(20)));
    let dyn_engine: Arc<dyn AccessibilityEngine> = fx.engine.clone();
    let directory = Directory::new(dyn_engine, registry.clone());

    let app = directory
        .resolve_app(&AppSelector::BundleId("com.apple.weather".into()))
        .unwrap();
    let win = directory.resolve_window(&app, &WindowSelector::Default).unwrap();
    assert!(registry.lookup_app(&app).is_ok());
    assert!(registry.lookup_window(&win).is_ok());

    std::thread::sleep(Duration::from_millis(40));
    let err = registry.lookup_app(&app).unwrap_err();
    assert_eq!(err.error_code(), "APP_NOT_FOUND");
    let err = registry.lookup_window(&win).unwrap_err();
    assert_eq!(err.error_code(), "WINDOW_NOT_FOUND");

    // An expired handle is never silently reused: a fresh resolve allocates
    // a new one.
    let fresh = directory
        .resolve_app(&AppSelector::BundleId("com.apple.weather".into()))
        .unwrap();
    assert_ne!(app, fresh);
}

#[tokio::test]
async fn dead_applications_fail_liveness_on_lookup() {
    let fx = fixture();
    let (app, win) = resolve_weather(&fx);
    fx.engine.kill_app(101);

    let err = fx.registry.lookup_app(&app).unwrap_err();
    assert_eq!(err.error_code(), "APP_NOT_FOUND");
    let err = fx.registry.lookup_window(&win).unwrap_err();
    assert_eq!(err.error_code(), "WINDOW_NOT_FOUND");
}

#[tokio::test]
async fn sweep_drops_dead_entries_and_their_elements() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let cancel = crate::CancellationToken::new();
    fx.pipeline.elements_only(&win, None, &cancel).await.unwrap();

    let (apps, windows, elements) = fx.registry.census();
    assert_eq!((apps, windows), (1, 1));
    assert!(elements > 0);

    fx.engine.kill_app(101);
    let stats = fx.registry.sweep_expired();
    assert_eq!(stats.apps_removed, 1);
    assert_eq!(stats.windows_removed, 1);
    assert_eq!(stats.elements_removed, elements);
    assert_eq!(fx.registry.census(), (0, 0, 0));
}

#[tokio::test]
async fn element_lookup_fails_once_window_is_dropped() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let cancel = crate::CancellationToken::new();
    let snap = fx.pipeline.elements_only(&win, None, &cancel).await.unwrap();
    let some_id = snap.elements[0].id.clone();
    assert!(fx.registry.lookup_element(&some_id).is_ok());

    fx.registry.remove_window(&win);
    let err = fx.registry.lookup_element(&some_id).unwrap_err();
    assert_eq!(err.error_code(), "ELEMENT_NOT_ACCESSIBLE");
}

#[tokio::test]
async fn unknown_handles_are_rejected() {
    let fx = fixture();
    assert_eq!(
        fx.registry.lookup_app("ah_FFFF").unwrap_err().error_code(),
        "APP_NOT_FOUND"
    );
    assert_eq!(
        fx.registry.lookup_window("wh_FFFF").unwrap_err().error_code(),
        "WINDOW_NOT_FOUND"
    );
    assert_eq!(
        fx.registry.lookup_element("bogus").unwrap_err().error_code(),
        "ELEMENT_NOT_ACCESSIBLE"
    );
}
