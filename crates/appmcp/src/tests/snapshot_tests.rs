use std::collections::HashSet;

use super::{fixture, resolve_weather};
use crate::geometry::Rect;
use crate::query::AXQuery;
use crate::snapshot::{SnapshotOptions, TextBlock, TextRecognition, UiNode};
use crate::CancellationToken;

fn collect_ids(nodes: &[UiNode], out: &mut HashSet<String>) {
    for node in nodes {
        out.insert(node.id.clone());
        collect_ids(&node.children, out);
    }
}

fn within(outer: Rect, inner: Rect) -> bool {
    inner.x >= outer.x
        && inner.y >= outer.y
        && inner.x + inner.width <= outer.x + outer.width
        && inner.y + inner.height <= outer.y + outer.height
}

#[tokio::test]
async fn snapshot_produces_image_and_elements() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let cancel = CancellationToken::new();
    let snap = fx
        .pipeline
        .capture(&win, None, &SnapshotOptions::default(), &cancel)
        .await
        .unwrap();

    assert_eq!(snap.window_handle, win);
    assert_eq!(snap.metadata.window_title.as_deref(), Some("Weather — Cupertino"));
    assert!(snap.metadata.element_count >= 5);
    assert!(!snap.metadata.truncated);
    let image = snap.image.expect("image present");
    assert!(image.data_uri.starts_with("data:image/jpeg;base64,"));
    // Longest side respects the downscale ceiling.
    assert!(image.width.max(image.height) <= 600);
}

#[tokio::test]
async fn element_ids_are_stable_across_snapshots() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let cancel = CancellationToken::new();

    let first = fx.pipeline.elements_only(&win, None, &cancel).await.unwrap();
    let second = fx.pipeline.elements_only(&win, None, &cancel).await.unwrap();

    let mut ids_a = HashSet::new();
    let mut ids_b = HashSet::new();
    collect_ids(&first.elements, &mut ids_a);
    collect_ids(&second.elements, &mut ids_b);
    assert_eq!(ids_a, ids_b);
    assert!(!ids_a.is_empty());
}

#[tokio::test]
async fn text_recognition_does_not_change_element_ids() {
    let fx = fixture();
    fx.engine.set_ocr_result(TextRecognition {
        blocks: vec![TextBlock {
            text: "72°".into(),
            bounds: Rect::new(0.0, 0.0, 60.0, 24.0),
            confidence: 0.97,
        }],
        full_text: "72°".into(),
        processing_time_ms: 12,
    });
    let (_, win) = resolve_weather(&fx);
    let cancel = CancellationToken::new();

    let plain = fx
        .pipeline
        .capture(&win, None, &SnapshotOptions::default(), &cancel)
        .await
        .unwrap();
    let with_ocr = fx
        .pipeline
        .capture(
            &win,
            None,
            &SnapshotOptions {
                include_text_recognition: true,
                ..Default::default()
            },
            &cancel,
        )
        .await
        .unwrap();

    let mut ids_a = HashSet::new();
    let mut ids_b = HashSet::new();
    collect_ids(&plain.elements, &mut ids_a);
    collect_ids(&with_ocr.elements, &mut ids_b);
    assert_eq!(ids_a, ids_b);
    let ocr = with_ocr.text_recognition.expect("OCR attached");
    assert_eq!(ocr.full_text, "72°");
    assert!(plain.text_recognition.is_none());
}

#[tokio::test]
async fn ocr_failure_degrades_instead_of_failing() {
    let fx = fixture();
    // No OCR result configured: the mock engine errors.
    let (_, win) = resolve_weather(&fx);
    let cancel = CancellationToken::new();
    let snap = fx
        .pipeline
        .capture(
            &win,
            None,
            &SnapshotOptions {
                include_text_recognition: true,
                ..Default::default()
            },
            &cancel,
        )
        .await
        .unwrap();
    assert!(snap.text_recognition.is_none());
    assert!(snap.text_recognition_error.is_some());
}

#[tokio::test]
async fn element_bounds_stay_within_the_window() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let cancel = CancellationToken::new();
    let snap = fx.pipeline.elements_only(&win, None, &cancel).await.unwrap();

    let window_bounds = Rect::new(100.0, 100.0, 800.0, 600.0);
    fn check(nodes: &[UiNode], window: Rect) {
        for node in nodes {
            if node.bounds.has_area() {
                assert!(
                    within(window, node.bounds),
                    "{:?} outside window",
                    node.bounds
                );
            }
            check(&node.children, window);
        }
    }
    check(&snap.elements, window_bounds);
}

#[tokio::test]
async fn role_filter_keeps_ancestors_and_marks_matches() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let cancel = CancellationToken::new();
    let query = AXQuery {
        role: Some("button".into()),
        ..Default::default()
    };
    let snap = fx
        .pipeline
        .elements_only(&win, Some(&query), &cancel)
        .await
        .unwrap();

    // Window and group survive as unmarked context; only the enabled
    // Refresh button matches (Locate is disabled and enabled defaults on).
    let root = &snap.elements[0];
    assert_eq!(root.role, "window");
    assert!(!root.matched);
    let group = &root.children[0];
    assert!(!group.matched);
    assert_eq!(group.children.len(), 1);
    let button = &group.children[0];
    assert_eq!(button.role, "button");
    assert_eq!(button.title.as_deref(), Some("Refresh"));
    assert!(button.matched);
}

#[tokio::test]
async fn disabled_filter_finds_the_disabled_button() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let cancel = CancellationToken::new();
    let query = AXQuery {
        role: Some("button".into()),
        enabled: Some(false),
        ..Default::default()
    };
    let snap = fx
        .pipeline
        .elements_only(&win, Some(&query), &cancel)
        .await
        .unwrap();
    let group = &snap.elements[0].children[0];
    assert_eq!(group.children.len(), 1);
    assert_eq!(group.children[0].title.as_deref(), Some("Locate"));
}

#[tokio::test]
async fn title_filter_matches_value_text_too() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let cancel = CancellationToken::new();
    let query = AXQuery {
        title: Some("72".into()),
        ..Default::default()
    };
    let snap = fx
        .pipeline
        .elements_only(&win, Some(&query), &cancel)
        .await
        .unwrap();
    let group = &snap.elements[0].children[0];
    assert_eq!(group.children.len(), 1);
    assert_eq!(group.children[0].value.as_deref(), Some("72°"));
}

#[tokio::test]
async fn oversized_responses_drop_the_image() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let cancel = CancellationToken::new();
    let snap = fx
        .pipeline
        .capture(
            &win,
            None,
            &SnapshotOptions {
                response_byte_ceiling: 64,
                ..Default::default()
            },
            &cancel,
        )
        .await
        .unwrap();
    assert!(snap.image.is_none());
    assert!(snap.metadata.image_omitted);
    assert!(snap.metadata.element_count > 0);
}

#[tokio::test]
async fn snapshots_require_permissions() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let cancel = CancellationToken::new();

    fx.engine.set_capture_allowed(false);
    let err = fx
        .pipeline
        .capture(&win, None, &SnapshotOptions::default(), &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PERMISSION_DENIED");
    // Elements-only reads still work without screen capture.
    assert!(fx.pipeline.elements_only(&win, None, &cancel).await.is_ok());

    fx.engine.set_trusted(false);
    let err = fx
        .pipeline
        .elements_only(&win, None, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PERMISSION_DENIED");
}

#[tokio::test]
async fn set_value_round_trips_through_a_re_snapshot() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let cancel = CancellationToken::new();
    let snap = fx.pipeline.elements_only(&win, None, &cancel).await.unwrap();

    fn find<'a>(nodes: &'a [UiNode], ident: &str) -> Option<&'a UiNode> {
        for node in nodes {
            if node.identifier.as_deref() == Some(ident) {
                return Some(node);
            }
            if let Some(found) = find(&node.children, ident) {
                return Some(found);
            }
        }
        None
    }
    let field_id = find(&snap.elements, "search-field").unwrap().id.clone();

    fx.input
        .input_text(&field_id, "Cupertino", crate::TextInputMethod::SetValue)
        .await
        .unwrap();

    let again = fx.pipeline.elements_only(&win, None, &cancel).await.unwrap();
    let field = find(&again.elements, "search-field").unwrap();
    assert_eq!(field.id, field_id);
    assert_eq!(field.value.as_deref(), Some("Cupertino"));
}

#[tokio::test]
async fn cancellation_aborts_the_walk() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = fx
        .pipeline
        .elements_only(&win, None, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "TIMEOUT");
}
