use super::{fixture, resolve_weather, Fixture};
use crate::platforms::mock::SyntheticEvent;
use crate::platforms::{KeyInput, MouseButton, MouseEventKind};
use crate::snapshot::UiNode;
use crate::{CancellationToken, Gesture, SwipeDirection, TextInputMethod};

async fn snapshot_ids(fx: &Fixture, win: &str) -> Vec<UiNode> {
    let cancel = CancellationToken::new();
    fx.pipeline
        .elements_only(win, None, &cancel)
        .await
        .unwrap()
        .elements
}

fn find_by_title(nodes: &[UiNode], title: &str) -> Option<String> {
    for node in nodes {
        if node.title.as_deref() == Some(title) {
            return Some(node.id.clone());
        }
        if let Some(found) = find_by_title(&node.children, title) {
            return Some(found);
        }
    }
    None
}

fn find_by_identifier(nodes: &[UiNode], ident: &str) -> Option<String> {
    for node in nodes {
        if node.identifier.as_deref() == Some(ident) {
            return Some(node.id.clone());
        }
        if let Some(found) = find_by_identifier(&node.children, ident) {
            return Some(found);
        }
    }
    None
}

#[tokio::test]
async fn default_click_prefers_the_accessibility_action() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let button = find_by_title(&elements, "Refresh").unwrap();

    let outcome = fx
        .input
        .click_element(&button, MouseButton::Left, 1)
        .await
        .unwrap();
    assert_eq!(outcome.method, "accessibility_action");
    assert_eq!(fx.refresh_button.press_count(), 1);
    // The AX action path posts no low-level events.
    assert!(fx.engine.recorded_events().is_empty());
}

#[tokio::test]
async fn multi_click_synthesizes_numbered_events() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let button = find_by_title(&elements, "Refresh").unwrap();

    let outcome = fx
        .input
        .click_element(&button, MouseButton::Left, 2)
        .await
        .unwrap();
    assert_eq!(outcome.method, "synthesized_events");

    let events = fx.engine.recorded_events();
    let states: Vec<(MouseEventKind, i64)> = events
        .iter()
        .filter_map(|e| match e {
            SyntheticEvent::Mouse {
                kind, click_state, ..
            } => Some((*kind, *click_state)),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![
            (MouseEventKind::Down, 1),
            (MouseEventKind::Up, 1),
            (MouseEventKind::Down, 2),
            (MouseEventKind::Up, 2),
        ]
    );
    // Events land at the element's center.
    if let SyntheticEvent::Mouse { at, .. } = &events[0] {
        assert_eq!((at.x, at.y), (160.0, 155.0));
    } else {
        panic!("expected a mouse event");
    }
}

#[tokio::test]
async fn right_clicks_always_synthesize() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let button = find_by_title(&elements, "Refresh").unwrap();

    let outcome = fx
        .input
        .click_element(&button, MouseButton::Right, 1)
        .await
        .unwrap();
    assert_eq!(outcome.method, "synthesized_events");
    assert!(fx.engine.recorded_events().iter().any(|e| matches!(
        e,
        SyntheticEvent::Mouse {
            button: MouseButton::Right,
            ..
        }
    )));
}

#[tokio::test]
async fn disabled_elements_reject_clicks_without_posting() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let locate = find_by_title(&elements, "Locate").unwrap();

    let err = fx
        .input
        .click_element(&locate, MouseButton::Left, 1)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "ELEMENT_NOT_ACCESSIBLE");
    assert!(fx.engine.recorded_events().is_empty());
}

#[tokio::test]
async fn click_count_bounds_are_enforced() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let button = find_by_title(&elements, "Refresh").unwrap();

    for count in [0, 11] {
        let err = fx
            .input
            .click_element(&button, MouseButton::Left, count)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMS");
    }
    assert!(fx.engine.recorded_events().is_empty());
}

#[tokio::test]
async fn unknown_element_ids_fail_accessibly() {
    let fx = fixture();
    let err = fx
        .input
        .click_element("bogus", MouseButton::Left, 1)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "ELEMENT_NOT_ACCESSIBLE");
}

#[tokio::test]
async fn typing_maps_newline_and_tab_to_virtual_keys() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let field = find_by_identifier(&elements, "search-field").unwrap();

    fx.input
        .input_text(&field, "a\n\t", TextInputMethod::Type)
        .await
        .unwrap();

    let keys: Vec<(KeyInput, bool)> = fx
        .engine
        .recorded_events()
        .iter()
        .filter_map(|e| match e {
            SyntheticEvent::Key { key, down } => Some((*key, *down)),
            _ => None,
        })
        .collect();
    assert_eq!(
        keys,
        vec![
            (KeyInput::Unicode('a'), true),
            (KeyInput::Unicode('a'), false),
            (KeyInput::Virtual(36), true),
            (KeyInput::Virtual(36), false),
            (KeyInput::Virtual(48), true),
            (KeyInput::Virtual(48), false),
        ]
    );
}

#[tokio::test]
async fn drag_posts_down_interpolated_drags_then_up() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let from = find_by_title(&elements, "Refresh").unwrap();
    let to = find_by_identifier(&elements, "search-field").unwrap();

    let cancel = CancellationToken::new();
    fx.input.drag_drop(&from, &to, 0.2, &cancel).await.unwrap();

    let mouse: Vec<MouseEventKind> = fx
        .engine
        .recorded_events()
        .iter()
        .filter_map(|e| match e {
            SyntheticEvent::Mouse { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(mouse.first(), Some(&MouseEventKind::Down));
    assert_eq!(mouse.last(), Some(&MouseEventKind::Up));
    let drags = mouse
        .iter()
        .filter(|k| **k == MouseEventKind::Dragged)
        .count();
    assert!(drags >= 10, "expected >= 10 drag steps, got {drags}");

    // The final up lands on the destination center.
    if let Some(SyntheticEvent::Mouse { kind, at, .. }) =
        fx.engine.recorded_events().last()
    {
        assert_eq!(*kind, MouseEventKind::Up);
        assert_eq!((at.x, at.y), (320.0, 155.0));
    }
}

#[tokio::test]
async fn drag_duration_bounds_are_enforced() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let from = find_by_title(&elements, "Refresh").unwrap();
    let to = find_by_identifier(&elements, "search-field").unwrap();
    let cancel = CancellationToken::new();

    for bad in [0.0, -1.0, f64::NAN, 120.0] {
        let err = fx
            .input
            .drag_drop(&from, &to, bad, &cancel)
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_PARAMS");
    }
}

#[tokio::test]
async fn cancelled_drag_releases_the_pointer_and_reports_elapsed() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let from = find_by_title(&elements, "Refresh").unwrap();
    let to = find_by_identifier(&elements, "search-field").unwrap();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = fx
        .input
        .drag_drop(&from, &to, 1.0, &cancel)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "TIMEOUT");

    let mouse: Vec<MouseEventKind> = fx
        .engine
        .recorded_events()
        .iter()
        .filter_map(|e| match e {
            SyntheticEvent::Mouse { kind, .. } => Some(*kind),
            _ => None,
        })
        .collect();
    assert_eq!(mouse.first(), Some(&MouseEventKind::Down));
    assert_eq!(mouse.last(), Some(&MouseEventKind::Up));
}

#[tokio::test]
async fn scroll_targets_the_element_center() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let field = find_by_identifier(&elements, "search-field").unwrap();

    fx.input.scroll(&field, 4, -12).await.unwrap();
    let events = fx.engine.recorded_events();
    assert_eq!(events.len(), 1);
    match &events[0] {
        SyntheticEvent::Scroll { at, delta_x, delta_y } => {
            assert_eq!((at.x, at.y), (320.0, 155.0));
            assert_eq!((*delta_x, *delta_y), (4, -12));
        }
        other => panic!("expected scroll, got {other:?}"),
    }
}

#[tokio::test]
async fn swipe_reduces_to_a_pointer_drag() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let field = find_by_identifier(&elements, "search-field").unwrap();
    let cancel = CancellationToken::new();

    let report = fx
        .input
        .gesture(
            &field,
            Gesture::Swipe {
                direction: SwipeDirection::Up,
                distance: Some(50.0),
            },
            &cancel,
        )
        .await
        .unwrap();
    assert!(report.contains("pointer drag"));
    let events = fx.engine.recorded_events();
    assert!(matches!(
        events.first(),
        Some(SyntheticEvent::Mouse {
            kind: MouseEventKind::Down,
            ..
        })
    ));
    if let Some(SyntheticEvent::Mouse { at, .. }) = events.last() {
        // 50 px straight up from the field center.
        assert_eq!((at.x, at.y), (320.0, 105.0));
    }
}

#[tokio::test]
async fn pinch_reports_its_approximation() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let field = find_by_identifier(&elements, "search-field").unwrap();
    let cancel = CancellationToken::new();

    let report = fx
        .input
        .gesture(&field, Gesture::Pinch { scale: 1.5 }, &cancel)
        .await
        .unwrap();
    assert!(report.contains("approximation"));
    assert!(matches!(
        fx.engine.recorded_events().first(),
        Some(SyntheticEvent::Scroll { .. })
    ));
}

#[tokio::test]
async fn coordinate_clicks_convert_and_validate_the_point() {
    let fx = fixture();
    use crate::geometry::CoordinateSpace;
    use crate::Point;

    // Global point on the primary display.
    let outcome = fx
        .input
        .click_at(
            Point::new(500.0, 400.0),
            CoordinateSpace::Global,
            None,
            MouseButton::Left,
            1,
        )
        .await
        .unwrap();
    assert_eq!(outcome.method, "synthesized_events");
    assert_eq!((outcome.at.x, outcome.at.y), (500.0, 400.0));

    // Window space offsets by the window origin (100, 100).
    fx.engine.clear_events();
    let outcome = fx
        .input
        .click_at(
            Point::new(10.0, 20.0),
            CoordinateSpace::Window,
            Some(crate::Rect::new(100.0, 100.0, 800.0, 600.0)),
            MouseButton::Left,
            1,
        )
        .await
        .unwrap();
    assert_eq!((outcome.at.x, outcome.at.y), (110.0, 120.0));

    // A point off every display is rejected before any event posts.
    fx.engine.clear_events();
    let err = fx
        .input
        .click_at(
            Point::new(-4000.0, -4000.0),
            CoordinateSpace::Global,
            None,
            MouseButton::Left,
            1,
        )
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "COORDINATE_OUT_OF_BOUNDS");
    assert!(fx.engine.recorded_events().is_empty());
}

#[tokio::test]
async fn input_requires_accessibility_permission() {
    let fx = fixture();
    let (_, win) = resolve_weather(&fx);
    let elements = snapshot_ids(&fx, &win).await;
    let button = find_by_title(&elements, "Refresh").unwrap();

    fx.engine.set_trusted(false);
    let err = fx
        .input
        .click_element(&button, MouseButton::Left, 1)
        .await
        .unwrap_err();
    assert_eq!(err.error_code(), "PERMISSION_DENIED");
    assert!(fx.engine.recorded_events().is_empty());
}
