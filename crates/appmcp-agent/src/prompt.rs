//! Server instructions handed to clients at initialize time.

pub fn get_server_instructions() -> String {
    format!(
        r#"
You are controlling a desktop through this server's resources and tools.

**Workflow:**
1. Read `appmcp://resources/running_applications` (or call
   `list_running_applications`) to see what is running, then call
   `resolve_app` with exactly one of bundle_id / process_name / pid to get an
   `app_handle`.
2. Call `capture_ui_snapshot` with the target bundle_id. The response carries
   a JPEG of the window and a JSON tree of UI elements; every element has an
   `id`. Pass a `query` (role / title / identifier / enabled) to narrow large
   trees, or use `elements_snapshot` to skip the image entirely.
3. Act on elements with `click_element`, `input_text`, `drag_drop`,
   `scroll_window` and `gesture`, addressing them by element id. Element ids
   stay stable while the window's UI does not change, so re-snapshot after
   anything that alters the screen.
4. Use `wait_time` or `wait_for` (ui_change / window_appear /
   window_disappear) between actions instead of guessing at delays.

Handles expire after an hour of disuse; a rejected handle just means you
should resolve the application again.

Server version: {}.
"#,
        env!("CARGO_PKG_VERSION")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instructions_mention_the_core_workflow() {
        let text = get_server_instructions();
        for needle in ["resolve_app", "capture_ui_snapshot", "click_element", "wait_for"] {
            assert!(text.contains(needle), "missing {needle}");
        }
    }
}
