//! Resource readers: JSON descriptions of system state.
//!
//! Resource URIs use the `appmcp` scheme: `appmcp://resources/<name>[?query]`.

use std::collections::HashMap;

use appmcp::{AutomationError, Directory, RunningApp, WindowRef};
use serde_json::{json, Value};

pub const RESOURCE_SCHEME_PREFIX: &str = "appmcp://resources/";

/// Catalog of readable resources: (name, description).
pub const RESOURCE_CATALOG: &[(&str, &str)] = &[
    (
        "installed_applications",
        "Applications present in the conventional application directories",
    ),
    (
        "running_applications",
        "Every running process with UI capability, with handles and windows",
    ),
    (
        "accessible_applications",
        "Running applications that answer the accessibility-trust probe",
    ),
    (
        "list_windows",
        "Windows of one application; requires ?app_handle=<handle>",
    ),
];

/// A parsed resource URI.
#[derive(Debug)]
pub struct ResourceRequest {
    pub name: String,
    pub params: HashMap<String, String>,
}

/// Split an `appmcp://resources/...` URI into name and query parameters.
pub fn parse_resource_uri(uri: &str) -> Result<ResourceRequest, AutomationError> {
    let rest = uri.strip_prefix(RESOURCE_SCHEME_PREFIX).ok_or_else(|| {
        AutomationError::ResourceUnavailable(format!("unrecognized resource URI {uri}"))
    })?;
    let (name, query) = match rest.split_once('?') {
        Some((name, query)) => (name, Some(query)),
        None => (rest, None),
    };
    if name.is_empty() {
        return Err(AutomationError::ResourceUnavailable(format!(
            "unrecognized resource URI {uri}"
        )));
    }
    let mut params = HashMap::new();
    if let Some(query) = query {
        for pair in query.split('&').filter(|p| !p.is_empty()) {
            match pair.split_once('=') {
                Some((key, value)) => params.insert(key.to_string(), value.to_string()),
                None => params.insert(pair.to_string(), String::new()),
            };
        }
    }
    Ok(ResourceRequest {
        name: name.to_string(),
        params,
    })
}

fn window_json(handle: &str, window: &WindowRef) -> Value {
    json!({
        "handle": handle,
        "title": window.title,
        "bounds": {
            "x": window.bounds.x,
            "y": window.bounds.y,
            "width": window.bounds.width,
            "height": window.bounds.height,
        },
        "is_main": window.is_main,
        "is_visible": window.is_visible,
    })
}

fn app_json(directory: &Directory, entry: &RunningApp) -> Value {
    let windows: Vec<Value> = directory
        .windows_for_app(&entry.handle)
        .map(|ws| {
            ws.iter()
                .map(|(handle, window)| window_json(handle, window))
                .collect()
        })
        .unwrap_or_default();
    json!({
        "name": entry.app.name,
        "bundle_id": entry.app.bundle_id,
        "handle": entry.handle,
        "pid": entry.app.pid,
        "is_active": entry.app.is_active,
        "window_count": windows.len(),
        "windows": windows,
    })
}

/// Dispatch a parsed resource request to its reader.
pub fn read_resource(
    directory: &Directory,
    engine: &dyn appmcp::AccessibilityEngine,
    request: &ResourceRequest,
) -> Result<Value, AutomationError> {
    match request.name.as_str() {
        "installed_applications" => {
            let apps = engine.installed_applications()?;
            Ok(json!(apps
                .iter()
                .map(|a| json!({ "name": a.name, "bundle_id": a.bundle_id }))
                .collect::<Vec<_>>()))
        }
        "running_applications" => {
            let apps = directory.running_applications()?;
            Ok(json!(apps
                .iter()
                .map(|entry| app_json(directory, entry))
                .collect::<Vec<_>>()))
        }
        "accessible_applications" => {
            let apps = directory.accessible_applications()?;
            Ok(json!(apps
                .iter()
                .map(|entry| app_json(directory, entry))
                .collect::<Vec<_>>()))
        }
        "list_windows" => {
            let app_handle = request.params.get("app_handle").ok_or_else(|| {
                AutomationError::InvalidParams(
                    "list_windows requires an app_handle query parameter".into(),
                )
            })?;
            // Missing and invalid handles are both caller mistakes here.
            let windows = directory.windows_for_app(app_handle).map_err(|e| match e {
                AutomationError::AppNotFound(msg) => AutomationError::InvalidParams(msg),
                other => other,
            })?;
            Ok(json!(windows
                .iter()
                .map(|(handle, window)| window_json(handle, window))
                .collect::<Vec<_>>()))
        }
        other => Err(AutomationError::ResourceUnavailable(format!(
            "unknown resource '{other}'"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_plain_and_query_uris() {
        let req = parse_resource_uri("appmcp://resources/running_applications").unwrap();
        assert_eq!(req.name, "running_applications");
        assert!(req.params.is_empty());

        let req = parse_resource_uri("appmcp://resources/list_windows?app_handle=ah_1").unwrap();
        assert_eq!(req.name, "list_windows");
        assert_eq!(req.params.get("app_handle").map(String::as_str), Some("ah_1"));
    }

    #[test]
    fn rejects_foreign_uris() {
        for bad in [
            "http://resources/running_applications",
            "appmcp://other/running_applications",
            "appmcp://resources/",
        ] {
            let err = parse_resource_uri(bad).unwrap_err();
            assert_eq!(err.error_code(), "RESOURCE_UNAVAILABLE");
        }
    }
}
