//! Protocol dispatcher: routes MCP tool calls and resource reads into the
//! automation engine and wraps results in protocol envelopes.
//!
//! Domain failures never surface as JSON-RPC errors on the tool path; they
//! become `{ is_error: true }` results carrying the error kind, so a
//! controller can always read what went wrong.

use std::sync::Arc;
use std::time::Duration;

use appmcp::{
    create_engine, AccessibilityEngine, AppSelector, AutomationError, CancellationToken,
    Directory, HandleRegistry, InputSynthesizer, MouseButton, RecognitionLevel, Snapshot,
    SnapshotOptions, SnapshotPipeline, TextInputMethod, WaitCondition, WaitRunner, WindowSelector,
};
use rmcp::handler::server::router::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::model::{
    AnnotateAble, CallToolResult, Content, Implementation, ListResourcesResult,
    PaginatedRequestParam, ProtocolVersion, RawResource, ReadResourceRequestParam,
    ReadResourceResult, ResourceContents, ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::{tool, tool_router, ErrorData as McpError, ServerHandler};
use serde_json::json;
use tracing::{error, info, warn};

use crate::resources::{self, RESOURCE_CATALOG, RESOURCE_SCHEME_PREFIX};
use crate::utils::{
    CaptureUiSnapshotArgs, ClickCoordinatesArgs, ClickElementArgs, DragDropArgs, EmptyArgs,
    GestureArgs, InputTextArgs, ReadContentArgs, ResolveAppArgs, ResolveWindowArgs,
    ScrollWindowArgs, WaitConditionArg, WaitForArgs, WaitTimeArgs,
};

/// Upper bound for `wait_time`, aligned with the wait-condition budget.
const MAX_WAIT_TIME_SECONDS: f64 = 30.0;

/// Wrap a domain error in the tool-call error envelope.
fn domain_error(err: AutomationError) -> CallToolResult {
    CallToolResult::error(vec![Content::text(format!("{}: {err}", err.error_code()))])
}

fn ok_text(text: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(text.into())])
}

fn ok_json(value: &serde_json::Value) -> Result<CallToolResult, McpError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
    Ok(ok_text(text))
}

#[derive(Clone)]
pub struct AutomationServer {
    engine: Arc<dyn AccessibilityEngine>,
    registry: Arc<HandleRegistry>,
    directory: Arc<Directory>,
    snapshots: Arc<SnapshotPipeline>,
    input: Arc<InputSynthesizer>,
    waits: Arc<WaitRunner>,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl AutomationServer {
    /// Build against the host platform's engine.
    pub fn new() -> Result<Self, McpError> {
        let engine = create_engine().map_err(|e| {
            McpError::internal_error(
                "failed to initialize the accessibility engine",
                Some(json!({ "reason": e.to_string() })),
            )
        })?;
        Ok(Self::with_engine(engine))
    }

    /// Build against any engine; tests hand in the in-memory one.
    pub fn with_engine(engine: Arc<dyn AccessibilityEngine>) -> Self {
        let registry = Arc::new(HandleRegistry::new());
        Self {
            directory: Arc::new(Directory::new(engine.clone(), registry.clone())),
            snapshots: Arc::new(SnapshotPipeline::new(engine.clone(), registry.clone())),
            input: Arc::new(InputSynthesizer::new(engine.clone(), registry.clone())),
            waits: Arc::new(WaitRunner::new(engine.clone(), registry.clone())),
            engine,
            registry,
            tool_router: Self::tool_router(),
        }
    }

    pub fn registry(&self) -> &Arc<HandleRegistry> {
        &self.registry
    }

    /// The full tool catalog, for diagnostics and tests.
    pub fn tools(&self) -> Vec<rmcp::model::Tool> {
        self.tool_router.list_all()
    }

    /// One-shot health probe of the underlying engine.
    pub fn health(&self) -> appmcp::AutomationHealth {
        appmcp::check_automation_health(self.engine.as_ref())
    }

    /// Log permission status at startup; the server keeps running and
    /// rejects affected calls instead of exiting.
    pub fn report_permissions(&self) {
        if self.engine.accessibility_trusted() {
            info!("accessibility permission: granted");
        } else {
            warn!("accessibility permission: missing; snapshots and input will be rejected");
        }
        if self.engine.screen_capture_allowed() {
            info!("screen-capture permission: granted");
        } else {
            warn!("screen-capture permission: missing; image-producing tools will be rejected");
        }
    }

    /// Periodic registry sweep. Failures log and the next tick retries.
    pub fn spawn_sweeper(&self, interval: Duration) -> tokio::task::JoinHandle<()> {
        let registry = self.registry.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick fires immediately; skip it.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let registry = registry.clone();
                match tokio::task::spawn_blocking(move || registry.sweep_expired()).await {
                    Ok(stats) => {
                        if stats.apps_removed + stats.windows_removed + stats.elements_removed > 0
                        {
                            info!(?stats, "registry sweep");
                        }
                    }
                    Err(e) => error!(error = %e, "registry sweep failed; will retry"),
                }
            }
        })
    }

    /// Resolve a bundle id plus optional window spec (index or title
    /// pattern) into a window handle.
    async fn resolve_snapshot_target(
        &self,
        bundle_id: &str,
        window: Option<&str>,
    ) -> Result<(String, String), AutomationError> {
        let selector = match window {
            None => WindowSelector::Default,
            Some(spec) => match spec.trim().parse::<usize>() {
                Ok(index) => WindowSelector::Index(index),
                Err(_) => WindowSelector::TitlePattern(spec.to_string()),
            },
        };
        let directory = self.directory.clone();
        let bundle = bundle_id.to_string();
        tokio::task::spawn_blocking(move || {
            let app = directory.resolve_app(&AppSelector::BundleId(bundle))?;
            let win = directory.resolve_window(&app, &selector)?;
            Ok((app, win))
        })
        .await
        .map_err(|e| AutomationError::SystemError(format!("worker failed: {e}")))?
    }

    fn snapshot_response(snapshot: &Snapshot) -> Result<CallToolResult, McpError> {
        let elements_json = serde_json::to_string_pretty(&snapshot.elements)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let title = snapshot
            .metadata
            .window_title
            .as_deref()
            .unwrap_or("(untitled)");

        let mut text = String::new();
        if snapshot.metadata.image_omitted {
            text.push_str(&format!(
                "UI Snapshot captured (metadata only): {title}\n\
                 The combined response would exceed the size ceiling; \
                 use elements_snapshot to read elements without the image.\n"
            ));
        } else {
            text.push_str(&format!("UI Snapshot captured: {title}\n"));
        }
        text.push_str(&format!(
            "Window: {} ({}x{})\n",
            snapshot.window_handle, snapshot.metadata.width, snapshot.metadata.height
        ));
        text.push_str(&format!(
            "Elements found: {}\n",
            snapshot.metadata.element_count
        ));
        if snapshot.metadata.truncated {
            text.push_str("Note: the element tree was truncated at the walk limits.\n");
        }
        if let Some(image) = &snapshot.image {
            text.push_str(&format!(
                "Image ({}x{}): {}\n",
                image.width, image.height, image.data_uri
            ));
        }
        text.push_str("UI Elements:\n");
        text.push_str(&elements_json);
        if let Some(ocr) = &snapshot.text_recognition {
            let ocr_json = serde_json::to_string_pretty(ocr)
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
            text.push_str("\nText Recognition:\n");
            text.push_str(&ocr_json);
        }
        if let Some(err) = &snapshot.text_recognition_error {
            text.push_str(&format!("\nText Recognition failed: {err}\n"));
        }
        Ok(ok_text(text))
    }

    #[tool(
        description = "Resolve a running application to a stable app_handle. Provide exactly one of bundle_id, process_name or pid."
    )]
    pub async fn resolve_app(
        &self,
        Parameters(args): Parameters<ResolveAppArgs>,
    ) -> Result<CallToolResult, McpError> {
        let mut selectors = Vec::new();
        if let Some(bundle) = args.bundle_id {
            selectors.push(AppSelector::BundleId(bundle));
        }
        if let Some(name) = args.process_name {
            selectors.push(AppSelector::ProcessName(name));
        }
        if let Some(pid) = args.pid {
            selectors.push(AppSelector::Pid(pid));
        }
        if selectors.len() != 1 {
            return Ok(domain_error(AutomationError::InvalidParams(format!(
                "exactly one of bundle_id, process_name or pid is required (got {})",
                selectors.len()
            ))));
        }
        let selector = selectors.remove(0);
        let directory = self.directory.clone();
        let resolved =
            tokio::task::spawn_blocking(move || directory.resolve_app(&selector))
                .await
                .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        match resolved {
            Ok(handle) => ok_json(&json!({ "app_handle": handle })),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(
        description = "Resolve one window of an application to a window_handle. Provide a title_pattern (regex) or a zero-based index; the pattern wins when both are present, and with neither the main window is chosen."
    )]
    pub async fn resolve_window(
        &self,
        Parameters(args): Parameters<ResolveWindowArgs>,
    ) -> Result<CallToolResult, McpError> {
        let selector = match (args.title_pattern, args.index) {
            (Some(pattern), _) => WindowSelector::TitlePattern(pattern),
            (None, Some(index)) => WindowSelector::Index(index),
            (None, None) => WindowSelector::Default,
        };
        let directory = self.directory.clone();
        let app_handle = args.app_handle;
        let resolved = tokio::task::spawn_blocking(move || {
            directory.resolve_window(&app_handle, &selector)
        })
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        match resolved {
            Ok(handle) => ok_json(&json!({ "window_handle": handle })),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(description = "List every running application with UI capability.")]
    pub async fn list_running_applications(
        &self,
        Parameters(_args): Parameters<EmptyArgs>,
    ) -> Result<CallToolResult, McpError> {
        let directory = self.directory.clone();
        let engine = self.engine.clone();
        let listed = tokio::task::spawn_blocking(move || {
            let request = resources::ResourceRequest {
                name: "running_applications".to_string(),
                params: Default::default(),
            };
            resources::read_resource(&directory, engine.as_ref(), &request)
        })
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        match listed {
            Ok(value) => ok_json(&value),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(description = "List the windows of every running application, with app context.")]
    pub async fn list_application_windows(
        &self,
        Parameters(_args): Parameters<EmptyArgs>,
    ) -> Result<CallToolResult, McpError> {
        let directory = self.directory.clone();
        let listed = tokio::task::spawn_blocking(move || {
            let apps = directory.running_applications()?;
            let mut out = Vec::new();
            for entry in &apps {
                let windows = directory.windows_for_app(&entry.handle).unwrap_or_default();
                for (handle, window) in windows {
                    out.push(json!({
                        "app": entry.app.name,
                        "bundle_id": entry.app.bundle_id,
                        "app_handle": entry.handle,
                        "window_handle": handle,
                        "title": window.title,
                        "bounds": {
                            "x": window.bounds.x,
                            "y": window.bounds.y,
                            "width": window.bounds.width,
                            "height": window.bounds.height,
                        },
                        "is_main": window.is_main,
                        "is_visible": window.is_visible,
                    }));
                }
            }
            Ok::<_, AutomationError>(json!(out))
        })
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        match listed {
            Ok(value) => ok_json(&value),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(
        description = "Capture a UI snapshot of an application window: a JPEG image plus a JSON tree of elements, each with a stable element id. Optionally filter elements with query and run text recognition."
    )]
    pub async fn capture_ui_snapshot(
        &self,
        Parameters(args): Parameters<CaptureUiSnapshotArgs>,
    ) -> Result<CallToolResult, McpError> {
        let target = self
            .resolve_snapshot_target(&args.bundle_id, args.window.as_deref())
            .await;
        let (_app, win) = match target {
            Ok(t) => t,
            Err(e) => return Ok(domain_error(e)),
        };
        let query = args.query.map(|q| q.into_query());
        let opts = SnapshotOptions {
            include_text_recognition: args.include_text_recognition.unwrap_or(false),
            ..Default::default()
        };
        let cancel = CancellationToken::new();
        match self
            .snapshots
            .capture(&win, query.as_ref(), &opts, &cancel)
            .await
        {
            Ok(snapshot) => Self::snapshot_response(&snapshot),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(
        description = "Like capture_ui_snapshot but without the image: returns the element tree only. Cheaper, and the element ids are identical."
    )]
    pub async fn elements_snapshot(
        &self,
        Parameters(args): Parameters<CaptureUiSnapshotArgs>,
    ) -> Result<CallToolResult, McpError> {
        let target = self
            .resolve_snapshot_target(&args.bundle_id, args.window.as_deref())
            .await;
        let (_app, win) = match target {
            Ok(t) => t,
            Err(e) => return Ok(domain_error(e)),
        };
        let query = args.query.map(|q| q.into_query());
        let cancel = CancellationToken::new();
        match self
            .snapshots
            .elements_only(&win, query.as_ref(), &cancel)
            .await
        {
            Ok(snapshot) => ok_json(&json!({
                "window_handle": snapshot.window_handle,
                "metadata": snapshot.metadata,
                "elements": snapshot.elements,
            })),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(
        description = "Click an element by id. Default is a single left click; set button (left/right/center) and count (1-10) for anything else."
    )]
    pub async fn click_element(
        &self,
        Parameters(args): Parameters<ClickElementArgs>,
    ) -> Result<CallToolResult, McpError> {
        let button: MouseButton = args.button.map(Into::into).unwrap_or(MouseButton::Left);
        let count = args.count.unwrap_or(1);
        match self
            .input
            .click_element(&args.element_id, button, count)
            .await
        {
            Ok(outcome) => Ok(ok_text(format!(
                "Clicked element {} ({}, count={}) at ({:.0}, {:.0})",
                args.element_id, outcome.method, outcome.count, outcome.at.x, outcome.at.y
            ))),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(
        description = "Click at a point instead of an element. Coordinates are interpreted in the given space (window, screen or global; default global); window space needs a window_handle. Points outside every display are rejected."
    )]
    pub async fn click_coordinates(
        &self,
        Parameters(args): Parameters<ClickCoordinatesArgs>,
    ) -> Result<CallToolResult, McpError> {
        let space: appmcp::CoordinateSpace = args
            .space
            .map(Into::into)
            .unwrap_or(appmcp::CoordinateSpace::Global);
        let window_bounds = match (&space, &args.window_handle) {
            (appmcp::CoordinateSpace::Window, Some(handle)) => {
                // Read the window origin fresh so the offset is current.
                match self.registry.lookup_window(handle) {
                    Ok(entry) => {
                        Some(entry.window.element.bounds().unwrap_or(entry.window.bounds))
                    }
                    Err(e) => return Ok(domain_error(e)),
                }
            }
            (appmcp::CoordinateSpace::Window, None) => {
                return Ok(domain_error(AutomationError::InvalidParams(
                    "window-space coordinates require a window_handle".into(),
                )))
            }
            _ => None,
        };
        let button: MouseButton = args.button.map(Into::into).unwrap_or(MouseButton::Left);
        let count = args.count.unwrap_or(1);
        match self
            .input
            .click_at(
                appmcp::Point::new(args.x, args.y),
                space,
                window_bounds,
                button,
                count,
            )
            .await
        {
            Ok(outcome) => Ok(ok_text(format!(
                "Clicked at ({:.0}, {:.0}) ({}, count={})",
                outcome.at.x, outcome.at.y, outcome.method, outcome.count
            ))),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(
        description = "Deliver text to an element by id. method \"type\" synthesizes keystrokes (newline maps to Return, tab to Tab); \"set_value\" writes the value attribute directly."
    )]
    pub async fn input_text(
        &self,
        Parameters(args): Parameters<InputTextArgs>,
    ) -> Result<CallToolResult, McpError> {
        let method: TextInputMethod = args.method.map(Into::into).unwrap_or_default();
        match self
            .input
            .input_text(&args.element_id, &args.text, method)
            .await
        {
            Ok(()) => Ok(ok_text(match method {
                TextInputMethod::Type => format!(
                    "Typed {} characters into element {}",
                    args.text.chars().count(),
                    args.element_id
                ),
                TextInputMethod::SetValue => {
                    format!("Set value of element {}", args.element_id)
                }
            })),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(
        description = "Drag from one element to another: pointer down at the origin, interpolated drag events over duration_seconds (default 1.0), pointer up at the destination."
    )]
    pub async fn drag_drop(
        &self,
        Parameters(args): Parameters<DragDropArgs>,
    ) -> Result<CallToolResult, McpError> {
        let duration = args.duration_seconds.unwrap_or(1.0);
        let cancel = CancellationToken::new();
        match self
            .input
            .drag_drop(&args.from_element_id, &args.to_element_id, duration, &cancel)
            .await
        {
            Ok(()) => Ok(ok_text(format!(
                "Dragged {} to {} over {duration:.1}s",
                args.from_element_id, args.to_element_id
            ))),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(description = "Post a scroll-wheel event at an element's center.")]
    pub async fn scroll_window(
        &self,
        Parameters(args): Parameters<ScrollWindowArgs>,
    ) -> Result<CallToolResult, McpError> {
        let delta_x = args.delta_x.unwrap_or(0);
        match self
            .input
            .scroll(&args.element_id, delta_x, args.delta_y)
            .await
        {
            Ok(()) => Ok(ok_text(format!(
                "Scrolled element {} by ({delta_x}, {})",
                args.element_id, args.delta_y
            ))),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(description = "Sleep for duration_seconds (positive, at most 30).")]
    pub async fn wait_time(
        &self,
        Parameters(args): Parameters<WaitTimeArgs>,
    ) -> Result<CallToolResult, McpError> {
        let secs = args.duration_seconds;
        if !secs.is_finite() || secs <= 0.0 || secs > MAX_WAIT_TIME_SECONDS {
            return Ok(domain_error(AutomationError::InvalidParams(format!(
                "duration_seconds must be in (0, {MAX_WAIT_TIME_SECONDS}], got {secs}"
            ))));
        }
        let duration_ms = ((secs * 1000.0).round() as u64).max(1);
        let cancel = CancellationToken::new();
        match self
            .waits
            .wait(&WaitCondition::Time, duration_ms, &cancel)
            .await
        {
            Ok(outcome) => Ok(ok_text(format!("Waited {} ms", outcome.elapsed_ms))),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(
        description = "Wait for a condition: time, ui_change (needs window_handle), window_appear / window_disappear (need app_handle, optional title_pattern), gesture_complete. Polls every 100 ms up to duration_ms (max 30000); timing out unsatisfied is a normal completion."
    )]
    pub async fn wait_for(
        &self,
        Parameters(args): Parameters<WaitForArgs>,
    ) -> Result<CallToolResult, McpError> {
        let condition = match args.condition {
            WaitConditionArg::Time => WaitCondition::Time,
            WaitConditionArg::GestureComplete => WaitCondition::GestureComplete,
            WaitConditionArg::UiChange => match args.window_handle {
                Some(window_handle) => WaitCondition::UiChange { window_handle },
                None => {
                    return Ok(domain_error(AutomationError::InvalidParams(
                        "ui_change requires a window_handle".into(),
                    )))
                }
            },
            WaitConditionArg::WindowAppear | WaitConditionArg::WindowDisappear => {
                let Some(app_handle) = args.app_handle else {
                    return Ok(domain_error(AutomationError::InvalidParams(
                        "window waits require an app_handle".into(),
                    )));
                };
                if matches!(args.condition, WaitConditionArg::WindowAppear) {
                    WaitCondition::WindowAppear {
                        app_handle,
                        title_pattern: args.title_pattern,
                    }
                } else {
                    WaitCondition::WindowDisappear {
                        app_handle,
                        title_pattern: args.title_pattern,
                    }
                }
            }
        };
        let cancel = CancellationToken::new();
        match self.waits.wait(&condition, args.duration_ms, &cancel).await {
            Ok(outcome) => ok_json(&json!({
                "satisfied": outcome.satisfied,
                "elapsed_ms": outcome.elapsed_ms,
            })),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(
        description = "Read the text content of an application window via OCR. Returns structured JSON: per-block text with bounds and confidence, plus the full text."
    )]
    pub async fn read_content(
        &self,
        Parameters(args): Parameters<ReadContentArgs>,
    ) -> Result<CallToolResult, McpError> {
        let target = self
            .resolve_snapshot_target(&args.bundle_id, args.window.as_deref())
            .await;
        let (_app, win) = match target {
            Ok(t) => t,
            Err(e) => return Ok(domain_error(e)),
        };
        let level: RecognitionLevel = args
            .recognition_level
            .map(Into::into)
            .unwrap_or(RecognitionLevel::Accurate);
        match self.snapshots.recognize_window_text(&win, level).await {
            Ok(recognition) => ok_json(&json!({
                "window_handle": win,
                "blocks": recognition.blocks,
                "full_text": recognition.full_text,
                "processing_time_ms": recognition.processing_time_ms,
            })),
            Err(e) => Ok(domain_error(e)),
        }
    }

    #[tool(
        description = "Perform a gesture at an element: swipe (direction + optional distance), pinch (scale) or rotate (degrees). Pinch and rotate are emitted as their nearest scroll approximations and the response says what was actually sent."
    )]
    pub async fn gesture(
        &self,
        Parameters(args): Parameters<GestureArgs>,
    ) -> Result<CallToolResult, McpError> {
        let element_id = args.element_id.clone();
        let gesture = match args.into_gesture() {
            Ok(g) => g,
            Err(e) => return Ok(domain_error(e)),
        };
        let cancel = CancellationToken::new();
        match self.input.gesture(&element_id, gesture, &cancel).await {
            Ok(report) => Ok(ok_text(format!("Gesture on {element_id}: {report}"))),
            Err(e) => Ok(domain_error(e)),
        }
    }
}

impl ServerHandler for AutomationServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder()
                .enable_tools()
                .enable_resources()
                .build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(crate::prompt::get_server_instructions()),
        }
    }

    async fn call_tool(
        &self,
        request: rmcp::model::CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        use rmcp::handler::server::tool::ToolCallContext;

        let tool_name = request.name.to_string();
        let started = std::time::Instant::now();
        info!(tool = %tool_name, "tool call");

        let tcc = ToolCallContext::new(self, request, context);
        let result = self.tool_router.call(tcc).await;

        let duration_ms = started.elapsed().as_millis() as u64;
        match &result {
            Ok(outcome) if outcome.is_error == Some(true) => {
                warn!(tool = %tool_name, duration_ms, "tool call returned an error envelope")
            }
            Ok(_) => info!(tool = %tool_name, duration_ms, "tool call completed"),
            Err(e) => warn!(tool = %tool_name, duration_ms, error = %e, "tool call rejected"),
        }
        result
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<rmcp::model::ListToolsResult, McpError> {
        Ok(rmcp::model::ListToolsResult::with_all_items(
            self.tool_router.list_all(),
        ))
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources = RESOURCE_CATALOG
            .iter()
            .map(|(name, description)| {
                let mut raw =
                    RawResource::new(format!("{RESOURCE_SCHEME_PREFIX}{name}"), name.to_string());
                raw.description = Some(description.to_string());
                raw.mime_type = Some("application/json".to_string());
                raw.no_annotation()
            })
            .collect();
        Ok(ListResourcesResult {
            resources,
            next_cursor: None,
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let uri = request.uri.to_string();
        let parsed = resources::parse_resource_uri(&uri).map_err(map_resource_error)?;
        let directory = self.directory.clone();
        let engine = self.engine.clone();
        let value = tokio::task::spawn_blocking(move || {
            resources::read_resource(&directory, engine.as_ref(), &parsed)
        })
        .await
        .map_err(|e| McpError::internal_error(e.to_string(), None))?
        .map_err(map_resource_error)?;

        let text = serde_json::to_string_pretty(&value)
            .map_err(|e| McpError::internal_error(e.to_string(), None))?;
        let mut contents = ResourceContents::text(text, uri);
        if let ResourceContents::TextResourceContents { mime_type, .. } = &mut contents {
            *mime_type = Some("application/json".to_string());
        }
        Ok(ReadResourceResult {
            contents: vec![contents],
        })
    }
}

/// Resource reads surface JSON-RPC error envelopes, unlike tool calls.
fn map_resource_error(err: AutomationError) -> McpError {
    let data = Some(json!({ "code": err.error_code() }));
    match &err {
        AutomationError::ResourceUnavailable(_) => {
            McpError::resource_not_found(err.to_string(), data)
        }
        AutomationError::InvalidParams(_) => McpError::invalid_params(err.to_string(), data),
        _ => McpError::internal_error(err.to_string(), data),
    }
}
