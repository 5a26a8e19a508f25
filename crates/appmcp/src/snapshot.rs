//! UI snapshot pipeline.
//!
//! Walks a window's accessibility tree, applies filter queries, assigns
//! deterministic element ids, captures the window's pixels, and optionally
//! runs text recognition. A snapshot is immutable once built.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::errors::AutomationError;
use crate::geometry::Rect;
use crate::platforms::{AccessibilityEngine, UIElement};
use crate::query::{self, AXQuery};
use crate::registry::HandleRegistry;
use crate::screenshot::{ScreenshotResult, SNAPSHOT_MAX_DIMENSION};

/// Depth bound for the tree walk.
pub const MAX_TREE_DEPTH: usize = 50;
/// Total node bound for the tree walk.
pub const MAX_TREE_NODES: usize = 5_000;
/// Nodes between cooperative yields.
const YIELD_EVERY: usize = 25;
/// Combined base64 response size above which the image is dropped.
pub const RESPONSE_BYTE_CEILING: usize = 50_000;

/// Requested OCR accuracy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecognitionLevel {
    #[default]
    Accurate,
    Fast,
}

/// One recognized run of text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextBlock {
    pub text: String,
    pub bounds: Rect,
    pub confidence: f32,
}

/// Text recognition over one image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRecognition {
    pub blocks: Vec<TextBlock>,
    pub full_text: String,
    pub processing_time_ms: u64,
}

/// One node of an emitted snapshot tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UiNode {
    pub id: String,
    /// Friendly role name where the AX role is mapped, raw role otherwise.
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    pub bounds: Rect,
    pub enabled: bool,
    /// Set on nodes that satisfied the query; parents kept for context
    /// stay unmarked.
    #[serde(skip_serializing_if = "std::ops::Not::not", default)]
    pub matched: bool,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub children: Vec<UiNode>,
}

impl UiNode {
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(UiNode::count).sum::<usize>()
    }
}

/// The captured image as shipped on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotImage {
    pub data_uri: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub window_title: Option<String>,
    pub width: f64,
    pub height: f64,
    pub element_count: usize,
    /// True when depth or node limits truncated the walk.
    pub truncated: bool,
    /// True when the image was dropped to stay under the response ceiling.
    pub image_omitted: bool,
}

/// Immutable capture of one window at one instant.
#[derive(Clone, Serialize, Debug)]
pub struct Snapshot {
    pub window_handle: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<SnapshotImage>,
    pub elements: Vec<UiNode>,
    pub metadata: SnapshotMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_recognition: Option<TextRecognition>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text_recognition_error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct SnapshotOptions {
    pub include_image: bool,
    pub include_text_recognition: bool,
    pub recognition_level: RecognitionLevel,
    pub max_image_dimension: u32,
    pub response_byte_ceiling: usize,
}

impl Default for SnapshotOptions {
    fn default() -> Self {
        Self {
            include_image: true,
            include_text_recognition: false,
            recognition_level: RecognitionLevel::Accurate,
            max_image_dimension: SNAPSHOT_MAX_DIMENSION,
            response_byte_ceiling: RESPONSE_BYTE_CEILING,
        }
    }
}

/// Deterministic element id: stable across snapshots of an unchanged UI.
pub fn element_id(window_handle: &str, path: &[usize], ax_role: &str) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(window_handle.as_bytes());
    for idx in path {
        hasher.update(&(*idx as u64).to_le_bytes());
    }
    hasher.update(ax_role.as_bytes());
    let hash = hasher.finalize();
    let bytes = &hash.as_bytes()[..8];
    let mut id = String::with_capacity(19);
    id.push_str("el_");
    for b in bytes {
        id.push_str(&format!("{b:02x}"));
    }
    id
}

/// A walked node before filtering, carrying its live reference.
struct WalkNode {
    element: UIElement,
    ax_role: String,
    path: Vec<usize>,
    node: UiNode,
    children: Vec<WalkNode>,
}

pub struct SnapshotPipeline {
    engine: Arc<dyn AccessibilityEngine>,
    registry: Arc<HandleRegistry>,
}

impl SnapshotPipeline {
    pub fn new(engine: Arc<dyn AccessibilityEngine>, registry: Arc<HandleRegistry>) -> Self {
        Self { engine, registry }
    }

    /// Capture a full snapshot of the window behind `window_handle`.
    pub async fn capture(
        &self,
        window_handle: &str,
        query: Option<&AXQuery>,
        opts: &SnapshotOptions,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, AutomationError> {
        if !self.engine.accessibility_trusted() {
            return Err(AutomationError::PermissionDenied(
                "accessibility permission is required for UI snapshots".into(),
            ));
        }
        if let Some(q) = query {
            q.validate()?;
        }

        let entry = self.registry.lookup_window(window_handle)?;
        let window_bounds = entry.window.element.bounds().unwrap_or(entry.window.bounds);
        let started = Instant::now();

        // Walk the tree first so the image measures the same instant.
        let mut truncated = false;
        let mut node_budget = MAX_TREE_NODES;
        let mut roots = Vec::new();
        let mut visited = 0usize;
        let root_walk = self
            .walk(
                entry.window.element.clone(),
                window_handle,
                vec![],
                0,
                &mut node_budget,
                &mut truncated,
                &mut visited,
                cancel,
                started,
            )
            .await?;
        if let Some(root) = root_walk {
            roots.push(root);
        }

        // Filter, then register only the surviving nodes.
        let filtered: Vec<WalkNode> = match query {
            Some(q) if !q.is_empty() => roots.into_iter().filter_map(|n| prune(n, q)).collect(),
            _ => roots,
        };
        for root in &filtered {
            self.register_tree(window_handle, root)?;
        }
        let elements: Vec<UiNode> = filtered.into_iter().map(emit).collect();
        let element_count = elements.iter().map(UiNode::count).sum();

        let mut image = None;
        let mut text_recognition = None;
        let mut text_recognition_error = None;
        let mut image_omitted = false;

        if opts.include_image || opts.include_text_recognition {
            let shot = self.capture_image(&entry.window)?;
            let small = shot.downscaled(opts.max_image_dimension)?;

            if opts.include_text_recognition {
                match self
                    .engine
                    .recognize_text(&small, opts.recognition_level)
                    .await
                {
                    Ok(result) => text_recognition = Some(result),
                    // OCR failure degrades the snapshot, never fails it.
                    Err(e) => {
                        warn!(error = %e, "text recognition failed");
                        text_recognition_error = Some(e.to_string());
                    }
                }
            }

            if opts.include_image {
                let data_uri = small.to_jpeg_data_uri()?;
                let elements_len = serde_json::to_string(&elements)
                    .map(|s| s.len())
                    .unwrap_or(0);
                if data_uri.len() + elements_len > opts.response_byte_ceiling {
                    debug!(
                        image_bytes = data_uri.len(),
                        elements_bytes = elements_len,
                        "dropping image to stay under response ceiling"
                    );
                    image_omitted = true;
                } else {
                    image = Some(SnapshotImage {
                        data_uri,
                        width: small.width,
                        height: small.height,
                    });
                }
            }
        }

        Ok(Snapshot {
            window_handle: window_handle.to_string(),
            timestamp: Utc::now(),
            image,
            elements,
            metadata: SnapshotMetadata {
                window_title: entry.window.title.clone(),
                width: window_bounds.width,
                height: window_bounds.height,
                element_count,
                truncated,
                image_omitted,
            },
            text_recognition,
            text_recognition_error,
        })
    }

    /// Elements-only variant: same walk, ids, and filtering, no pixels.
    pub async fn elements_only(
        &self,
        window_handle: &str,
        query: Option<&AXQuery>,
        cancel: &CancellationToken,
    ) -> Result<Snapshot, AutomationError> {
        let opts = SnapshotOptions {
            include_image: false,
            include_text_recognition: false,
            ..Default::default()
        };
        self.capture(window_handle, query, &opts, cancel).await
    }

    /// OCR a window's current pixels without building an element tree.
    pub async fn recognize_window_text(
        &self,
        window_handle: &str,
        level: RecognitionLevel,
    ) -> Result<TextRecognition, AutomationError> {
        let entry = self.registry.lookup_window(window_handle)?;
        let shot = self.capture_image(&entry.window)?;
        let small = shot.downscaled(SNAPSHOT_MAX_DIMENSION)?;
        self.engine.recognize_text(&small, level).await
    }

    fn capture_image(
        &self,
        window: &crate::platforms::WindowRef,
    ) -> Result<ScreenshotResult, AutomationError> {
        if !self.engine.screen_capture_allowed() {
            return Err(AutomationError::PermissionDenied(
                "screen-capture permission is required for window images".into(),
            ));
        }
        self.engine.capture_window(window)
    }

    #[allow(clippy::too_many_arguments)]
    fn walk<'a>(
        &'a self,
        element: UIElement,
        window_handle: &'a str,
        path: Vec<usize>,
        depth: usize,
        node_budget: &'a mut usize,
        truncated: &'a mut bool,
        visited: &'a mut usize,
        cancel: &'a CancellationToken,
        started: Instant,
    ) -> futures::future::BoxFuture<'a, Result<Option<WalkNode>, AutomationError>> {
        Box::pin(async move {
            if cancel.is_cancelled() {
                return Err(AutomationError::Cancelled {
                    elapsed_ms: started.elapsed().as_millis() as u64,
                });
            }
            if *node_budget == 0 || depth > MAX_TREE_DEPTH {
                *truncated = true;
                return Ok(None);
            }
            *node_budget -= 1;
            *visited += 1;
            if *visited % YIELD_EVERY == 0 {
                tokio::task::yield_now().await;
            }

            // A timed-out or failed attribute read yields the missing
            // attribute rather than aborting the walk.
            let ax_role = element.role().unwrap_or_else(|_| "AXUnknown".to_string());
            let title = element.title().unwrap_or(None);
            let value = element.value().unwrap_or(None);
            let identifier = element.identifier().unwrap_or(None);
            let enabled = element.is_enabled().unwrap_or(true);
            let bounds = element.bounds().unwrap_or_default();

            let id = element_id(window_handle, &path, &ax_role);
            let role = query::user_role_for(&ax_role)
                .map(str::to_string)
                .unwrap_or_else(|| ax_role.clone());

            let mut children = Vec::new();
            if depth < MAX_TREE_DEPTH {
                let child_elements = element.children().unwrap_or_default();
                for (idx, child) in child_elements.into_iter().enumerate() {
                    let mut child_path = path.clone();
                    child_path.push(idx);
                    if let Some(walked) = self
                        .walk(
                            child,
                            window_handle,
                            child_path,
                            depth + 1,
                            node_budget,
                            truncated,
                            visited,
                            cancel,
                            started,
                        )
                        .await?
                    {
                        children.push(walked);
                    }
                }
            } else {
                *truncated = true;
            }

            Ok(Some(WalkNode {
                element,
                ax_role: ax_role.clone(),
                path,
                node: UiNode {
                    id,
                    role,
                    title,
                    value,
                    identifier,
                    bounds,
                    enabled,
                    matched: false,
                    children: Vec::new(),
                },
                children,
            }))
        })
    }

    fn register_tree(&self, window_handle: &str, node: &WalkNode) -> Result<(), AutomationError> {
        self.registry.register_element(
            window_handle,
            &node.node.id,
            node.element.clone(),
            node.path.clone(),
            &node.ax_role,
        )?;
        for child in &node.children {
            self.register_tree(window_handle, child)?;
        }
        Ok(())
    }
}

/// Keep a node when it matches or any descendant does; only matching nodes
/// are marked, so retained ancestors stay context-only.
fn prune(mut node: WalkNode, query: &AXQuery) -> Option<WalkNode> {
    let self_matches = query.matches(
        &node.ax_role,
        node.node.title.as_deref(),
        node.node.value.as_deref(),
        node.node.identifier.as_deref(),
        node.node.enabled,
    );
    node.node.matched = self_matches;
    let kept_children: Vec<WalkNode> = node
        .children
        .drain(..)
        .filter_map(|c| prune(c, query))
        .collect();
    node.children = kept_children;
    if self_matches || !node.children.is_empty() {
        Some(node)
    } else {
        None
    }
}

/// Collapse the walk structure into the wire tree.
fn emit(node: WalkNode) -> UiNode {
    let mut out = node.node;
    out.children = node.children.into_iter().map(emit).collect();
    out
}
