//! Deterministic in-memory engine.
//!
//! Backs every test that exercises the pipeline without a live desktop, and
//! records posted events so assertions can inspect exactly what would have
//! reached the OS.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::errors::AutomationError;
use crate::geometry::{DisplayInfo, Point, Rect};
use crate::platforms::{
    AccessibilityEngine, AppRef, InstalledApp, KeyInput, MouseButton, MouseEventKind, UIElement,
    UIElementImpl, WindowRef,
};
use crate::screenshot::ScreenshotResult;
use crate::snapshot::{RecognitionLevel, TextRecognition};

/// One recorded low-level event.
#[derive(Debug, Clone, PartialEq)]
pub enum SyntheticEvent {
    Mouse {
        kind: MouseEventKind,
        button: MouseButton,
        at: Point,
        click_state: i64,
    },
    Key {
        key: KeyInput,
        down: bool,
    },
    Scroll {
        at: Point,
        delta_x: i32,
        delta_y: i32,
    },
}

#[derive(Debug)]
struct MockNodeState {
    role: String,
    title: Option<String>,
    value: Option<String>,
    identifier: Option<String>,
    enabled: bool,
    bounds: Rect,
    alive: bool,
    supports_press: bool,
    press_count: u32,
    children: Vec<MockNodeHandle>,
}

/// Shared mutable node of the fake accessibility tree.
#[derive(Clone, Debug)]
pub struct MockNodeHandle(Arc<Mutex<MockNodeState>>);

impl MockNodeHandle {
    pub fn new(role: &str) -> Self {
        Self(Arc::new(Mutex::new(MockNodeState {
            role: role.to_string(),
            title: None,
            value: None,
            identifier: None,
            enabled: true,
            bounds: Rect::default(),
            alive: true,
            supports_press: false,
            press_count: 0,
            children: Vec::new(),
        })))
    }

    pub fn title(self, title: &str) -> Self {
        self.0.lock().unwrap().title = Some(title.to_string());
        self
    }

    pub fn value(self, value: &str) -> Self {
        self.0.lock().unwrap().value = Some(value.to_string());
        self
    }

    pub fn identifier(self, identifier: &str) -> Self {
        self.0.lock().unwrap().identifier = Some(identifier.to_string());
        self
    }

    pub fn bounds(self, x: f64, y: f64, w: f64, h: f64) -> Self {
        self.0.lock().unwrap().bounds = Rect::new(x, y, w, h);
        self
    }

    pub fn disabled(self) -> Self {
        self.0.lock().unwrap().enabled = false;
        self
    }

    pub fn pressable(self) -> Self {
        self.0.lock().unwrap().supports_press = true;
        self
    }

    pub fn child(self, child: MockNodeHandle) -> Self {
        self.0.lock().unwrap().children.push(child);
        self
    }

    pub fn kill(&self) {
        let mut state = self.0.lock().unwrap();
        state.alive = false;
        for child in &state.children {
            child.kill();
        }
    }

    pub fn press_count(&self) -> u32 {
        self.0.lock().unwrap().press_count
    }

    pub fn current_value(&self) -> Option<String> {
        self.0.lock().unwrap().value.clone()
    }

    pub fn set_title(&self, title: &str) {
        self.0.lock().unwrap().title = Some(title.to_string());
    }

    pub fn as_element(&self) -> UIElement {
        UIElement::new(Arc::new(MockElement(self.clone())))
    }
}

struct MockElement(MockNodeHandle);

impl MockElement {
    fn state(&self) -> Result<std::sync::MutexGuard<'_, MockNodeState>, AutomationError> {
        let guard = self.0 .0.lock().unwrap();
        if !guard.alive {
            return Err(AutomationError::SystemError(
                "accessibility object is gone".into(),
            ));
        }
        Ok(guard)
    }
}

impl UIElementImpl for MockElement {
    fn role(&self) -> Result<String, AutomationError> {
        Ok(self.state()?.role.clone())
    }

    fn title(&self) -> Result<Option<String>, AutomationError> {
        Ok(self.state()?.title.clone())
    }

    fn value(&self) -> Result<Option<String>, AutomationError> {
        Ok(self.state()?.value.clone())
    }

    fn identifier(&self) -> Result<Option<String>, AutomationError> {
        Ok(self.state()?.identifier.clone())
    }

    fn is_enabled(&self) -> Result<bool, AutomationError> {
        Ok(self.state()?.enabled)
    }

    fn bounds(&self) -> Result<Rect, AutomationError> {
        Ok(self.state()?.bounds)
    }

    fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        Ok(self
            .state()?
            .children
            .iter()
            .map(MockNodeHandle::as_element)
            .collect())
    }

    fn press(&self) -> Result<bool, AutomationError> {
        let mut state = self.state()?;
        if !state.supports_press {
            return Ok(false);
        }
        state.press_count += 1;
        Ok(true)
    }

    fn set_value(&self, value: &str) -> Result<(), AutomationError> {
        self.state()?.value = Some(value.to_string());
        Ok(())
    }

    fn is_alive(&self) -> bool {
        self.0 .0.lock().unwrap().alive
    }
}

struct MockWindowState {
    os_key: u64,
    title: Option<String>,
    bounds: Rect,
    is_main: bool,
    is_visible: bool,
    root: MockNodeHandle,
    /// Bumped to change the captured raster, driving ui_change waits.
    paint_seed: u8,
}

struct MockAppState {
    pid: i32,
    name: String,
    bundle_id: Option<String>,
    is_active: bool,
    root: MockNodeHandle,
    windows: Vec<Arc<Mutex<MockWindowState>>>,
}

#[derive(Default)]
struct MockState {
    apps: Vec<MockAppState>,
    displays: Vec<DisplayInfo>,
    events: Vec<SyntheticEvent>,
    ocr: Option<TextRecognition>,
    installed: Vec<InstalledApp>,
}

/// Handle used by tests to mutate a mock window after setup.
#[derive(Clone)]
pub struct MockWindowHandle {
    state: Arc<Mutex<MockWindowState>>,
}

impl MockWindowHandle {
    pub fn root(&self) -> MockNodeHandle {
        self.state.lock().unwrap().root.clone()
    }

    pub fn close(&self) {
        let state = self.state.lock().unwrap();
        state.root.kill();
    }

    pub fn repaint(&self) {
        let mut state = self.state.lock().unwrap();
        state.paint_seed = state.paint_seed.wrapping_add(1);
    }

    pub fn retitle(&self, title: &str) {
        let mut state = self.state.lock().unwrap();
        state.title = Some(title.to_string());
        state.root.set_title(title);
    }
}

/// In-memory engine with a builder-style setup API.
pub struct MockEngine {
    state: Arc<Mutex<MockState>>,
    trusted: AtomicBool,
    capture_allowed: AtomicBool,
    next_os_key: AtomicU64,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    pub fn new() -> Self {
        let engine = Self {
            state: Arc::new(Mutex::new(MockState::default())),
            trusted: AtomicBool::new(true),
            capture_allowed: AtomicBool::new(true),
            next_os_key: AtomicU64::new(1),
        };
        engine.state.lock().unwrap().displays.push(DisplayInfo {
            id: 1,
            bounds: Rect::new(0.0, 0.0, 1920.0, 1080.0),
            is_primary: true,
            scale_factor: 2.0,
        });
        engine
    }

    pub fn set_trusted(&self, trusted: bool) {
        self.trusted.store(trusted, Ordering::SeqCst);
    }

    pub fn set_capture_allowed(&self, allowed: bool) {
        self.capture_allowed.store(allowed, Ordering::SeqCst);
    }

    pub fn add_display(&self, display: DisplayInfo) {
        self.state.lock().unwrap().displays.push(display);
    }

    pub fn add_installed(&self, name: &str, bundle_id: Option<&str>) {
        self.state.lock().unwrap().installed.push(InstalledApp {
            name: name.to_string(),
            bundle_id: bundle_id.map(str::to_string),
        });
    }

    pub fn set_ocr_result(&self, result: TextRecognition) {
        self.state.lock().unwrap().ocr = Some(result);
    }

    pub fn add_app(&self, pid: i32, name: &str, bundle_id: Option<&str>, is_active: bool) {
        let root = MockNodeHandle::new("AXApplication").title(name);
        self.state.lock().unwrap().apps.push(MockAppState {
            pid,
            name: name.to_string(),
            bundle_id: bundle_id.map(str::to_string),
            is_active,
            root,
            windows: Vec::new(),
        });
    }

    /// Attach a window (with its element tree root) to a running app.
    pub fn add_window(
        &self,
        pid: i32,
        title: &str,
        bounds: Rect,
        is_main: bool,
        root: MockNodeHandle,
    ) -> MockWindowHandle {
        {
            let mut node = root.0.lock().unwrap();
            node.role = "AXWindow".to_string();
            node.title = Some(title.to_string());
            node.bounds = bounds;
        }
        let os_key = self.next_os_key.fetch_add(1, Ordering::SeqCst);
        let window = Arc::new(Mutex::new(MockWindowState {
            os_key,
            title: Some(title.to_string()),
            bounds,
            is_main,
            is_visible: true,
            root,
            paint_seed: 0,
        }));
        let handle = MockWindowHandle {
            state: window.clone(),
        };
        let mut state = self.state.lock().unwrap();
        let app = state
            .apps
            .iter_mut()
            .find(|a| a.pid == pid)
            .expect("add_window: unknown pid");
        app.windows.push(window);
        handle
    }

    pub fn kill_app(&self, pid: i32) {
        let state = self.state.lock().unwrap();
        if let Some(app) = state.apps.iter().find(|a| a.pid == pid) {
            app.root.kill();
            for window in &app.windows {
                window.lock().unwrap().root.kill();
            }
        }
    }

    pub fn recorded_events(&self) -> Vec<SyntheticEvent> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn clear_events(&self) {
        self.state.lock().unwrap().events.clear();
    }

    fn app_ref(app: &MockAppState) -> AppRef {
        AppRef {
            pid: app.pid,
            name: app.name.clone(),
            bundle_id: app.bundle_id.clone(),
            is_active: app.is_active,
            element: app.root.as_element(),
        }
    }
}

#[async_trait]
impl AccessibilityEngine for MockEngine {
    fn accessibility_trusted(&self) -> bool {
        self.trusted.load(Ordering::SeqCst)
    }

    fn screen_capture_allowed(&self) -> bool {
        self.capture_allowed.load(Ordering::SeqCst)
    }

    fn installed_applications(&self) -> Result<Vec<InstalledApp>, AutomationError> {
        Ok(self.state.lock().unwrap().installed.clone())
    }

    fn running_applications(&self) -> Result<Vec<AppRef>, AutomationError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .apps
            .iter()
            .map(Self::app_ref)
            .collect())
    }

    fn application_by_pid(&self, pid: i32) -> Result<AppRef, AutomationError> {
        self.state
            .lock()
            .unwrap()
            .apps
            .iter()
            .find(|a| a.pid == pid)
            .map(Self::app_ref)
            .ok_or_else(|| AutomationError::AppNotFound(format!("no process with pid {pid}")))
    }

    fn windows_for_app(&self, app: &AppRef) -> Result<Vec<WindowRef>, AutomationError> {
        let state = self.state.lock().unwrap();
        let found = state
            .apps
            .iter()
            .find(|a| a.pid == app.pid)
            .ok_or_else(|| AutomationError::AppNotFound(format!("no process with pid {}", app.pid)))?;
        Ok(found
            .windows
            .iter()
            .filter(|w| {
                let w = w.lock().unwrap();
                w.is_visible && w.root.0.lock().unwrap().alive
            })
            .map(|w| {
                let w = w.lock().unwrap();
                WindowRef {
                    title: w.title.clone(),
                    bounds: w.bounds,
                    is_main: w.is_main,
                    is_visible: w.is_visible,
                    os_key: w.os_key,
                    element: w.root.as_element(),
                }
            })
            .collect())
    }

    fn displays(&self) -> Result<Vec<DisplayInfo>, AutomationError> {
        Ok(self.state.lock().unwrap().displays.clone())
    }

    fn capture_window(&self, window: &WindowRef) -> Result<ScreenshotResult, AutomationError> {
        let state = self.state.lock().unwrap();
        let seed = state
            .apps
            .iter()
            .flat_map(|a| a.windows.iter())
            .find(|w| w.lock().unwrap().os_key == window.os_key)
            .map(|w| w.lock().unwrap().paint_seed)
            .unwrap_or(0);
        let width = (window.bounds.width.max(1.0)) as u32;
        let height = (window.bounds.height.max(1.0)) as u32;
        Ok(ScreenshotResult {
            image_data: [seed, seed.wrapping_add(64), seed.wrapping_add(128), 255]
                .iter()
                .copied()
                .cycle()
                .take((width * height * 4) as usize)
                .collect(),
            width,
            height,
        })
    }

    async fn recognize_text(
        &self,
        _image: &ScreenshotResult,
        _level: RecognitionLevel,
    ) -> Result<TextRecognition, AutomationError> {
        self.state
            .lock()
            .unwrap()
            .ocr
            .clone()
            .ok_or_else(|| AutomationError::SystemError("no OCR result configured".into()))
    }

    fn post_mouse(
        &self,
        kind: MouseEventKind,
        button: MouseButton,
        at: Point,
        click_state: i64,
    ) -> Result<(), AutomationError> {
        self.state.lock().unwrap().events.push(SyntheticEvent::Mouse {
            kind,
            button,
            at,
            click_state,
        });
        Ok(())
    }

    fn post_key(&self, key: KeyInput, down: bool) -> Result<(), AutomationError> {
        self.state
            .lock()
            .unwrap()
            .events
            .push(SyntheticEvent::Key { key, down });
        Ok(())
    }

    fn post_scroll(
        &self,
        at: Point,
        delta_x: i32,
        delta_y: i32,
    ) -> Result<(), AutomationError> {
        self.state.lock().unwrap().events.push(SyntheticEvent::Scroll {
            at,
            delta_x,
            delta_y,
        });
        Ok(())
    }
}
