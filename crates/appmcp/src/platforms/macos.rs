//! macOS engine: AX accessibility trees, CoreGraphics capture and event
//! synthesis, NSWorkspace application enumeration.
//!
//! AX objects are CoreFoundation types without Send/Sync markers; the AX
//! messaging layer itself is thread-safe, and every call made here is
//! serialized upstream by the registry and synthesizer locks, so the Send
//! impls below are sound in practice.

#![allow(clippy::arc_with_non_send_sync)]

use std::ffi::CString;
use std::os::raw::{c_char, c_void};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use accessibility::AXUIElement;
use accessibility_sys::{
    kAXErrorSuccess, AXIsProcessTrusted, AXUIElementCopyAttributeValue,
    AXUIElementPerformAction, AXUIElementRef, AXUIElementSetAttributeValue,
    AXUIElementSetMessagingTimeout, AXValueGetValue, AXValueRef,
};
use async_trait::async_trait;
use core_foundation::array::{CFArray, CFArrayRef};
use core_foundation::base::{CFHash, CFType, CFTypeRef, TCFType};
use core_foundation::boolean::CFBoolean;
use core_foundation::string::CFString;
use core_graphics::display::CGDisplay;
use core_graphics::event::{
    CGEvent, CGEventTapLocation, CGEventType, CGMouseButton, EventField, ScrollEventUnit,
};
use core_graphics::event_source::{CGEventSource, CGEventSourceStateID};
use core_graphics::geometry::{CGPoint, CGRect, CGSize};
use core_graphics::window::{kCGNullWindowID, kCGWindowImageDefault, kCGWindowListOptionOnScreenOnly};
use objc::runtime::{Object, BOOL, NO};
use objc::{class, msg_send, sel, sel_impl};
use tracing::{debug, warn};

use crate::errors::AutomationError;
use crate::geometry::{DisplayInfo, Point, Rect};
use crate::platforms::{
    AccessibilityEngine, AppRef, InstalledApp, KeyInput, MouseButton, MouseEventKind, UIElement,
    UIElementImpl, WindowRef,
};
use crate::screenshot::ScreenshotResult;
use crate::snapshot::{RecognitionLevel, TextBlock, TextRecognition};

/// Per-call budget for AX attribute reads, seconds.
const AX_MESSAGING_TIMEOUT: f32 = 0.25;

/// AXValue payload type tags (AXValue.h).
const AX_VALUE_TYPE_CGPOINT: u32 = 1;
const AX_VALUE_TYPE_CGSIZE: u32 = 2;

const ATTR_ROLE: &str = "AXRole";
const ATTR_TITLE: &str = "AXTitle";
const ATTR_VALUE: &str = "AXValue";
const ATTR_IDENTIFIER: &str = "AXIdentifier";
const ATTR_ENABLED: &str = "AXEnabled";
const ATTR_CHILDREN: &str = "AXChildren";
const ATTR_POSITION: &str = "AXPosition";
const ATTR_SIZE: &str = "AXSize";
const ATTR_WINDOWS: &str = "AXWindows";
const ATTR_MAIN: &str = "AXMain";
const ATTR_MINIMIZED: &str = "AXMinimized";
const ACTION_PRESS: &str = "AXPress";

/// Read one attribute as an owned CFType, or None on any AX error.
fn copy_attribute(element: &AXUIElement, name: &str) -> Option<CFType> {
    let attr = CFString::new(name);
    let mut value: CFTypeRef = std::ptr::null();
    let err = unsafe {
        AXUIElementCopyAttributeValue(
            element.as_concrete_TypeRef(),
            attr.as_concrete_TypeRef(),
            &mut value,
        )
    };
    if err != kAXErrorSuccess || value.is_null() {
        return None;
    }
    Some(unsafe { CFType::wrap_under_create_rule(value) })
}

fn string_attribute(element: &AXUIElement, name: &str) -> Option<String> {
    copy_attribute(element, name)?
        .downcast::<CFString>()
        .map(|s| s.to_string())
}

fn bool_attribute(element: &AXUIElement, name: &str) -> Option<bool> {
    copy_attribute(element, name)?
        .downcast::<CFBoolean>()
        .map(|b| b.into())
}

fn point_attribute(element: &AXUIElement, name: &str) -> Option<CGPoint> {
    let value = copy_attribute(element, name)?;
    let mut point = CGPoint::new(0.0, 0.0);
    let ok = unsafe {
        AXValueGetValue(
            value.as_CFTypeRef() as AXValueRef,
            AX_VALUE_TYPE_CGPOINT,
            &mut point as *mut CGPoint as *mut c_void,
        )
    };
    ok.then_some(point)
}

fn size_attribute(element: &AXUIElement, name: &str) -> Option<CGSize> {
    let value = copy_attribute(element, name)?;
    let mut size = CGSize::new(0.0, 0.0);
    let ok = unsafe {
        AXValueGetValue(
            value.as_CFTypeRef() as AXValueRef,
            AX_VALUE_TYPE_CGSIZE,
            &mut size as *mut CGSize as *mut c_void,
        )
    };
    ok.then_some(size)
}

fn element_array_attribute(element: &AXUIElement, name: &str) -> Vec<AXUIElement> {
    let Some(value) = copy_attribute(element, name) else {
        return Vec::new();
    };
    let array: CFArray<CFType> =
        unsafe { CFArray::wrap_under_get_rule(value.as_CFTypeRef() as CFArrayRef) };
    array
        .iter()
        .map(|item| unsafe {
            AXUIElement::wrap_under_get_rule(item.as_CFTypeRef() as AXUIElementRef)
        })
        .collect()
}

/// AX geometry is already global: y-down, origin at the primary display's
/// top-left.
fn ax_bounds(element: &AXUIElement) -> Option<Rect> {
    let position = point_attribute(element, ATTR_POSITION)?;
    let size = size_attribute(element, ATTR_SIZE)?;
    Some(Rect::new(position.x, position.y, size.width, size.height))
}

/// One AX accessibility object.
struct MacOSElement {
    element: AXUIElement,
}

// See module docs for why these are sound here.
unsafe impl Send for MacOSElement {}
unsafe impl Sync for MacOSElement {}

impl MacOSElement {
    fn new(element: AXUIElement) -> UIElement {
        UIElement::new(Arc::new(Self { element }))
    }
}

impl UIElementImpl for MacOSElement {
    fn role(&self) -> Result<String, AutomationError> {
        string_attribute(&self.element, ATTR_ROLE)
            .ok_or_else(|| AutomationError::SystemError("AXRole read failed".into()))
    }

    fn title(&self) -> Result<Option<String>, AutomationError> {
        Ok(string_attribute(&self.element, ATTR_TITLE).filter(|t| !t.is_empty()))
    }

    fn value(&self) -> Result<Option<String>, AutomationError> {
        let Some(value) = copy_attribute(&self.element, ATTR_VALUE) else {
            return Ok(None);
        };
        if let Some(s) = value.downcast::<CFString>() {
            return Ok(Some(s.to_string()));
        }
        if let Some(b) = value.downcast::<CFBoolean>() {
            let b: bool = b.into();
            return Ok(Some(b.to_string()));
        }
        if let Some(n) = value.downcast::<core_foundation::number::CFNumber>() {
            if let Some(v) = n.to_f64() {
                return Ok(Some(v.to_string()));
            }
        }
        Ok(None)
    }

    fn identifier(&self) -> Result<Option<String>, AutomationError> {
        Ok(string_attribute(&self.element, ATTR_IDENTIFIER).filter(|s| !s.is_empty()))
    }

    fn is_enabled(&self) -> Result<bool, AutomationError> {
        Ok(bool_attribute(&self.element, ATTR_ENABLED).unwrap_or(true))
    }

    fn bounds(&self) -> Result<Rect, AutomationError> {
        ax_bounds(&self.element)
            .ok_or_else(|| AutomationError::SystemError("AXPosition/AXSize read failed".into()))
    }

    fn children(&self) -> Result<Vec<UIElement>, AutomationError> {
        Ok(element_array_attribute(&self.element, ATTR_CHILDREN)
            .into_iter()
            .map(MacOSElement::new)
            .collect())
    }

    fn press(&self) -> Result<bool, AutomationError> {
        let action = CFString::new(ACTION_PRESS);
        let err = unsafe {
            AXUIElementPerformAction(
                self.element.as_concrete_TypeRef(),
                action.as_concrete_TypeRef(),
            )
        };
        Ok(err == kAXErrorSuccess)
    }

    fn set_value(&self, value: &str) -> Result<(), AutomationError> {
        let attr = CFString::new(ATTR_VALUE);
        let payload = CFString::new(value);
        let err = unsafe {
            AXUIElementSetAttributeValue(
                self.element.as_concrete_TypeRef(),
                attr.as_concrete_TypeRef(),
                payload.as_CFTypeRef(),
            )
        };
        if err != kAXErrorSuccess {
            return Err(AutomationError::ElementNotAccessible(format!(
                "AXValue write rejected (AXError {err})"
            )));
        }
        Ok(())
    }

    fn is_alive(&self) -> bool {
        string_attribute(&self.element, ATTR_ROLE).is_some()
    }
}

unsafe fn nsstring_to_string(ns: *mut Object) -> Option<String> {
    if ns.is_null() {
        return None;
    }
    let utf8: *const c_char = msg_send![ns, UTF8String];
    if utf8.is_null() {
        return None;
    }
    Some(
        std::ffi::CStr::from_ptr(utf8)
            .to_string_lossy()
            .into_owned(),
    )
}

pub struct MacOSEngine;

impl MacOSEngine {
    pub fn new() -> Result<Self, AutomationError> {
        let engine = Self;
        if !engine.accessibility_trusted() {
            warn!("process is not trusted for accessibility; snapshots and input will fail");
        }
        Ok(engine)
    }

    fn app_element(pid: i32) -> AXUIElement {
        let element = AXUIElement::application(pid);
        unsafe {
            AXUIElementSetMessagingTimeout(element.as_concrete_TypeRef(), AX_MESSAGING_TIMEOUT);
        }
        element
    }

    fn event_source(&self) -> Result<CGEventSource, AutomationError> {
        CGEventSource::new(CGEventSourceStateID::HIDSystemState)
            .map_err(|_| AutomationError::SystemError("CGEventSource creation failed".into()))
    }
}

#[async_trait]
impl AccessibilityEngine for MacOSEngine {
    fn accessibility_trusted(&self) -> bool {
        unsafe { AXIsProcessTrusted() }
    }

    fn screen_capture_allowed(&self) -> bool {
        core_graphics::access::ScreenCaptureAccess::default().preflight()
    }

    fn installed_applications(&self) -> Result<Vec<InstalledApp>, AutomationError> {
        let mut roots: Vec<PathBuf> = vec!["/Applications".into(), "/System/Applications".into()];
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join("Applications"));
        }
        let mut apps = Vec::new();
        for dir in roots {
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) != Some("app") {
                    continue;
                }
                let name = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or_default()
                    .to_string();
                let bundle_id = bundle_id_for_path(&path);
                apps.push(InstalledApp { name, bundle_id });
            }
        }
        apps.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(apps)
    }

    fn running_applications(&self) -> Result<Vec<AppRef>, AutomationError> {
        let mut apps = Vec::new();
        unsafe {
            let workspace: *mut Object = msg_send![class!(NSWorkspace), sharedWorkspace];
            let running: *mut Object = msg_send![workspace, runningApplications];
            let count: usize = msg_send![running, count];
            for i in 0..count {
                let app: *mut Object = msg_send![running, objectAtIndex: i];
                // Only regular-activation processes own UI.
                let policy: i64 = msg_send![app, activationPolicy];
                if policy != 0 {
                    continue;
                }
                let pid: i32 = msg_send![app, processIdentifier];
                let active: BOOL = msg_send![app, isActive];
                let active = active != NO;
                let name_obj: *mut Object = msg_send![app, localizedName];
                let bundle_obj: *mut Object = msg_send![app, bundleIdentifier];
                let name = nsstring_to_string(name_obj).unwrap_or_else(|| format!("pid {pid}"));
                apps.push(AppRef {
                    pid,
                    name,
                    bundle_id: nsstring_to_string(bundle_obj),
                    is_active: active,
                    element: MacOSElement::new(Self::app_element(pid)),
                });
            }
        }
        Ok(apps)
    }

    fn application_by_pid(&self, pid: i32) -> Result<AppRef, AutomationError> {
        self.running_applications()?
            .into_iter()
            .find(|app| app.pid == pid)
            .ok_or_else(|| AutomationError::AppNotFound(format!("no UI process with pid {pid}")))
    }

    fn windows_for_app(&self, app: &AppRef) -> Result<Vec<WindowRef>, AutomationError> {
        let root = Self::app_element(app.pid);
        let windows = element_array_attribute(&root, ATTR_WINDOWS);
        Ok(windows
            .into_iter()
            .filter_map(|w| {
                let bounds = ax_bounds(&w)?;
                let title = string_attribute(&w, ATTR_TITLE).filter(|t| !t.is_empty());
                let is_main = bool_attribute(&w, ATTR_MAIN).unwrap_or(false);
                let minimized = bool_attribute(&w, ATTR_MINIMIZED).unwrap_or(false);
                let os_key = unsafe { CFHash(w.as_CFTypeRef()) as u64 };
                Some(WindowRef {
                    title,
                    bounds,
                    is_main,
                    is_visible: !minimized,
                    os_key,
                    element: MacOSElement::new(w),
                })
            })
            .collect())
    }

    fn displays(&self) -> Result<Vec<DisplayInfo>, AutomationError> {
        let ids = CGDisplay::active_displays()
            .map_err(|e| AutomationError::SystemError(format!("display enumeration failed: {e}")))?;
        let main_id = CGDisplay::main().id;
        Ok(ids
            .into_iter()
            .map(|id| {
                let display = CGDisplay::new(id);
                let bounds = display.bounds();
                let scale = if bounds.size.width > 0.0 {
                    display.pixels_wide() as f64 / bounds.size.width
                } else {
                    1.0
                };
                DisplayInfo {
                    id,
                    bounds: Rect::new(
                        bounds.origin.x,
                        bounds.origin.y,
                        bounds.size.width,
                        bounds.size.height,
                    ),
                    is_primary: id == main_id,
                    scale_factor: scale,
                }
            })
            .collect())
    }

    fn capture_window(&self, window: &WindowRef) -> Result<ScreenshotResult, AutomationError> {
        let started = Instant::now();
        let rect = CGRect::new(
            &CGPoint::new(window.bounds.x, window.bounds.y),
            &CGSize::new(window.bounds.width, window.bounds.height),
        );
        let image = CGDisplay::screenshot(
            rect,
            kCGWindowListOptionOnScreenOnly,
            kCGNullWindowID,
            kCGWindowImageDefault,
        )
        .ok_or_else(|| {
            AutomationError::SystemError("CGWindowListCreateImage returned no image".into())
        })?;

        let width = image.width() as u32;
        let height = image.height() as u32;
        let stride = image.bytes_per_row();
        let data = image.data();
        let bytes = data.bytes();

        // CoreGraphics hands back BGRA rows with padding; repack as tight RGBA.
        let mut rgba = Vec::with_capacity((width * height * 4) as usize);
        for row in 0..height as usize {
            let offset = row * stride;
            let row_bytes = &bytes[offset..offset + (width as usize) * 4];
            for px in row_bytes.chunks_exact(4) {
                rgba.extend_from_slice(&[px[2], px[1], px[0], px[3]]);
            }
        }
        debug!(
            width,
            height,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "captured window raster"
        );
        Ok(ScreenshotResult {
            image_data: rgba,
            width,
            height,
        })
    }

    async fn recognize_text(
        &self,
        image: &ScreenshotResult,
        _level: RecognitionLevel,
    ) -> Result<TextRecognition, AutomationError> {
        use uni_ocr::{OcrEngine, OcrProvider};

        let started = Instant::now();
        let buffer = image::ImageBuffer::<image::Rgba<u8>, _>::from_raw(
            image.width,
            image.height,
            image.image_data.clone(),
        )
        .ok_or_else(|| AutomationError::SystemError("screenshot buffer is inconsistent".into()))?;
        let dynamic = image::DynamicImage::ImageRgba8(buffer);

        let engine = OcrEngine::new(OcrProvider::Auto)
            .map_err(|e| AutomationError::SystemError(format!("OCR engine creation failed: {e}")))?;
        let (text, _language, _confidence) = engine
            .recognize_image(&dynamic)
            .await
            .map_err(|e| AutomationError::SystemError(format!("OCR recognition failed: {e}")))?;

        let image_bounds = Rect::new(0.0, 0.0, image.width as f64, image.height as f64);
        // The provider reports text only; emit one block per line with the
        // image bounds as the enclosing box.
        let blocks: Vec<TextBlock> = text
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|line| TextBlock {
                text: line.to_string(),
                bounds: image_bounds,
                confidence: 1.0,
            })
            .collect();
        Ok(TextRecognition {
            full_text: text,
            blocks,
            processing_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    fn post_mouse(
        &self,
        kind: MouseEventKind,
        button: MouseButton,
        at: Point,
        click_state: i64,
    ) -> Result<(), AutomationError> {
        let source = self.event_source()?;
        let event_type = match (kind, button) {
            (MouseEventKind::Down, MouseButton::Left) => CGEventType::LeftMouseDown,
            (MouseEventKind::Up, MouseButton::Left) => CGEventType::LeftMouseUp,
            (MouseEventKind::Dragged, MouseButton::Left) => CGEventType::LeftMouseDragged,
            (MouseEventKind::Down, MouseButton::Right) => CGEventType::RightMouseDown,
            (MouseEventKind::Up, MouseButton::Right) => CGEventType::RightMouseUp,
            (MouseEventKind::Dragged, MouseButton::Right) => CGEventType::RightMouseDragged,
            (MouseEventKind::Down, MouseButton::Center) => CGEventType::OtherMouseDown,
            (MouseEventKind::Up, MouseButton::Center) => CGEventType::OtherMouseUp,
            (MouseEventKind::Dragged, MouseButton::Center) => CGEventType::OtherMouseDragged,
            (MouseEventKind::Moved, _) => CGEventType::MouseMoved,
        };
        let cg_button = match button {
            MouseButton::Left => CGMouseButton::Left,
            MouseButton::Right => CGMouseButton::Right,
            MouseButton::Center => CGMouseButton::Center,
        };
        let event =
            CGEvent::new_mouse_event(source, event_type, CGPoint::new(at.x, at.y), cg_button)
                .map_err(|_| {
                    AutomationError::SystemError("mouse event creation failed".into())
                })?;
        if click_state > 1 {
            event.set_integer_value_field(EventField::MOUSE_EVENT_CLICK_STATE, click_state);
        }
        event.post(CGEventTapLocation::HID);
        Ok(())
    }

    fn post_key(&self, key: KeyInput, down: bool) -> Result<(), AutomationError> {
        let source = self.event_source()?;
        match key {
            KeyInput::Virtual(code) => {
                let event = CGEvent::new_keyboard_event(source, code, down).map_err(|_| {
                    AutomationError::SystemError("keyboard event creation failed".into())
                })?;
                event.post(CGEventTapLocation::HID);
            }
            KeyInput::Unicode(ch) => {
                let event = CGEvent::new_keyboard_event(source, 0, down).map_err(|_| {
                    AutomationError::SystemError("keyboard event creation failed".into())
                })?;
                let mut buf = [0u16; 2];
                let units = ch.encode_utf16(&mut buf);
                event.set_string_from_utf16_unchecked(units);
                event.post(CGEventTapLocation::HID);
            }
        }
        Ok(())
    }

    fn post_scroll(
        &self,
        at: Point,
        delta_x: i32,
        delta_y: i32,
    ) -> Result<(), AutomationError> {
        let source = self.event_source()?;
        // Wheel axis 1 is vertical, axis 2 horizontal.
        let event = CGEvent::new_scroll_event(source, ScrollEventUnit::PIXEL, 2, delta_y, delta_x, 0)
            .map_err(|_| AutomationError::SystemError("scroll event creation failed".into()))?;
        let move_source = self.event_source()?;
        // Position the pointer so the scroll lands on the target element.
        if let Ok(move_event) = CGEvent::new_mouse_event(
            move_source,
            CGEventType::MouseMoved,
            CGPoint::new(at.x, at.y),
            CGMouseButton::Left,
        ) {
            move_event.post(CGEventTapLocation::HID);
        }
        event.post(CGEventTapLocation::HID);
        Ok(())
    }
}

fn bundle_id_for_path(path: &std::path::Path) -> Option<String> {
    let cstr = CString::new(path.to_str()?).ok()?;
    unsafe {
        let ns_path: *mut Object = msg_send![class!(NSString), stringWithUTF8String: cstr.as_ptr()];
        if ns_path.is_null() {
            return None;
        }
        let bundle: *mut Object = msg_send![class!(NSBundle), bundleWithPath: ns_path];
        if bundle.is_null() {
            return None;
        }
        let identifier: *mut Object = msg_send![bundle, bundleIdentifier];
        nsstring_to_string(identifier)
    }
}
