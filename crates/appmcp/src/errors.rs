//! Error taxonomy shared by every component.
//!
//! Each variant corresponds to one wire-visible error kind; `error_code()`
//! yields the identifier the dispatcher embeds in tool and resource error
//! payloads.

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AutomationError {
    /// The host OS denied the capability required for this call.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Missing required input, wrong shape, or invalid enumeration value.
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    /// No running application satisfies the selector, or its handle expired.
    #[error("application not found: {0}")]
    AppNotFound(String),

    /// No window satisfies the selector on the given application.
    #[error("window not found: {0}")]
    WindowNotFound(String),

    /// The element id is unknown, its owning window is gone, or the element
    /// has no valid geometry.
    #[error("element not accessible: {0}")]
    ElementNotAccessible(String),

    /// Point does not map to any display or to the target window.
    #[error("coordinate out of bounds: {0}")]
    CoordinateOutOfBounds(String),

    /// An OS call did not answer within its per-call budget, or a wait
    /// condition expired without being satisfied.
    #[error("timed out: {0}")]
    Timeout(String),

    /// The caller cancelled the operation mid-flight.
    #[error("cancelled after {elapsed_ms} ms")]
    Cancelled { elapsed_ms: u64 },

    /// Any other OS-reported failure, carrying the OS message.
    #[error("system error: {0}")]
    SystemError(String),

    /// A resource URI is unknown.
    #[error("resource unavailable: {0}")]
    ResourceUnavailable(String),
}

impl AutomationError {
    /// Wire identifier for this error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            AutomationError::PermissionDenied(_) => "PERMISSION_DENIED",
            AutomationError::InvalidParams(_) => "INVALID_PARAMS",
            AutomationError::AppNotFound(_) => "APP_NOT_FOUND",
            AutomationError::WindowNotFound(_) => "WINDOW_NOT_FOUND",
            AutomationError::ElementNotAccessible(_) => "ELEMENT_NOT_ACCESSIBLE",
            AutomationError::CoordinateOutOfBounds(_) => "COORDINATE_OUT_OF_BOUNDS",
            AutomationError::Timeout(_) | AutomationError::Cancelled { .. } => "TIMEOUT",
            AutomationError::SystemError(_) => "SYSTEM_ERROR",
            AutomationError::ResourceUnavailable(_) => "RESOURCE_UNAVAILABLE",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_wire_identifiers() {
        assert_eq!(
            AutomationError::AppNotFound("x".into()).error_code(),
            "APP_NOT_FOUND"
        );
        assert_eq!(
            AutomationError::ElementNotAccessible("x".into()).error_code(),
            "ELEMENT_NOT_ACCESSIBLE"
        );
        assert_eq!(
            AutomationError::Cancelled { elapsed_ms: 10 }.error_code(),
            "TIMEOUT"
        );
    }

    #[test]
    fn display_carries_context() {
        let err = AutomationError::WindowNotFound("index 3 out of range".into());
        assert!(err.to_string().contains("index 3"));
    }
}
