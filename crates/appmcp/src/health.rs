//! Startup health probe for the automation stack.
//!
//! Answers three questions before the first tool call arrives: is the
//! process trusted for accessibility, can it read pixels, and does the
//! running-applications enumeration actually answer.

use std::time::Instant;

use serde::Serialize;

use crate::platforms::AccessibilityEngine;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Everything answers; all tools should work.
    Healthy,
    /// The engine answers but some capability is missing; the affected
    /// tools will be rejected per call.
    Degraded,
    /// The accessibility layer is unusable.
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct AutomationHealth {
    pub status: HealthStatus,
    pub accessibility_trusted: bool,
    pub screen_capture_allowed: bool,
    pub can_enumerate_applications: bool,
    pub application_count: usize,
    pub check_duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Probe the engine once and classify the result.
pub fn check_automation_health(engine: &dyn AccessibilityEngine) -> AutomationHealth {
    let started = Instant::now();
    let accessibility_trusted = engine.accessibility_trusted();
    let screen_capture_allowed = engine.screen_capture_allowed();

    let (can_enumerate_applications, application_count, error_message) =
        match engine.running_applications() {
            Ok(apps) => (true, apps.len(), None),
            Err(e) => (false, 0, Some(e.to_string())),
        };

    let status = if !accessibility_trusted || !can_enumerate_applications {
        HealthStatus::Unhealthy
    } else if !screen_capture_allowed || application_count == 0 {
        HealthStatus::Degraded
    } else {
        HealthStatus::Healthy
    };

    AutomationHealth {
        status,
        accessibility_trusted,
        screen_capture_allowed,
        can_enumerate_applications,
        application_count,
        check_duration_ms: started.elapsed().as_millis() as u64,
        error_message,
    }
}
