//! Snapshot filter queries and the user-role ↔ accessibility-role table.
//!
//! Controllers address element kinds by friendly names ("button",
//! "textfield"); the accessibility layer speaks `AX*` role strings. The
//! mapping is a data table so it can be iterated and round-tripped in tests.
//! The first AX role listed for a user role is its canonical spelling and is
//! unique across the table.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::errors::AutomationError;

/// user role → underlying accessibility roles.
pub const ROLE_TABLE: &[(&str, &[&str])] = &[
    ("button", &["AXButton"]),
    ("textfield", &["AXTextField", "AXTextArea"]),
    ("text", &["AXStaticText"]),
    ("image", &["AXImage"]),
    ("menu", &["AXMenu"]),
    ("list", &["AXList"]),
    ("table", &["AXTable"]),
    ("checkbox", &["AXCheckBox"]),
    ("radio", &["AXRadioButton"]),
    ("slider", &["AXSlider"]),
    ("link", &["AXLink"]),
    ("group", &["AXGroup"]),
    ("window", &["AXWindow"]),
    ("toolbar", &["AXToolbar"]),
    ("menubar", &["AXMenuBar"]),
    ("menuitem", &["AXMenuItem", "AXMenuBarItem"]),
    ("popupbutton", &["AXPopUpButton"]),
    ("searchfield", &["AXSearchField", "AXTextField"]),
    ("scrollarea", &["AXScrollArea"]),
    ("tab", &["AXTabButton", "AXRadioButton"]),
    ("tabgroup", &["AXTabGroup"]),
    ("splitgroup", &["AXSplitGroup"]),
    ("outline", &["AXOutline"]),
    ("browser", &["AXBrowser"]),
    ("application", &["AXApplication"]),
    ("combobox", &["AXComboBox"]),
    ("progressindicator", &["AXProgressIndicator"]),
    ("disclosure", &["AXDisclosureTriangle"]),
    ("sheet", &["AXSheet"]),
    ("drawer", &["AXDrawer"]),
    ("helpbutton", &["AXHelpButton", "AXButton"]),
    ("colorwell", &["AXColorWell"]),
    ("ruler", &["AXRuler"]),
    ("cell", &["AXCell"]),
    ("row", &["AXRow"]),
    ("column", &["AXColumn"]),
];

/// AX roles matched by a user role, or None for an unknown role name.
pub fn ax_roles_for(user_role: &str) -> Option<&'static [&'static str]> {
    let wanted = user_role.to_ascii_lowercase();
    ROLE_TABLE
        .iter()
        .find(|(name, _)| *name == wanted)
        .map(|(_, roles)| *roles)
}

/// AX role → friendly name; first table entry listing an AX role wins.
static REVERSE_ROLE_INDEX: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut index = HashMap::new();
    for (name, roles) in ROLE_TABLE {
        for role in *roles {
            index.entry(*role).or_insert(*name);
        }
    }
    index
});

/// Friendly name for an AX role.
pub fn user_role_for(ax_role: &str) -> Option<&'static str> {
    REVERSE_ROLE_INDEX.get(ax_role).copied()
}

/// Filter applied to a snapshot's element tree.
///
/// All present fields must match. Parents of a matching node are retained
/// for context but not marked as matches themselves.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AXQuery {
    /// Friendly role name from [`ROLE_TABLE`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    /// Case-insensitive substring match against title or value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Exact match against the application-assigned identifier.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
    /// Enabled-state filter; absent means "enabled only".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,
}

impl AXQuery {
    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.title.is_none()
            && self.identifier.is_none()
            && self.enabled.is_none()
    }

    /// Reject unknown role names up front so the walk never runs with a
    /// filter that cannot match anything.
    pub fn validate(&self) -> Result<(), AutomationError> {
        if let Some(role) = &self.role {
            if ax_roles_for(role).is_none() {
                return Err(AutomationError::InvalidParams(format!(
                    "unknown role '{role}'"
                )));
            }
        }
        Ok(())
    }

    /// Whether a node with the given attributes satisfies the query.
    pub fn matches(
        &self,
        ax_role: &str,
        title: Option<&str>,
        value: Option<&str>,
        identifier: Option<&str>,
        enabled: bool,
    ) -> bool {
        if let Some(role) = &self.role {
            match ax_roles_for(role) {
                Some(roles) if roles.contains(&ax_role) => {}
                _ => return false,
            }
        }
        if let Some(needle) = &self.title {
            let needle = needle.to_lowercase();
            let in_title = title
                .map(|t| t.to_lowercase().contains(&needle))
                .unwrap_or(false);
            let in_value = value
                .map(|v| v.to_lowercase().contains(&needle))
                .unwrap_or(false);
            if !in_title && !in_value {
                return false;
            }
        }
        if let Some(ident) = &self.identifier {
            if identifier != Some(ident.as_str()) {
                return false;
            }
        }
        // Default to enabled-only filtering when the caller did not say.
        let wanted_enabled = self.enabled.unwrap_or(true);
        if enabled != wanted_enabled {
            return false;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_user_role_round_trips() {
        for (user_role, ax_roles) in ROLE_TABLE {
            assert!(!ax_roles.is_empty(), "{user_role} maps to no AX role");
            let canonical = ax_roles[0];
            assert_eq!(
                user_role_for(canonical),
                Some(*user_role),
                "canonical AX role of '{user_role}' must map back to it"
            );
        }
    }

    #[test]
    fn canonical_ax_roles_are_unique() {
        let mut seen = std::collections::HashSet::new();
        for (user_role, ax_roles) in ROLE_TABLE {
            assert!(
                seen.insert(ax_roles[0]),
                "canonical role {} of '{user_role}' already used",
                ax_roles[0]
            );
        }
    }

    #[test]
    fn role_lookup_is_case_insensitive() {
        assert_eq!(ax_roles_for("Button"), ax_roles_for("button"));
        assert!(ax_roles_for("nonesuch").is_none());
    }

    #[test]
    fn title_matches_title_or_value() {
        let q = AXQuery {
            title: Some("cupert".into()),
            ..Default::default()
        };
        assert!(q.matches("AXStaticText", Some("Cupertino"), None, None, true));
        assert!(q.matches("AXTextField", None, Some("CUPERTINO, CA"), None, true));
        assert!(!q.matches("AXStaticText", Some("Seattle"), None, None, true));
    }

    #[test]
    fn enabled_defaults_to_true() {
        let q = AXQuery::default();
        assert!(q.matches("AXButton", None, None, None, true));
        assert!(!q.matches("AXButton", None, None, None, false));
        let q = AXQuery {
            enabled: Some(false),
            ..Default::default()
        };
        assert!(q.matches("AXButton", None, None, None, false));
    }

    #[test]
    fn identifier_is_exact() {
        let q = AXQuery {
            identifier: Some("save-button".into()),
            ..Default::default()
        };
        assert!(q.matches("AXButton", None, None, Some("save-button"), true));
        assert!(!q.matches("AXButton", None, None, Some("save"), true));
        assert!(!q.matches("AXButton", None, None, None, true));
    }

    #[test]
    fn unknown_role_fails_validation() {
        let q = AXQuery {
            role: Some("gizmo".into()),
            ..Default::default()
        };
        assert_eq!(q.validate().unwrap_err().error_code(), "INVALID_PARAMS");
    }
}
