//! Launchable session types, loaded from an embedded map.

use serde::{Deserialize, Serialize};

/// Embedded session type map
const SESSION_TYPES_JSON: &str = include_str!("../assets/sessiontype_map_en.json");

/// Session types offered on the launch form
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionTypeMap {
    pub session_types: Vec<String>,
    pub default: String,
}

impl Default for SessionTypeMap {
    fn default() -> Self {
        Self {
            session_types: vec!["notebook".to_string()],
            default: "notebook".to_string(),
        }
    }
}

impl SessionTypeMap {
    /// Load the session type map from embedded JSON
    pub fn load() -> Self {
        serde_json::from_str(SESSION_TYPES_JSON).unwrap_or_else(|e| {
            tracing::error!("Failed to parse session type map: {}", e);
            Self::default()
        })
    }

    pub fn contains(&self, session_type: &str) -> bool {
        self.session_types
            .iter()
            .any(|t| t.eq_ignore_ascii_case(session_type))
    }
}

/// Display label for a session type
pub fn label(session_type: &str) -> &str {
    match session_type {
        "notebook" => "Notebook",
        "desktop" => "Desktop",
        "carta" => "CARTA",
        "headless" => "Headless",
        other => other,
    }
}
