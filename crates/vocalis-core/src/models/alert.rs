//! Operator alert model
//!
//! Alerts carry a title and a flat key/value detail map. Delivery is
//! best-effort; a failed push is logged by the sink and never surfaces
//! to the caller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Alert severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertSeverity {
    Info,
    Warning,
    Critical,
}

impl fmt::Display for AlertSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertSeverity::Info => write!(f, "info"),
            AlertSeverity::Warning => write!(f, "warning"),
            AlertSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Outbound operator notification
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub severity: AlertSeverity,
    pub title: String,
    pub details: BTreeMap<String, String>,
}

impl Alert {
    pub fn new(severity: AlertSeverity, title: impl Into<String>) -> Self {
        Self {
            severity,
            title: title.into(),
            details: BTreeMap::new(),
        }
    }

    pub fn info(title: impl Into<String>) -> Self {
        Self::new(AlertSeverity::Info, title)
    }

    pub fn warning(title: impl Into<String>) -> Self {
        Self::new(AlertSeverity::Warning, title)
    }

    pub fn critical(title: impl Into<String>) -> Self {
        Self::new(AlertSeverity::Critical, title)
    }

    /// Attach one detail entry
    pub fn detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }
}
