//! Backend health types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Tri-state backend connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Connectivity {
    /// Reachable and the last send succeeded
    Online,
    /// Reachable but the last completed send failed
    Degraded,
    /// Probe failed or reported not ok
    Offline,
}

impl fmt::Display for Connectivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Connectivity::Online => "online",
            Connectivity::Degraded => "degraded",
            Connectivity::Offline => "offline",
        };
        f.write_str(s)
    }
}

/// Raw result of one health probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthReport {
    /// Backend reported itself usable
    pub ok: bool,
    /// Inference base the gateway talks to
    pub base: String,
    /// Active model, when the backend reports one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl HealthReport {
    /// Report for an unreachable backend
    pub fn offline(base: impl Into<String>) -> Self {
        Self {
            ok: false,
            base: base.into(),
            model: None,
        }
    }
}

/// Health as seen by the send pipeline and the UI
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthState {
    /// Last probe reported ok
    pub ok: bool,
    /// Inference base
    pub base: String,
    /// Derived connectivity
    pub state: Connectivity,
    /// Active model, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Time of the last probe; `None` before the first one completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checked_at: Option<DateTime<Utc>>,
}

impl HealthState {
    /// State before any probe has completed
    pub fn unprobed(base: impl Into<String>) -> Self {
        Self {
            ok: false,
            base: base.into(),
            state: Connectivity::Offline,
            model: None,
            checked_at: None,
        }
    }

    /// Derive the state from a probe result and the last send outcome
    pub fn derive(report: &HealthReport, last_send_failed: bool) -> Self {
        Self {
            ok: report.ok,
            base: report.base.clone(),
            state: derive_connectivity(report.ok, last_send_failed),
            model: report.model.clone(),
            checked_at: Some(Utc::now()),
        }
    }

    /// Whether sends may start
    pub fn accepts_sends(&self) -> bool {
        self.state != Connectivity::Offline
    }
}

/// `offline` if the probe failed, else `degraded` if the last send failed, else `online`
pub fn derive_connectivity(probe_ok: bool, last_send_failed: bool) -> Connectivity {
    match (probe_ok, last_send_failed) {
        (false, _) => Connectivity::Offline,
        (true, true) => Connectivity::Degraded,
        (true, false) => Connectivity::Online,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derivation_table() {
        assert_eq!(derive_connectivity(false, false), Connectivity::Offline);
        assert_eq!(derive_connectivity(false, true), Connectivity::Offline);
        assert_eq!(derive_connectivity(true, true), Connectivity::Degraded);
        assert_eq!(derive_connectivity(true, false), Connectivity::Online);
    }

    #[test]
    fn test_degraded_still_accepts_sends() {
        let report = HealthReport {
            ok: true,
            base: "http://127.0.0.1:11434".to_string(),
            model: None,
        };
        let state = HealthState::derive(&report, true);
        assert_eq!(state.state, Connectivity::Degraded);
        assert!(state.accepts_sends());
        assert!(!HealthState::unprobed("x").accepts_sends());
    }
}
