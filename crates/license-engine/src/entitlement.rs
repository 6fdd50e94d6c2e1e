//! Entitlement record and the gating decision derived from it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// License standing reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntitlementStatus {
    #[serde(alias = "ACTIVE")]
    Active,
    #[serde(alias = "TRIAL")]
    Trial,
    #[serde(alias = "BLOCKED")]
    Blocked,
    /// The last identify call failed. Set locally, never sent by the backend.
    #[serde(skip_deserializing)]
    ConnectionError,
    /// No identify call has completed yet, or the backend sent a status
    /// this build does not know.
    #[default]
    #[serde(other)]
    Unknown,
}

/// Caller's entitlement as returned by `POST /identify`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EntitlementRecord {
    pub status: EntitlementStatus,
    /// Only consulted for trials.
    pub has_access: bool,
    pub validated: bool,
    pub license_tags: Vec<String>,
    pub license_entitlements: Vec<String>,
    pub license_status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trial_end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl EntitlementRecord {
    /// Whether the trial end has passed at `now`. A trial without an end
    /// time never expires on its own.
    pub fn trial_expired(&self, now: DateTime<Utc>) -> bool {
        self.trial_end_time.is_some_and(|end| end < now)
    }
}

/// What the task pane should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Loading,
    FullAccess,
    ActivationPrompt,
    /// Terminal for the session.
    Blocked,
    /// Identify failed; offer a retry.
    RetryableError,
}

impl GateDecision {
    pub fn allows_analysis(&self) -> bool {
        matches!(self, GateDecision::FullAccess)
    }
}

/// Derive the gate from a record at a point in time.
pub fn resolve_gate(
    record: &EntitlementRecord,
    now: DateTime<Utc>,
    activation_requested: bool,
) -> GateDecision {
    match record.status {
        EntitlementStatus::Unknown => GateDecision::Loading,
        EntitlementStatus::Active => GateDecision::FullAccess,
        EntitlementStatus::Trial => {
            if !record.has_access || record.trial_expired(now) || activation_requested {
                GateDecision::ActivationPrompt
            } else {
                GateDecision::FullAccess
            }
        }
        EntitlementStatus::Blocked => GateDecision::Blocked,
        EntitlementStatus::ConnectionError => GateDecision::RetryableError,
    }
}

/// Whole days left in the trial, rounded up. Zero once expired or when the
/// record is not a dated trial.
pub fn trial_days_remaining(record: &EntitlementRecord, now: DateTime<Utc>) -> u32 {
    const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

    if record.status != EntitlementStatus::Trial {
        return 0;
    }
    let Some(end) = record.trial_end_time else {
        return 0;
    };
    let remaining_ms = (end - now).num_milliseconds();
    if remaining_ms <= 0 {
        return 0;
    }
    u32::try_from((remaining_ms + MS_PER_DAY - 1) / MS_PER_DAY).unwrap_or(u32::MAX)
}
