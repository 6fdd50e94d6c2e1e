//! License gating for the add-in.
//!
//! - [`LicenseStatusMachine`]: holds the entitlement record and drives
//!   identify and activation against the licensing backend
//! - [`resolve_gate`]: pure gating decision from a record and the time
//! - [`TrialExpiryWatcher`]: re-evaluates trial expiry on an interval

mod client;
mod clock;
mod entitlement;
mod error;
mod machine;
mod watcher;

pub use client::{ActivationRequest, ActivationResponse, HttpLicensingApi, LicensingApi};
pub use clock::{Clock, MockClock, SystemClock};
pub use entitlement::{
    resolve_gate, trial_days_remaining, EntitlementRecord, EntitlementStatus, GateDecision,
};
pub use error::{
    LicenseError, LicenseResult, ACTIVATION_RETRY_MESSAGE, EMPTY_LICENSE_KEY_MESSAGE,
    INVALID_LICENSE_KEY_MESSAGE,
};
pub use machine::{LicenseStatusMachine, TokenSource};
pub use watcher::TrialExpiryWatcher;
