//! Storage key constants.

/// Storage keys used by the add-in.
pub struct StorageKeys;

impl StorageKeys {
    /// Prefix shared by every identity-provider cache entry (accounts,
    /// id tokens, refresh tokens). The login dialog snapshots these and the
    /// task pane replays them.
    pub const IDENTITY_CACHE_PREFIX: &'static str = "idp.";

    /// Identifier of the account the identity-provider client treats as active.
    pub const ACTIVE_ACCOUNT_ID: &'static str = "idp.active_account";
}
