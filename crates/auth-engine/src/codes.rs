//! Host-reported failure codes.
//!
//! The host's SSO channel reports failures in the 13000 range (plus 50001 for
//! hosts without SSO support). The dialog host reports lifecycle failures in
//! the 12000 range. Each code is classified once here so the authenticators
//! only decide what to do with a disposition.

use std::fmt;

/// What the primary authenticator does with a host SSO failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SsoDisposition {
    /// Show remedy text to the user and report to diagnostics.
    ReportToUser,
    /// Voluntary user action: no token, no error.
    SilentAbort,
    /// Hand over to the dialog-based fallback.
    Escalate,
}

/// Host SSO failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SsoErrorCode {
    /// 13000
    ApiNotSupported,
    /// 13001
    NotSignedIn,
    /// 13002
    UserAbortedConsent,
    /// 13003
    UnsupportedUserType,
    /// 13004
    InvalidResourceUrl,
    /// 13005
    InvalidGrant,
    /// 13006
    ClientError,
    /// 13007
    TokenUnavailable,
    /// 13008
    OperationAlreadyPending,
    /// 13009
    ForceConsentUnsupported,
    /// 13010
    ZoneConflict,
    /// 13012
    UnsupportedEnvironment,
    /// 13013
    TooManyRequests,
    /// 50001
    SsoUnsupported,
    Other(i64),
}

impl SsoErrorCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            13000 => Self::ApiNotSupported,
            13001 => Self::NotSignedIn,
            13002 => Self::UserAbortedConsent,
            13003 => Self::UnsupportedUserType,
            13004 => Self::InvalidResourceUrl,
            13005 => Self::InvalidGrant,
            13006 => Self::ClientError,
            13007 => Self::TokenUnavailable,
            13008 => Self::OperationAlreadyPending,
            13009 => Self::ForceConsentUnsupported,
            13010 => Self::ZoneConflict,
            13012 => Self::UnsupportedEnvironment,
            13013 => Self::TooManyRequests,
            50001 => Self::SsoUnsupported,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::ApiNotSupported => 13000,
            Self::NotSignedIn => 13001,
            Self::UserAbortedConsent => 13002,
            Self::UnsupportedUserType => 13003,
            Self::InvalidResourceUrl => 13004,
            Self::InvalidGrant => 13005,
            Self::ClientError => 13006,
            Self::TokenUnavailable => 13007,
            Self::OperationAlreadyPending => 13008,
            Self::ForceConsentUnsupported => 13009,
            Self::ZoneConflict => 13010,
            Self::UnsupportedEnvironment => 13012,
            Self::TooManyRequests => 13013,
            Self::SsoUnsupported => 50001,
            Self::Other(code) => code,
        }
    }

    pub fn disposition(self) -> SsoDisposition {
        match self {
            Self::NotSignedIn
            | Self::ClientError
            | Self::OperationAlreadyPending
            | Self::ZoneConflict => SsoDisposition::ReportToUser,
            Self::UserAbortedConsent => SsoDisposition::SilentAbort,
            _ => SsoDisposition::Escalate,
        }
    }

    /// User-facing remedy for codes the user can act on.
    pub fn remedy(self) -> Option<&'static str> {
        match self {
            Self::NotSignedIn => Some(
                "No one is signed in to Office. Sign in with your work or school account, then try again.",
            ),
            Self::ClientError => Some(
                "Office could not complete sign-in. Reload the add-in and contact support if the problem continues.",
            ),
            Self::OperationAlreadyPending => Some(
                "A sign-in request is already in progress. Wait for it to finish, then try again.",
            ),
            Self::ZoneConflict => Some(
                "The add-in and the sign-in page are in different security zones. Add both sites to the same zone, then try again.",
            ),
            _ => None,
        }
    }

    /// Machine-readable code carried on user-facing errors.
    pub fn machine_code(self) -> String {
        format!("sso_{}", self.code())
    }
}

impl fmt::Display for SsoErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Dialog host lifecycle failure codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DialogErrorCode {
    /// 12002
    CannotLoadPage,
    /// 12003
    RequiresHttps,
    /// 12004
    UntrustedDomain,
    /// 12005
    InsecureUrl,
    /// 12006
    UserClosedDialog,
    /// 12007
    DialogAlreadyOpen,
    /// 12009
    UserIgnoredDialog,
    /// 12011
    BlockedByBrowser,
    Other(i64),
}

impl DialogErrorCode {
    pub fn from_code(code: i64) -> Self {
        match code {
            12002 => Self::CannotLoadPage,
            12003 => Self::RequiresHttps,
            12004 => Self::UntrustedDomain,
            12005 => Self::InsecureUrl,
            12006 => Self::UserClosedDialog,
            12007 => Self::DialogAlreadyOpen,
            12009 => Self::UserIgnoredDialog,
            12011 => Self::BlockedByBrowser,
            other => Self::Other(other),
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Self::CannotLoadPage => 12002,
            Self::RequiresHttps => 12003,
            Self::UntrustedDomain => 12004,
            Self::InsecureUrl => 12005,
            Self::UserClosedDialog => 12006,
            Self::DialogAlreadyOpen => 12007,
            Self::UserIgnoredDialog => 12009,
            Self::BlockedByBrowser => 12011,
            Self::Other(code) => code,
        }
    }

    /// Closing the dialog is a voluntary action and is never shown.
    pub fn is_user_initiated(self) -> bool {
        matches!(self, Self::UserClosedDialog)
    }

    pub fn remedy(self) -> &'static str {
        match self {
            Self::CannotLoadPage => {
                "The sign-in page could not be loaded. Check your connection and try again."
            }
            Self::RequiresHttps | Self::InsecureUrl => {
                "The sign-in page must be served over HTTPS. Contact your administrator."
            }
            Self::UntrustedDomain => {
                "The sign-in page is not on a trusted domain. Contact your administrator."
            }
            Self::UserClosedDialog => "The sign-in dialog was closed.",
            Self::DialogAlreadyOpen => {
                "A sign-in dialog is already open. Finish or close it, then try again."
            }
            Self::UserIgnoredDialog => "Allow the sign-in dialog to open, then try again.",
            Self::BlockedByBrowser => {
                "Your browser blocked the sign-in dialog. Allow pop-ups for this site, then try again."
            }
            Self::Other(_) => "Sign-in could not be completed. Please try again.",
        }
    }

    pub fn machine_code(self) -> String {
        format!("dialog_{}", self.code())
    }
}

impl fmt::Display for DialogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}
