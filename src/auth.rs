//! Bearer token state.
//!
//! The token is an explicit value handed to the synchronizer rather than
//! process-wide state. Expiry is an explicit transition; refreshing an expired
//! token is not supported, the caller must re-authorize.

use std::fmt;

use chrono::{DateTime, Utc};
use log::info;

use crate::error::{RideError, Result};

/// Opaque OAuth bearer token. `Debug` output is redacted.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// Lifecycle of the provider credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TokenState {
    /// No authorization has completed yet
    #[default]
    Unauthenticated,
    /// A usable token, optionally with the provider-reported expiry
    Authorized {
        token: AccessToken,
        expires_at: Option<DateTime<Utc>>,
    },
    /// Token passed its expiry or was rejected by the provider
    Expired,
}

impl TokenState {
    pub fn authorized(token: AccessToken) -> Self {
        TokenState::Authorized {
            token,
            expires_at: None,
        }
    }

    /// The bearer token, or `Unauthenticated` if none is usable.
    pub fn bearer(&self) -> Result<&AccessToken> {
        match self {
            TokenState::Authorized { token, .. } => Ok(token),
            TokenState::Unauthenticated => Err(RideError::unauthenticated(
                "no access token available, authorize first",
            )),
            TokenState::Expired => Err(RideError::unauthenticated(
                "access token expired, authorize again",
            )),
        }
    }

    /// Move to `Expired` if the token's expiry is at or before `now`.
    /// Returns true when the transition happened.
    pub fn check_expiry(&mut self, now: DateTime<Utc>) -> bool {
        let expired = matches!(
            self,
            TokenState::Authorized {
                expires_at: Some(at),
                ..
            } if *at <= now
        );
        if expired {
            self.expire();
        }
        expired
    }

    /// Mark the current token unusable (e.g. after the provider answered 401).
    pub fn expire(&mut self) {
        if matches!(self, TokenState::Authorized { .. }) {
            info!("[TokenState] Access token expired");
            *self = TokenState::Expired;
        }
    }
}
