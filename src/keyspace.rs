//! Named key categories
//!
//! Every piece of ephemeral state lives under a prefix with a fixed expiry
//! policy. Login sessions are deliberately permanent server-side; everything
//! else expires.

use std::fmt;
use std::time::Duration;

/// How long a key in a category lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyPolicy {
    /// Unreadable after the given duration
    Expiring(Duration),
    /// Stored without any TTL
    Permanent,
}

impl KeyPolicy {
    /// TTL in whole seconds, `None` for permanent keys
    #[must_use]
    pub fn ttl_secs(&self) -> Option<u64> {
        match self {
            Self::Expiring(ttl) => Some(ttl.as_secs().max(1)),
            Self::Permanent => None,
        }
    }
}

/// Key categories used by OTP issuance, session tracking and token bookkeeping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyspace {
    /// One-time passcodes, `otp:<phone>`, 5 minutes
    Otp,
    /// Login sessions, `session:<id>`, no server-side expiry
    Session,
    /// Issued access tokens, `accessToken:<token>`, 1 hour
    AccessToken,
    /// Issued refresh tokens, `refreshToken:<token>`, 7 days
    RefreshToken,
}

impl Keyspace {
    /// Key prefix, without the separator
    #[must_use]
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Otp => "otp",
            Self::Session => "session",
            Self::AccessToken => "accessToken",
            Self::RefreshToken => "refreshToken",
        }
    }

    /// Expiry policy for keys in this category
    #[must_use]
    pub fn policy(&self) -> KeyPolicy {
        match self {
            Self::Otp => KeyPolicy::Expiring(Duration::from_secs(300)),
            Self::Session => KeyPolicy::Permanent,
            Self::AccessToken => KeyPolicy::Expiring(Duration::from_secs(3600)),
            Self::RefreshToken => KeyPolicy::Expiring(Duration::from_secs(7 * 24 * 3600)),
        }
    }

    /// Full cache key for `id`
    #[must_use]
    pub fn key(&self, id: &str) -> String {
        format!("{}:{id}", self.prefix())
    }

    /// Glob matching every key in this category
    #[must_use]
    pub fn pattern(&self) -> String {
        format!("{}:*", self.prefix())
    }
}

impl fmt::Display for Keyspace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}
