//! Per-user-type message quotas.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ChatError, CoreError, ErrorKind, Surface};

/// Class of caller identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserType {
    /// Users without an account.
    Guest,
    /// Users with an account.
    Regular,
}

impl UserType {
    /// Every user type. The entitlement table must cover all of them.
    pub fn all() -> &'static [UserType] {
        &[UserType::Guest, UserType::Regular]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Guest => "guest",
            UserType::Regular => "regular",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "guest" => Ok(UserType::Guest),
            "regular" => Ok(UserType::Regular),
            other => Err(format!("unknown user type: {}", other)),
        }
    }
}

/// Quotas granted to one user type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entitlements {
    pub max_messages_per_day: u32,
}

/// Outcome of a quota check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaDecision {
    Allow,
    Deny,
}

/// Static lookup table from user type to entitlements. Always total.
#[derive(Debug, Clone)]
pub struct EntitlementTable {
    entries: HashMap<UserType, Entitlements>,
}

impl EntitlementTable {
    /// Build a table, failing if any user type lacks an entry.
    pub fn from_entries(
        entries: impl IntoIterator<Item = (UserType, Entitlements)>,
    ) -> Result<Self, CoreError> {
        let entries: HashMap<_, _> = entries.into_iter().collect();
        if let Some(missing) = UserType::all().iter().find(|t| !entries.contains_key(t)) {
            return Err(CoreError::MissingEntitlement(missing.to_string()));
        }
        Ok(Self { entries })
    }

    /// Entitlements for a user type.
    pub fn get(&self, user_type: UserType) -> Entitlements {
        // totality is checked in from_entries
        self.entries[&user_type]
    }

    /// Decide whether a user who already sent `messages_sent_today` may send another.
    pub fn check_quota(&self, user_type: UserType, messages_sent_today: u32) -> QuotaDecision {
        if messages_sent_today >= self.get(user_type).max_messages_per_day {
            QuotaDecision::Deny
        } else {
            QuotaDecision::Allow
        }
    }

    /// Same as [`check_quota`](Self::check_quota), as a `Result` for `?` use.
    pub fn ensure_quota(&self, user_type: UserType, messages_sent_today: u32) -> Result<(), ChatError> {
        match self.check_quota(user_type, messages_sent_today) {
            QuotaDecision::Allow => Ok(()),
            QuotaDecision::Deny => Err(ChatError::new(ErrorKind::QuotaExceeded, Surface::Chat)),
        }
    }
}

impl Default for EntitlementTable {
    fn default() -> Self {
        Self {
            entries: HashMap::from([
                (UserType::Guest, Entitlements { max_messages_per_day: 20 }),
                (UserType::Regular, Entitlements { max_messages_per_day: 50 }),
            ]),
        }
    }
}
