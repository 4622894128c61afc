use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Operating mode, decided once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Live,
    Demo,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Demo => "demo",
        }
    }

    pub fn is_demo(self) -> bool {
        matches!(self, Self::Demo)
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One address currently banned in a jail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BannedAddress {
    pub ip: String,
    pub jail: String,
    /// Only known when the daemon reports ban times (or in demo data).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub banned_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

impl BannedAddress {
    pub fn new(ip: impl Into<String>, jail: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            jail: jail.into(),
            banned_at: None,
            country: None,
        }
    }

    pub fn at(mut self, banned_at: DateTime<Utc>) -> Self {
        self.banned_at = Some(banned_at);
        self
    }

    pub fn with_country(mut self, country: impl Into<String>) -> Self {
        self.country = Some(country.into());
        self
    }
}

/// Snapshot of one jail.
///
/// `currently_banned` is derived from the banned list and cannot be set on
/// its own, so the two never disagree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Jail {
    name: String,
    pub currently_failed: u64,
    currently_banned: u64,
    pub total_failed: u64,
    pub total_banned: u64,
    banned: Vec<BannedAddress>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_list: Vec<String>,
}

impl Jail {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            currently_failed: 0,
            currently_banned: 0,
            total_failed: 0,
            total_banned: 0,
            banned: Vec::new(),
            file_list: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn currently_banned(&self) -> u64 {
        self.currently_banned
    }

    pub fn banned(&self) -> &[BannedAddress] {
        &self.banned
    }

    pub fn banned_ips(&self) -> impl Iterator<Item = &str> {
        self.banned.iter().map(|b| b.ip.as_str())
    }

    pub fn is_banned(&self, ip: &str) -> bool {
        self.banned.iter().any(|b| b.ip == ip)
    }

    /// Add an address; returns false if it was already listed.
    pub fn add_banned(&mut self, mut entry: BannedAddress) -> bool {
        if self.is_banned(&entry.ip) {
            return false;
        }
        entry.jail = self.name.clone();
        self.banned.push(entry);
        self.currently_banned = self.banned.len() as u64;
        true
    }

    pub fn remove_banned(&mut self, ip: &str) -> bool {
        let before = self.banned.len();
        self.banned.retain(|b| b.ip != ip);
        self.currently_banned = self.banned.len() as u64;
        before != self.banned.len()
    }

    /// Record when `ip` was banned. Returns false if the address is not listed.
    pub fn set_ban_time(&mut self, ip: &str, at: DateTime<Utc>) -> bool {
        match self.banned.iter_mut().find(|b| b.ip == ip) {
            Some(entry) => {
                entry.banned_at = Some(at);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Ban,
    Unban,
}

impl ActionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ban => "ban",
            Self::Unban => "unban",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ban" => Ok(Self::Ban),
            "unban" => Ok(Self::Unban),
            other => Err(format!("unknown action '{other}' (expected ban or unban)")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// One ban/unban performed through the API. Never modified once written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionLogEntry {
    pub id: u64,
    pub timestamp: DateTime<Utc>,
    pub action: ActionKind,
    pub jail: String,
    pub ip: String,
    pub outcome: Outcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionLogEntry {
    pub fn succeeded(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

/// Bans observed in one hour-aligned slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineBucket {
    pub hour: DateTime<Utc>,
    /// `HH:00`, for chart axes.
    pub label: String,
    pub count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Offender {
    pub ip: String,
    pub jails: Vec<String>,
    pub jail_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_banned: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Totals {
    pub jails: usize,
    pub currently_banned: u64,
    pub currently_failed: u64,
    pub total_banned: u64,
    pub total_failed: u64,
}

/// Everything `/api/status` returns.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub mode: Mode,
    pub generated_at: DateTime<Utc>,
    pub totals: Totals,
    pub jails: Vec<Jail>,
    pub timeline: Vec<TimelineBucket>,
    pub top_offenders: Vec<Offender>,
}
