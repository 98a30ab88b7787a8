//! Customer profile and membership tiers.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Membership tiers, declared lowest first.
///
/// The derive order is the tier order: `Register < Silver < ... < MillionMiler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemberTier {
    #[default]
    Register,
    Silver,
    Titan,
    Gold,
    Platinum,
    MillionMiler,
}

impl MemberTier {
    pub const ALL: [MemberTier; 6] = [
        MemberTier::Register,
        MemberTier::Silver,
        MemberTier::Titan,
        MemberTier::Gold,
        MemberTier::Platinum,
        MemberTier::MillionMiler,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MemberTier::Register => "register",
            MemberTier::Silver => "silver",
            MemberTier::Titan => "titan",
            MemberTier::Gold => "gold",
            MemberTier::Platinum => "platinum",
            MemberTier::MillionMiler => "million_miler",
        }
    }
}

impl fmt::Display for MemberTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MemberTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MemberTier::ALL
            .into_iter()
            .find(|tier| tier.as_str() == s)
            .ok_or_else(|| format!("unknown member tier: {}", s))
    }
}

/// A loyalty program member.
///
/// `qualifying_miles_total` and `bonus_miles_total` cache the sum of the
/// customer's ledger deltas; only the ledger writer moves them.
#[derive(Debug, Clone, PartialEq)]
pub struct Customer {
    pub id: Uuid,
    /// Subject id at the external identity provider.
    pub external_id: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub qualifying_miles_total: f64,
    pub bonus_miles_total: f64,
    pub member_tier: MemberTier,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// A freshly onboarded customer: no miles, lowest tier.
    pub fn new(external_id: impl Into<String>, email: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            external_id: external_id.into(),
            email: email.into(),
            first_name: String::new(),
            last_name: String::new(),
            phone: None,
            qualifying_miles_total: 0.0,
            bonus_miles_total: 0.0,
            member_tier: MemberTier::default(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = first_name.into();
        self.last_name = last_name.into();
        self
    }

    /// "first last", as the name filter sees it.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}
