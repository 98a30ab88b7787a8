//! Membership tier transition history.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::MemberTier;

/// What triggered a tier transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TierChangeReason {
    Accrual,
    CronRecalc,
    Manual,
}

impl TierChangeReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TierChangeReason::Accrual => "accrual",
            TierChangeReason::CronRecalc => "cron_recalc",
            TierChangeReason::Manual => "manual",
        }
    }
}

impl fmt::Display for TierChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TierChangeReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accrual" => Ok(TierChangeReason::Accrual),
            "cron_recalc" => Ok(TierChangeReason::CronRecalc),
            "manual" => Ok(TierChangeReason::Manual),
            other => Err(format!("unknown tier change reason: {}", other)),
        }
    }
}

/// Audit record of one tier transition. Written only when the tier changes.
#[derive(Debug, Clone, PartialEq)]
pub struct MembershipHistory {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub old_tier: MemberTier,
    pub new_tier: MemberTier,
    pub reason: TierChangeReason,
    pub created_at: DateTime<Utc>,
}

impl MembershipHistory {
    pub fn new(
        customer_id: Uuid,
        old_tier: MemberTier,
        new_tier: MemberTier,
        reason: TierChangeReason,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id,
            old_tier,
            new_tier,
            reason,
            created_at: Utc::now(),
        }
    }
}
