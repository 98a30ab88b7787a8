//! Membership tier derivation.
//!
//! A customer's tier is a step function of the qualifying miles earned in a
//! trailing window. Bonus miles never count. The stored tier only changes,
//! and history is only written, when the derived tier differs.

use std::sync::Arc;

use chrono::{DateTime, Months, Utc};
use tracing::info;
use uuid::Uuid;

use crate::config::{ConfigError, LoyaltyConfig, TierThreshold};
use crate::domain::{Customer, MemberTier, MembershipHistory, TierChangeReason};
use crate::error::{MileageError, Result};
use crate::interfaces::Repository;

/// Ascending tier thresholds.
#[derive(Debug, Clone)]
pub struct TierTable {
    thresholds: Vec<TierThreshold>,
}

impl TierTable {
    /// Thresholds must ascend together with tier order.
    pub fn new(thresholds: &[TierThreshold]) -> std::result::Result<Self, ConfigError> {
        if thresholds.is_empty() {
            return Err(ConfigError::InvalidTierTable(
                "no tiers configured".to_string(),
            ));
        }
        if thresholds.iter().any(|t| !t.min_miles.is_finite()) {
            return Err(ConfigError::InvalidTierTable(
                "tier thresholds must be finite".to_string(),
            ));
        }
        for pair in thresholds.windows(2) {
            if pair[0].tier >= pair[1].tier || pair[0].min_miles >= pair[1].min_miles {
                return Err(ConfigError::InvalidTierTable(format!(
                    "{} ({}) must sort below {} ({})",
                    pair[0].tier, pair[0].min_miles, pair[1].tier, pair[1].min_miles
                )));
            }
        }
        Ok(Self {
            thresholds: thresholds.to_vec(),
        })
    }

    pub fn lowest(&self) -> MemberTier {
        self.thresholds[0].tier
    }

    /// Highest tier whose threshold does not exceed `rolling_miles`.
    /// Sums below every threshold map to the lowest tier.
    pub fn tier_for(&self, rolling_miles: f64) -> MemberTier {
        let mut tier = self.lowest();
        for threshold in &self.thresholds {
            if rolling_miles < threshold.min_miles {
                break;
            }
            tier = threshold.tier;
        }
        tier
    }
}

/// Result of one recalculation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TierOutcome {
    pub tier: MemberTier,
    pub rolling_miles: f64,
    pub changed: bool,
}

/// Derives tiers from the rolling window and records transitions.
#[derive(Clone)]
pub struct TierEngine {
    repository: Arc<dyn Repository>,
    tiers: TierTable,
    rolling_window_months: u32,
}

impl TierEngine {
    pub fn new(repository: Arc<dyn Repository>, tiers: TierTable, rolling_window_months: u32) -> Self {
        Self {
            repository,
            tiers,
            rolling_window_months,
        }
    }

    pub fn from_config(
        repository: Arc<dyn Repository>,
        config: &LoyaltyConfig,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self::new(
            repository,
            TierTable::new(&config.tiers)?,
            config.rolling_window_months,
        ))
    }

    pub fn tiers(&self) -> &TierTable {
        &self.tiers
    }

    /// Re-derive a customer's tier for the window closing at `effective_at`.
    pub async fn recalculate(
        &self,
        customer_id: Uuid,
        effective_at: DateTime<Utc>,
        reason: TierChangeReason,
    ) -> Result<TierOutcome> {
        let customer = self.load_customer(customer_id).await?;

        let window_start = effective_at
            .checked_sub_months(Months::new(self.rolling_window_months))
            .ok_or_else(|| {
                MileageError::Validation(format!("effective time {} out of range", effective_at))
            })?;

        let rolling_miles = self
            .repository
            .membership()
            .get_rolling_window_qualifying_miles(customer_id, window_start, effective_at)
            .await?;

        let tier = self.tiers.tier_for(rolling_miles);
        let changed = self.transition(&customer, tier, reason).await?;

        Ok(TierOutcome {
            tier,
            rolling_miles,
            changed,
        })
    }

    /// Set a tier directly, bypassing derivation.
    pub async fn assign(
        &self,
        customer_id: Uuid,
        tier: MemberTier,
        reason: TierChangeReason,
    ) -> Result<bool> {
        let customer = self.load_customer(customer_id).await?;
        self.transition(&customer, tier, reason).await
    }

    async fn load_customer(&self, customer_id: Uuid) -> Result<Customer> {
        self.repository
            .customers()
            .get_customer_by_id(customer_id)
            .await?
            .ok_or_else(|| MileageError::CustomerNotFound(customer_id.to_string()))
    }

    /// Returns whether a write happened.
    async fn transition(
        &self,
        customer: &Customer,
        tier: MemberTier,
        reason: TierChangeReason,
    ) -> Result<bool> {
        if tier == customer.member_tier {
            return Ok(false);
        }

        let change = MembershipHistory::new(customer.id, customer.member_tier, tier, reason);
        let updated = self
            .repository
            .membership()
            .update_customer_membership_tier(&change)
            .await?;
        if !updated {
            return Err(MileageError::ConcurrentUpdate(format!(
                "tier of customer {} moved from {}",
                customer.id, customer.member_tier
            )));
        }

        info!(
            customer_id = %customer.id,
            old_tier = %change.old_tier,
            new_tier = %change.new_tier,
            reason = %reason,
            "Membership tier changed"
        );
        Ok(true)
    }
}
