//! Administrator adjustments and tier overrides.

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tracing::{error, info, instrument};
use uuid::Uuid;

use crate::config::{ConfigError, LoyaltyConfig};
use crate::domain::{Actor, LedgerKind, MemberTier, MilesLedgerEntry, TierChangeReason};
use crate::error::{MileageError, Result};
use crate::interfaces::Repository;

use super::ledger_writer::LedgerWriter;
use super::tier_engine::{TierEngine, TierOutcome};

/// A hand-posted miles change.
#[derive(Debug, Clone, PartialEq)]
pub struct Adjustment {
    pub kind: LedgerKind,
    pub qualifying_miles_delta: f64,
    pub bonus_miles_delta: f64,
    pub earning_month: NaiveDate,
    pub note: String,
}

/// Result of a posted adjustment.
#[derive(Debug, Clone)]
pub struct AdjustmentOutcome {
    pub entry: MilesLedgerEntry,
    /// `None` when re-derivation failed after the entry was posted.
    pub tier: Option<TierOutcome>,
}

/// Posts adjustments and overrides tiers on behalf of administrators.
#[derive(Clone)]
pub struct MilesAdjuster {
    ledger: LedgerWriter,
    tiers: TierEngine,
}

impl MilesAdjuster {
    pub fn new(
        repository: Arc<dyn Repository>,
        config: &LoyaltyConfig,
    ) -> std::result::Result<Self, ConfigError> {
        Ok(Self {
            ledger: LedgerWriter::new(repository.clone()),
            tiers: TierEngine::from_config(repository, config)?,
        })
    }

    #[instrument(skip(self, actor, adjustment), fields(actor = %actor.external_id, kind = %adjustment.kind))]
    pub async fn adjust(
        &self,
        actor: &Actor,
        customer_id: Uuid,
        adjustment: Adjustment,
    ) -> Result<AdjustmentOutcome> {
        require_admin(actor)?;
        if !adjustment.kind.is_manual() {
            return Err(MileageError::Validation(format!(
                "{} entries cannot be posted by hand",
                adjustment.kind
            )));
        }
        let note = adjustment.note.trim();
        if note.is_empty() {
            return Err(MileageError::Validation("adjustment note is required".to_string()));
        }
        if adjustment.qualifying_miles_delta == 0.0 && adjustment.bonus_miles_delta == 0.0 {
            return Err(MileageError::Validation("adjustment moves no miles".to_string()));
        }

        let entry = MilesLedgerEntry::manual(
            customer_id,
            adjustment.kind,
            adjustment.qualifying_miles_delta,
            adjustment.bonus_miles_delta,
            adjustment.earning_month,
            format!("{} by {}", note, actor.external_id),
        );
        self.ledger.post(&entry).await?;
        info!(
            customer_id = %customer_id,
            qualifying = entry.qualifying_miles_delta,
            bonus = entry.bonus_miles_delta,
            "Adjustment posted"
        );

        let tier = match self
            .tiers
            .recalculate(customer_id, Utc::now(), TierChangeReason::Manual)
            .await
        {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                error!(customer_id = %customer_id, error = %e, "Tier recalculation after adjustment failed");
                None
            }
        };

        Ok(AdjustmentOutcome { entry, tier })
    }

    /// Set a tier directly. The next recalculation run re-derives it.
    #[instrument(skip(self, actor), fields(actor = %actor.external_id))]
    pub async fn override_tier(
        &self,
        actor: &Actor,
        customer_id: Uuid,
        tier: MemberTier,
        note: &str,
    ) -> Result<bool> {
        require_admin(actor)?;
        if note.trim().is_empty() {
            return Err(MileageError::Validation("override note is required".to_string()));
        }
        let changed = self
            .tiers
            .assign(customer_id, tier, TierChangeReason::Manual)
            .await?;
        if changed {
            info!(customer_id = %customer_id, tier = %tier, note = note.trim(), "Tier overridden");
        }
        Ok(changed)
    }
}

fn require_admin(actor: &Actor) -> Result<()> {
    if actor.is_admin() {
        Ok(())
    } else {
        Err(MileageError::Forbidden(format!(
            "{} may not adjust miles",
            actor.external_id
        )))
    }
}
