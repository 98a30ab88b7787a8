//! Loyalty program tuning: windows, batch sizes, rate and tier tables.

use serde::Deserialize;

use crate::domain::MemberTier;

/// Default rolling window for tier derivation.
pub const DEFAULT_ROLLING_WINDOW_MONTHS: u32 = 12;
/// Default lifetime of earned qualifying miles.
pub const DEFAULT_EXPIRY_PERIOD_MONTHS: u32 = 13;
/// Default customers per batch page.
pub const DEFAULT_BATCH_SIZE: u32 = 500;

/// Distance thresholds shared by every fare class in the default table.
const DEFAULT_BONUS_THRESHOLDS: [f64; 5] = [1000.0, 2000.0, 3000.0, 5000.0, f64::INFINITY];

/// How computed miles are rounded when stored on a request.
///
/// `whole_mile` is the default. Deployments whose stored amounts must match
/// raw products from an earlier ledger (0.65 x 710 = 461.5, not 462) set
/// `mile_rounding: none`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MileRounding {
    /// Store the raw product.
    None,
    /// Round half away from zero to a whole mile.
    #[default]
    WholeMile,
}

impl MileRounding {
    pub fn apply(&self, miles: f64) -> f64 {
        match self {
            MileRounding::None => miles,
            MileRounding::WholeMile => miles.round(),
        }
    }
}

/// One bonus bucket: the rate applied once a distance passes `threshold`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct BonusBucket {
    pub threshold: f64,
    pub rate: f64,
}

/// Qualifying multiplier and bonus schedule for one booking class code.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BookingClassRate {
    pub code: String,
    pub qualifying_rate: f64,
    /// Ascending by threshold.
    pub bonus: Vec<BonusBucket>,
}

impl BookingClassRate {
    fn with_bonus_rates(code: &str, qualifying_rate: f64, rates: [f64; 5]) -> Self {
        Self {
            code: code.to_string(),
            qualifying_rate,
            bonus: DEFAULT_BONUS_THRESHOLDS
                .iter()
                .zip(rates)
                .map(|(&threshold, rate)| BonusBucket { threshold, rate })
                .collect(),
        }
    }
}

/// Minimum rolling qualifying miles for a tier.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct TierThreshold {
    pub tier: MemberTier,
    pub min_miles: f64,
}

/// Loyalty engine configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoyaltyConfig {
    /// Months of earning history summed for tier derivation.
    pub rolling_window_months: u32,
    /// Months after the earning month at which qualifying miles expire.
    pub expiry_period_months: u32,
    /// Customers per page in the recalculation job.
    pub batch_size: u32,
    /// Rounding applied to computed miles when a request is stored. Set to
    /// `none` to keep fractional amounts as computed.
    pub mile_rounding: MileRounding,
    /// Tier thresholds, lowest tier first.
    pub tiers: Vec<TierThreshold>,
    /// Booking class rate table.
    pub booking_classes: Vec<BookingClassRate>,
}

impl Default for LoyaltyConfig {
    fn default() -> Self {
        Self {
            rolling_window_months: DEFAULT_ROLLING_WINDOW_MONTHS,
            expiry_period_months: DEFAULT_EXPIRY_PERIOD_MONTHS,
            batch_size: DEFAULT_BATCH_SIZE,
            mile_rounding: MileRounding::default(),
            tiers: default_tiers(),
            booking_classes: default_booking_classes(),
        }
    }
}

/// Production tier thresholds.
pub fn default_tiers() -> Vec<TierThreshold> {
    [
        (MemberTier::Register, 0.0),
        (MemberTier::Silver, 1.0),
        (MemberTier::Titan, 15_000.0),
        (MemberTier::Gold, 30_000.0),
        (MemberTier::Platinum, 50_000.0),
        (MemberTier::MillionMiler, 100_000.0),
    ]
    .into_iter()
    .map(|(tier, min_miles)| TierThreshold { tier, min_miles })
    .collect()
}

/// Historical fare class table.
pub fn default_booking_classes() -> Vec<BookingClassRate> {
    let business = [2.5, 3.0, 4.6, 8.6, 12.0];
    let business_saver = [2.0, 2.2, 3.5, 6.5, 9.0];
    let premium_w = [1.8, 2.0, 3.0, 5.6, 8.0];
    let premium = [1.6, 1.8, 2.7, 5.2, 7.4];
    let flex = [1.4, 1.5, 2.3, 4.3, 6.0];
    let classic = [1.0, 1.1, 1.5, 2.8, 4.0];
    let lite = [0.5; 5];
    let super_lite = [0.0; 5];

    let mut table = Vec::new();
    for code in ["J", "C"] {
        table.push(BookingClassRate::with_bonus_rates(code, 2.00, business));
    }
    for code in ["D", "I"] {
        table.push(BookingClassRate::with_bonus_rates(code, 1.50, business_saver));
    }
    table.push(BookingClassRate::with_bonus_rates("W", 1.30, premium_w));
    for code in ["Z", "U"] {
        table.push(BookingClassRate::with_bonus_rates(code, 1.20, premium));
    }
    for code in ["Y", "M", "B"] {
        table.push(BookingClassRate::with_bonus_rates(code, 1.10, flex));
    }
    for code in ["S", "H", "K", "L"] {
        table.push(BookingClassRate::with_bonus_rates(code, 0.65, classic));
    }
    for code in ["Q", "N", "R", "T", "E"] {
        table.push(BookingClassRate::with_bonus_rates(code, 0.25, lite));
    }
    for code in ["A", "P", "G"] {
        table.push(BookingClassRate::with_bonus_rates(code, 0.10, super_lite));
    }
    table
}
