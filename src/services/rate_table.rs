//! Booking class accrual rates.

use std::collections::HashMap;

use crate::config::{BookingClassRate, BonusBucket, ConfigError};
use crate::error::{MileageError, Result};

/// Rates and raw miles for one flight segment. No rounding applied.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AccrualQuote {
    pub distance_miles: u32,
    pub qualifying_rate: f64,
    pub qualifying_miles: f64,
    pub bonus_rate: f64,
    pub bonus_miles: f64,
}

#[derive(Debug, Clone)]
struct ClassSchedule {
    qualifying_rate: f64,
    bonus: Vec<BonusBucket>,
}

impl ClassSchedule {
    /// Rate paired with the largest threshold the distance strictly exceeds.
    /// The first bucket is the floor.
    fn bonus_rate(&self, distance_miles: f64) -> f64 {
        let mut index = 0;
        for (idx, bucket) in self.bonus.iter().enumerate() {
            if distance_miles > bucket.threshold {
                index = idx;
            }
        }
        self.bonus[index].rate
    }
}

/// Immutable fare class table, validated at construction.
#[derive(Debug, Clone)]
pub struct RateTable {
    classes: HashMap<String, ClassSchedule>,
}

impl RateTable {
    pub fn new(rates: &[BookingClassRate]) -> std::result::Result<Self, ConfigError> {
        if rates.is_empty() {
            return Err(ConfigError::InvalidRateTable(
                "no booking classes configured".to_string(),
            ));
        }

        let mut classes = HashMap::with_capacity(rates.len());
        for rate in rates {
            let code = normalize(&rate.code);
            if code.is_empty() {
                return Err(ConfigError::InvalidRateTable(
                    "empty booking class code".to_string(),
                ));
            }
            if !is_valid_rate(rate.qualifying_rate) {
                return Err(ConfigError::InvalidRateTable(format!(
                    "class {}: qualifying rate must be a non-negative number",
                    code
                )));
            }
            if rate.bonus.is_empty() {
                return Err(ConfigError::InvalidRateTable(format!(
                    "class {}: bonus schedule is empty",
                    code
                )));
            }
            if rate.bonus.iter().any(|b| !is_valid_rate(b.rate) || b.threshold.is_nan()) {
                return Err(ConfigError::InvalidRateTable(format!(
                    "class {}: bonus rates must be non-negative numbers",
                    code
                )));
            }
            if rate.bonus.windows(2).any(|w| w[0].threshold >= w[1].threshold) {
                return Err(ConfigError::InvalidRateTable(format!(
                    "class {}: bonus thresholds must be strictly ascending",
                    code
                )));
            }

            let schedule = ClassSchedule {
                qualifying_rate: rate.qualifying_rate,
                bonus: rate.bonus.clone(),
            };
            if classes.insert(code.clone(), schedule).is_some() {
                return Err(ConfigError::InvalidRateTable(format!(
                    "duplicate booking class {}",
                    code
                )));
            }
        }

        Ok(Self { classes })
    }

    /// Qualifying and bonus rates for a booking class at a distance.
    pub fn rate_for(&self, booking_class: &str, distance_miles: f64) -> Result<(f64, f64)> {
        let schedule = self
            .classes
            .get(&normalize(booking_class))
            .ok_or_else(|| MileageError::InvalidBookingClass(booking_class.to_string()))?;
        Ok((schedule.qualifying_rate, schedule.bonus_rate(distance_miles)))
    }

    /// Rates and products for one segment.
    pub fn quote(&self, booking_class: &str, distance_miles: u32) -> Result<AccrualQuote> {
        let distance = f64::from(distance_miles);
        let (qualifying_rate, bonus_rate) = self.rate_for(booking_class, distance)?;
        Ok(AccrualQuote {
            distance_miles,
            qualifying_rate,
            qualifying_miles: qualifying_rate * distance,
            bonus_rate,
            bonus_miles: bonus_rate * distance,
        })
    }

    pub fn contains(&self, booking_class: &str) -> bool {
        self.classes.contains_key(&normalize(booking_class))
    }
}

fn normalize(code: &str) -> String {
    code.trim().to_ascii_uppercase()
}

fn is_valid_rate(rate: f64) -> bool {
    rate.is_finite() && rate >= 0.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_booking_classes;

    fn table() -> RateTable {
        RateTable::new(&default_booking_classes()).unwrap()
    }

    #[test]
    fn test_bonus_boundary_is_exclusive_on_lower_edge() {
        let table = table();
        assert_eq!(table.rate_for("Y", 500.0).unwrap().1, 1.4);
        assert_eq!(table.rate_for("Y", 1000.0).unwrap().1, 1.4);
        assert_eq!(table.rate_for("Y", 1001.0).unwrap().1, 1.4);
        assert_eq!(table.rate_for("Y", 2000.0).unwrap().1, 1.4);
        assert_eq!(table.rate_for("Y", 2001.0).unwrap().1, 1.5);
        assert_eq!(table.rate_for("Y", 3001.0).unwrap().1, 2.3);
        assert_eq!(table.rate_for("Y", 5001.0).unwrap().1, 4.3);
        assert_eq!(table.rate_for("J", 9000.0).unwrap().1, 8.6);
    }

    #[test]
    fn test_quote_is_plain_product() {
        let table = table();
        let quote = table.quote("Y", 3000).unwrap();
        assert_eq!(quote.qualifying_rate, 1.10);
        assert_eq!(quote.qualifying_miles, 1.10 * 3000.0);
        assert_eq!(quote.bonus_rate, 1.5);
        assert_eq!(quote.bonus_miles, 1.5 * 3000.0);

        for rate in default_booking_classes() {
            for distance in [0u32, 1, 999, 1000, 1001, 2500, 7777] {
                let quote = table.quote(&rate.code, distance).unwrap();
                assert_eq!(quote.qualifying_miles, rate.qualifying_rate * f64::from(distance));
            }
        }
    }

    #[test]
    fn test_unknown_class_is_rejected() {
        let err = table().rate_for("X", 1000.0).unwrap_err();
        assert!(matches!(err, MileageError::InvalidBookingClass(code) if code == "X"));
    }

    #[test]
    fn test_class_lookup_ignores_case() {
        assert!(table().contains(" y "));
    }

    #[test]
    fn test_invalid_tables_are_rejected() {
        assert!(RateTable::new(&[]).is_err());

        let mut unordered = default_booking_classes();
        unordered[0].bonus.swap(0, 1);
        assert!(RateTable::new(&unordered).is_err());

        let mut duplicated = default_booking_classes();
        duplicated[1].code = "j".to_string();
        assert!(RateTable::new(&duplicated).is_err());

        let mut empty_schedule = default_booking_classes();
        empty_schedule[2].bonus.clear();
        assert!(RateTable::new(&empty_schedule).is_err());

        let mut negative = default_booking_classes();
        negative[3].qualifying_rate = -1.0;
        assert!(RateTable::new(&negative).is_err());
    }
}
