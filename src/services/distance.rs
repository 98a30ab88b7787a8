//! Route distance lookup.

use std::sync::Arc;

use crate::domain::location_code;
use crate::error::{MileageError, Result};
use crate::interfaces::Repository;

/// Resolves the distance between two location codes, in either direction.
#[derive(Clone)]
pub struct TravelDistanceResolver {
    repository: Arc<dyn Repository>,
}

impl TravelDistanceResolver {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    pub async fn distance_between(&self, from_code: &str, to_code: &str) -> Result<u32> {
        let from = location_code(from_code);
        let to = location_code(to_code);
        if from.is_empty() || to.is_empty() {
            return Err(MileageError::Validation(
                "route codes must not be empty".to_string(),
            ));
        }

        match self.repository.mileage().get_travel_distance(&from, &to).await? {
            Some(route) => Ok(route.miles),
            None => Err(MileageError::RouteNotFound { from, to }),
        }
    }
}
