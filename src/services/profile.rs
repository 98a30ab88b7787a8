//! Customer onboarding from the identity provider.

use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::domain::{Actor, Customer};
use crate::error::{MileageError, Result};
use crate::interfaces::{IdentityGateway, Repository, StorageError};

/// Maps an authenticated actor to a customer, creating one on first sight.
#[derive(Clone)]
pub struct ProfileResolver {
    repository: Arc<dyn Repository>,
    identity: Arc<dyn IdentityGateway>,
}

impl ProfileResolver {
    pub fn new(repository: Arc<dyn Repository>, identity: Arc<dyn IdentityGateway>) -> Self {
        Self {
            repository,
            identity,
        }
    }

    /// The actor's customer record.
    ///
    /// Concurrent first calls for the same actor yield one customer.
    #[instrument(skip(self, actor), fields(external_id = %actor.external_id))]
    pub async fn resolve(&self, actor: &Actor) -> Result<Customer> {
        let external_id = actor.external_id.trim();
        if external_id.is_empty() {
            return Err(MileageError::Validation("missing actor id".to_string()));
        }

        let customers = self.repository.customers();
        if let Some(customer) = customers.get_customer_by_external_id(external_id).await? {
            debug!(customer_id = %customer.id, "Customer found");
            return Ok(customer);
        }

        let profile = self.identity.get_user(external_id).await?;
        let mut customer = Customer::new(external_id, profile.email)
            .with_name(profile.given_name, profile.family_name);
        customer.phone = profile.phone_number;

        match customers.save_customer(&customer).await {
            Ok(()) => {
                info!(customer_id = %customer.id, "Customer onboarded");
                Ok(customer)
            }
            Err(StorageError::Conflict(_)) => customers
                .get_customer_by_external_id(external_id)
                .await?
                .ok_or_else(|| {
                    MileageError::ConcurrentUpdate(format!("customer {} onboarding", external_id))
                }),
            Err(e) => Err(e.into()),
        }
    }
}
