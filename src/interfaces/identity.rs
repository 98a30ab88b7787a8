//! External identity provider interface.

use async_trait::async_trait;

/// Errors from the identity provider.
#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("Identity not found: {0}")]
    NotFound(String),

    #[error("Identity provider unavailable: {0}")]
    Unavailable(String),
}

/// Profile data held by the identity provider.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IdentityProfile {
    pub external_id: String,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub phone_number: Option<String>,
}

/// Looks up user profiles at the external identity provider.
#[async_trait]
pub trait IdentityGateway: Send + Sync {
    async fn get_user(&self, external_id: &str) -> Result<IdentityProfile, IdentityError>;
}
