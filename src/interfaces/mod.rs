//! Abstract interfaces for the engine's collaborators.
//!
//! These traits define the contracts for:
//! - Storage (customers, accrual requests, ledger, membership)
//! - The external identity provider

pub mod identity;
pub mod repository;

pub use identity::{IdentityError, IdentityGateway, IdentityProfile};
pub use repository::{
    AccrualRequestFilter, CustomerFilter, CustomerRepository, LedgerFilter, MembershipRepository,
    MileageRepository, Repository, StorageError,
};
