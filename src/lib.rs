//! Mileage Engine - loyalty miles ledger and tier engine
//!
//! Customers claim miles for flown tickets. Approved claims post entries to an
//! append-only ledger, cached totals follow the ledger, and membership tiers
//! are derived from qualifying miles earned over a rolling window. Batch jobs
//! expire aged miles and keep tiers current.

pub mod config;
pub mod domain;
pub mod error;
pub mod interfaces;
pub mod services;
pub mod storage;
pub mod utils;

pub use error::{ErrorKind, MileageError, Result};
