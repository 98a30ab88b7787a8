//! Loyalty engine services.
//!
//! Request-path services (accrual processing, onboarding, adjustments and
//! queries) and the batch jobs (expiry and tier recalculation) all work
//! against the [`Repository`](crate::interfaces::Repository) capability set.

pub mod accrual;
pub mod adjustment;
pub mod batch;
pub mod distance;
pub mod expiry_job;
pub mod ledger_writer;
pub mod profile;
pub mod queries;
pub mod rate_table;
pub mod recalculation_job;
pub mod scheduler;
pub mod tier_engine;

pub use accrual::{AccrualRequestProcessor, ApprovalOutcome};
pub use adjustment::{Adjustment, AdjustmentOutcome, MilesAdjuster};
pub use batch::BatchReport;
pub use distance::TravelDistanceResolver;
pub use expiry_job::ExpiryJob;
pub use ledger_writer::LedgerWriter;
pub use profile::ProfileResolver;
pub use queries::MileageQueries;
pub use rate_table::{AccrualQuote, RateTable};
pub use recalculation_job::RecalculationJob;
pub use scheduler::JobScheduler;
pub use tier_engine::{TierEngine, TierOutcome, TierTable};
