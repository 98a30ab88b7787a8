//! Shared storage integration tests.
//!
//! Tests the Repository interface against all implementations.
//! Each implementation module imports these test functions and runs them.

pub mod repository_tests;
