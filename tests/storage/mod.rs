//! Shared storage integration tests.
//!
//! Tests the LedgerBackend interface against all implementations.
//! Each implementation module imports these test functions and runs them.

pub mod ledger_backend_tests;
