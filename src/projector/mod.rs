//! Read-side projections over the ledger: silo balances and current analyses.

mod analysis;
mod balance;

pub use analysis::{current_analysis, history};
pub use balance::{fold_balance, occupancy, BalanceProjector, SiloBalance};
