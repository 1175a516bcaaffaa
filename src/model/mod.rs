//! Ledger value types.
//!
//! Three record kinds live in the ledger:
//! - [`LedgerEvent`]: append-only quantity changes
//! - [`Silo`]: mutable reference data
//! - [`Analysis`]: lab results, appended per silo

pub mod analysis;
pub mod conversion;
pub mod event;
pub mod quantity;
pub mod silo;
pub mod validation;

pub use analysis::{Analysis, AnalysisStatus, QualityMetrics};
pub use conversion::{ConversionFactors, Entry};
pub use event::{EventKind, InputMethod, LedgerEvent, SyncState};
pub use quantity::Quantity;
pub use silo::Silo;
pub use validation::ValidationError;
