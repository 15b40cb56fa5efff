pub mod clock;
pub mod config;
pub mod decimal;
pub mod error;
pub mod types;

pub use decimal::{Decimal, PreciseDecimal};
pub use error::{SynthError, SynthResult};
pub use types::{AccountId, AssetClass, AssetId, Timestamp};
