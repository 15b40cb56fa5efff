pub mod inverse;
pub mod rates;

pub use inverse::InversePricing;
pub use rates::{ExchangeRates, OracleSettings, RateRound, RatesUpdate};
