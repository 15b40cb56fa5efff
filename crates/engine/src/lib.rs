pub mod balances;
pub mod debt_ledger;
pub mod exchange_state;
pub mod exchanger;
pub mod fee_pool;
pub mod issuer;
pub mod liquidations;
pub mod system;

pub use balances::{Balances, CollateralEscrow, InMemoryBalances, InMemoryEscrow};
pub use debt_ledger::DebtLedger;
pub use exchange_state::{ExchangeEntry, ExchangeState};
pub use exchanger::{ExchangeOutcome, Exchanger, SettlementOwing, SettlementPlan};
pub use fee_pool::{ClosedFeePeriod, FeeClaim, FeePeriod, FeePool, PeriodFees};
pub use issuer::{BurnPlan, DebtChange, IssuanceData, Issuer, RemainingIssuable};
pub use liquidations::{LiquidationEntry, Liquidations};
pub use system::{InMemorySystem, LiquidationOutcome, SynthSystem};
