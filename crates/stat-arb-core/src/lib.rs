pub mod backtest;
pub mod cointegration;
pub mod config;
pub mod error;
pub mod performance;
pub mod pipeline;
pub mod signal;
pub mod spread;
pub mod stats;
pub mod types;

#[cfg(feature = "optimizer")]
pub mod optimizer;

pub use error::StatArbError;
pub use types::*;

/// Standard result type for all stat-arb operations
pub type StatArbResult<T> = Result<T, StatArbError>;
