//! Concentration and limit monitoring.

pub mod monitor;

pub use monitor::{LimitBreach, LimitMonitor, LimitScope, PreTradeCheck, RiskLimit, Severity};
