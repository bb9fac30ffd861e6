pub mod exposure;
pub mod trade_group;
