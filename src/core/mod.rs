pub mod config;
pub mod currency;
pub mod deadline;
pub mod error;
pub mod instrument;
pub mod market_data;
pub mod position;
pub mod sources;
