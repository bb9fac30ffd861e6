pub mod correlation;
pub mod matrix;
pub mod volatility;
