pub mod access;
pub mod benchmarks;
pub mod billing;
pub mod billing_state;
pub mod cim;
pub mod deal_calculator;
pub mod deals;
