pub mod access;
pub mod benchmarks;
pub mod deals;
pub mod entitlements;
pub mod enums;
