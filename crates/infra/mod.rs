pub mod benchmarks;
pub mod db;
