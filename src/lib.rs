// ===============================
// src/lib.rs
// ===============================
pub mod baseline;
pub mod binance;         // signer + REST payload models
pub mod config;
pub mod daily;
pub mod dashboard;
pub mod domain;
pub mod format;
pub mod gateway;         // trait + mock gateway
pub mod gateway_binance; // real Binance Spot (REST, read-only)
pub mod metrics;
pub mod positions;
pub mod recorder;
pub mod report;
