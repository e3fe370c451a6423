//! Precast production workflow backend: stage progression of precast elements,
//! QC gating, stockyard hand-off, and the HTTP API around them.

pub mod config;
pub mod db;
pub mod delivery;
pub mod error;
pub mod events;
pub mod progression;
pub mod prom_metrics;
pub mod server;
