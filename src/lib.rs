//! Chainwatch - supervisor for remote cloud coding workers

pub mod api;
pub mod checklist;
pub mod commands;
pub mod config;
pub mod error;
pub mod estimate;
pub mod spawn;
pub mod subprocess;
pub mod telemetry;
