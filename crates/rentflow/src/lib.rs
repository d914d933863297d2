//! Lifecycle engine for rental applications, leases, and their payment schedules.

pub mod config;
pub mod error;
pub mod telemetry;
pub mod workflows;
