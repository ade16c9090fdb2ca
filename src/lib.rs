//! Smart bin sensor fleet simulator.
//!
//! Simulates a fleet of fill-level sensors that report on staggered
//! schedules, optionally take their temperature from live weather and
//! append every reading to a deduplicating time-series store.

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod error;
pub mod reading;
pub mod scheduler;
pub mod sensors;
