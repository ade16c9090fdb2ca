//! Application core: simulation rules with no I/O of their own.
//!
//! The service drives sensors on their staggered schedule and talks to the
//! store, the weather collaborator and the log only through the **port
//! traits** in [`ports`], so every rule here is testable with in-memory
//! stand-ins.

pub mod events;
pub mod fleet;
pub mod ports;
pub mod service;
