//! Domain layer: balance values, mutation requests and their formulas, and the
//! store port the engine depends on.

pub mod account;
pub mod mutation;
pub mod ports;
