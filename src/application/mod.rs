//! Application layer containing the balance mutation protocol.
//!
//! This module defines the `LedgerEngine`, the single entry point for reading
//! and mutating balances. Every mutation kind runs through the same
//! transaction routine, parameterized by the kind's balance formula.

pub mod engine;
