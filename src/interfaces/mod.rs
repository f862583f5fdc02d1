//! Inbound adapters: the endpoint dispatcher and the transports built on it.

pub mod csv;
pub mod dispatch;
pub mod http;
pub mod jsonl;
