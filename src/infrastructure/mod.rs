//! Store adapters implementing the connection/transaction port.

pub mod in_memory;
#[cfg(feature = "storage-mysql")]
pub mod mysql;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod row_lock;
