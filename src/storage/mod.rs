//! Storage backends implementing the [`ConfigStore`](traits::ConfigStore)
//! contract: in-memory (tests, single process) and SQLite (durable).

pub mod memory;
pub mod sql;
pub mod traits;
