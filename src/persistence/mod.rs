//! Durable and in-memory repositories.
//!
//! Two small JSON-backed stores: the security -> instrument mapping the
//! arbitrage engine discovers once and reuses across restarts, and the
//! backtest job records persisted at every status transition. Each has an
//! in-memory twin for tests.

pub mod job_store;
pub mod mapping_store;

pub use job_store::{FileJobStore, JobRepository, MemoryJobStore};
pub use mapping_store::{FileMappingStore, MappingRepository, MemoryMappingStore};
