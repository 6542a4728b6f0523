// Library root: re-exports all modules so integration tests and external
// consumers can access the crate's public API.

pub mod aggregate;
pub mod baseline;
pub mod config;
pub mod ingest;
pub mod report;
pub mod stats;
pub mod store;
pub mod value;
