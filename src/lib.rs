pub mod config;
pub mod engine;
pub mod error;
pub mod ingest;
pub mod mapping;
pub mod provision;
pub mod schema;
pub mod store;
pub mod upload;
