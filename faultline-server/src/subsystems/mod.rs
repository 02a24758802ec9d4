pub mod hub;
pub mod ingest;
