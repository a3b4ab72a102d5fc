pub mod alert;
pub mod api;
pub mod config;
pub mod db;
pub mod ingest;
pub mod pipeline;
pub mod risk;
pub mod service;
pub mod snapshot;
pub mod stream;
pub mod threat;
pub mod wallet;
