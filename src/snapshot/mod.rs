pub mod differ;
pub mod fetcher;
pub mod history;
pub mod scheduler;
pub mod types;
