pub mod classifier;
pub mod types;
