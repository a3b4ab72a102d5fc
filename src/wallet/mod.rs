pub mod registry;
pub mod stats;
pub mod types;
