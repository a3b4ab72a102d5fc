pub mod rules;
pub mod scorer;
pub mod types;
