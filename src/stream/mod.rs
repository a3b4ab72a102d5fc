pub mod backoff;
pub mod connector;
pub mod messages;
pub mod router;
