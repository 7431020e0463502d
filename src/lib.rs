pub mod config;
pub mod harvest;
pub mod observability;
pub mod pool;
pub mod queue;
pub mod store;
pub mod worker;
