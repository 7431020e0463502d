pub mod fifo;
pub mod task;

pub use fifo::TaskQueue;
pub use task::{Task, TaskEnvelope};
