//! Harvest worker
//!
//! A worker owns one HTTP session and one storage adapter, pulls tasks
//! from the shared queue without blocking, runs the processor on each and
//! writes the result. It stops when the queue is empty or when the stop
//! signal is raised.

pub mod http;
pub mod processor;
pub mod runner;
pub mod signal;

pub use http::{FetchError, HeaderPreset, HttpConfig, HttpSession};
pub use processor::{ExtractConfig, JsonExtractProcessor, ProcessError, Processor};
pub use runner::{Worker, WorkerExit, WorkerReport, WriteMode};
pub use signal::StopSignal;
