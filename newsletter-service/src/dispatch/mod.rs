//! Due-content dispatch: the cycle engine and its bounded worker pool.

pub mod engine;
pub mod pool;

pub use engine::{CycleError, DispatchEngine, EngineSettings};
pub use pool::{PoolError, PoolSettings, WorkerPool};
