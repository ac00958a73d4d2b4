//! Engine core: configuration, connectivity, background tasks and wiring

pub mod config;
pub mod connectivity;
pub mod engine;
pub mod tasks;

pub use config::Config;
pub use connectivity::{Connectivity, ConnectivityProbe};
pub use engine::{Engine, EngineError, EngineResult};
pub use tasks::{BackgroundTasks, TaskKind};
