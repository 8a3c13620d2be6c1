pub mod cli;
pub mod config;
pub mod engine;
pub mod init;

// Re-export the engine's main types
pub use engine::{
    BlockContainer, PrimitiveRegistry, Scheduler, Thread, ThreadStatus, TimerRegistry, Value,
};

// Re-export init API for convenience
pub use init::{initialize, InitBuilder, InitOptions};
