/* src/lib.rs */

// Re-export modules for both binary and tests
pub mod api;
pub mod control;
pub mod error;
pub mod logger;
pub mod parse;
pub mod runtime;
pub mod shell;

pub use control::{Registry, SharedProcess};
pub use error::{Result, SupervisorError};
pub use parse::{Config, ProcessConfig, Timings};
pub use runtime::{Process, ProcessInfo, ProcessState, Supervised};
