#[allow(clippy::module_inception)]
mod parse;

pub use parse::{parser, Config, ManagerConfig, PollConfig, ProcessConfig, SoftLimit, Timings};
