use crate::error::{Result, SupervisorError};
use serde::Deserialize;
use std::{collections::BTreeMap, fs, time::Duration};

fn default_serve_addr() -> String { "127.0.0.1:9099".to_string() }
fn default_alive_interval_ms() -> u64 { 1000 }
fn default_parked_interval_ms() -> u64 { 2000 }
fn default_launch_backoff_ms() -> u64 { 5000 }


/// Resource-limit hints. Carried through for operators, never enforced here.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct SoftLimit {
    #[serde(default)]
    pub limit_file_descriptor: u64,
}

/// Immutable launch parameters for one supervised program.
#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
pub struct ProcessConfig {
    pub command: String,
    #[serde(default, rename = "command_args")]
    pub args: Vec<String>,
    /// `KEY=VALUE` overrides layered on top of the supervisor's environment.
    #[serde(default)]
    pub envs: Vec<String>,
    /// `user` or `user:group`.
    #[serde(default, rename = "uid_gid")]
    pub identity: Option<String>,
    #[serde(default)]
    pub stdout_path: Option<String>,
    #[serde(default)]
    pub stderr_path: Option<String>,
    #[serde(default)]
    pub soft_limit: SoftLimit,
}

impl ProcessConfig {
    pub fn new(command: impl Into<String>) -> Self {
        Self { command: command.into(), ..Default::default() }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }
}

/// Cadence of the supervising loop.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    #[serde(default = "default_alive_interval_ms")]
    pub alive_interval_ms: u64,
    #[serde(default = "default_parked_interval_ms")]
    pub parked_interval_ms: u64,
    #[serde(default = "default_launch_backoff_ms")]
    pub launch_backoff_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            alive_interval_ms: default_alive_interval_ms(),
            parked_interval_ms: default_parked_interval_ms(),
            launch_backoff_ms: default_launch_backoff_ms(),
        }
    }
}

/// Sleep intervals handed to every `Process` at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timings {
    /// Re-check period while the child is alive.
    pub alive_poll: Duration,
    /// Re-check period while the process is parked by an operator.
    pub parked_poll: Duration,
    /// Pause after a failed launch before reporting `Fatal`.
    pub launch_backoff: Duration,
}

impl Default for Timings {
    fn default() -> Self {
        PollConfig::default().into()
    }
}

impl From<PollConfig> for Timings {
    fn from(poll: PollConfig) -> Self {
        Self {
            alive_poll: Duration::from_millis(poll.alive_interval_ms),
            parked_poll: Duration::from_millis(poll.parked_interval_ms),
            launch_backoff: Duration::from_millis(poll.launch_backoff_ms),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ManagerConfig {
    #[serde(default = "default_serve_addr")]
    pub serve_addr: String,
    #[serde(default)]
    pub poll: PollConfig,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self { serve_addr: default_serve_addr(), poll: PollConfig::default() }
    }
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default, rename = "manager_config")]
    pub manager: ManagerConfig,
    #[serde(default, rename = "process_configs")]
    pub processes: BTreeMap<String, ProcessConfig>,
}

impl Config {
    pub fn from_yaml(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    /// Rejects entries that could never be launched.
    pub fn validate(&self) -> Result<()> {
        for (name, proc_cfg) in &self.processes {
            if name.trim().is_empty() {
                return Err(SupervisorError::InvalidConfig("empty process name".to_string()));
            }
            if proc_cfg.command.trim().is_empty() {
                return Err(SupervisorError::InvalidConfig(format!(
                    "process `{}` has no command",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn timings(&self) -> Timings {
        self.manager.poll.into()
    }
}



/*
    @@@
    @parser();
    . Reads the content of the YAML config into a String. An I/O error (file not found, permission denied, etc.) is returned as ConfigRead.
    . Hands the raw YAML text to serde_yaml, which maps it into the Config struct. Malformed YAML is returned as ConfigParse.
*/
pub fn parser(path: &str) -> Result<Config> {
    let yaml_file = fs::read_to_string(path).map_err(|source| SupervisorError::ConfigRead {
        path: path.to_string(),
        source,
    })?;
    Config::from_yaml(&yaml_file)
}
