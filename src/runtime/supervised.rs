use crate::error::Result;
use crate::runtime::state::ProcessState;
use async_trait::async_trait;
use serde::Serialize;

/// Point-in-time view of one supervised process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProcessInfo {
    pub name: String,
    pub state: ProcessState,
    pub pid: Option<i32>,
    /// Epoch seconds of the last successful launch, zero if never launched.
    pub start_time: i64,
    /// Epoch seconds of the last observed exit, zero if never exited.
    pub stop_time: i64,
    pub user_stopped: bool,
}

/// What the registry may do with a supervised process.
#[async_trait]
pub trait Supervised: Send + Sync {
    fn name(&self) -> &str;

    async fn state(&self) -> ProcessState;

    async fn info(&self) -> ProcessInfo;

    /// Parked by an operator.
    async fn is_user_stopped(&self) -> bool;

    /// Clears the operator park.
    async fn up(&self);

    /// Parks the process and asks the live child to terminate.
    async fn down(&self);

    /// Delivers a raw signal number to the live child; `0` only checks liveness.
    async fn signal(&self, signo: i32) -> Result<()>;

    /// Tells the supervising task to tear down. Never blocks.
    fn request_exit(&self);

    /// Resolves once the supervising task has finished its teardown.
    async fn finished(&self);
}
