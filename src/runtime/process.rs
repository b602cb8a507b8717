use crate::error::{Result, SupervisorError};
use crate::parse::{ProcessConfig, Timings};
use crate::runtime::launch::build_command;
use crate::runtime::state::ProcessState;
use crate::runtime::supervised::{ProcessInfo, Supervised};
use async_trait::async_trait;
use chrono::Utc;
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex, Notify};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

// Everything the per-process lock protects.
struct Inner {
    state: ProcessState,
    // Present only while a launched child has not been reaped.
    pid: Option<Pid>,
    start_time: i64,
    stop_time: i64,
    user_stopped: bool,
}

/// One supervised program and its restart loop.
///
/// The supervising task polls liveness on a fixed cadence and respawns the
/// child whenever it is neither alive nor parked. Each launch runs on its own
/// task that owns the OS child until it has been reaped.
pub struct Process {
    name: String,
    config: Arc<ProcessConfig>,
    timings: Timings,
    inner: Mutex<Inner>,
    exit_requested: AtomicBool,
    wake: Notify,
    finished: watch::Sender<bool>,
}

impl Process {
    fn new(name: String, config: Arc<ProcessConfig>, timings: Timings) -> Self {
        let (finished, _) = watch::channel(false);
        Self {
            name,
            config,
            timings,
            inner: Mutex::new(Inner {
                state: ProcessState::Stopped,
                pid: None,
                start_time: 0,
                stop_time: 0,
                user_stopped: false,
            }),
            exit_requested: AtomicBool::new(false),
            wake: Notify::new(),
            finished,
        }
    }

    /// Builds the process and starts its supervising task. Must be called
    /// from inside a tokio runtime.
    pub fn launch(name: impl Into<String>, config: Arc<ProcessConfig>, timings: Timings) -> Arc<Self> {
        let process = Arc::new(Self::new(name.into(), config, timings));
        tokio::spawn(Arc::clone(&process).supervise());
        process
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn exit_requested(&self) -> bool {
        self.exit_requested.load(Ordering::SeqCst)
    }

    /// Direct OS check: a child is held and a null signal reaches it.
    pub async fn is_alive(&self) -> bool {
        let inner = self.inner.lock().await;
        inner.pid.is_some_and(|pid| kill(pid, None).is_ok())
    }

    fn transition(&self, inner: &mut Inner, next: ProcessState) {
        debug_assert!(
            inner.state.can_transition_to(next),
            "illegal transition {} -> {}",
            inner.state,
            next
        );
        debug!(process = %self.name, from = %inner.state, to = %next, "state change");
        inner.state = next;
    }

    // Sleeps for `period`, cut short by `up` or `request_exit`.
    async fn pause(&self, period: Duration) {
        tokio::select! {
            _ = sleep(period) => {}
            _ = self.wake.notified() => {}
        }
    }


    /*
        @@@
        @supervise();
        . Alive: re-check after the alive interval. Parked: re-check after the parked interval.
        . Otherwise attempts one spawn and waits an alive interval before deciding again.
        . Once exit is requested, SIGKILLs whatever child is still held and reports completion.
    */
    async fn supervise(self: Arc<Self>) {
        debug!(process = %self.name, "supervising task started");
        while !self.exit_requested() {
            if self.is_alive().await {
                self.pause(self.timings.alive_poll).await;
                continue;
            }
            if self.is_user_stopped().await {
                self.pause(self.timings.parked_poll).await;
                continue;
            }
            self.start().await;
            self.pause(self.timings.alive_poll).await;
        }

        {
            let inner = self.inner.lock().await;
            if let Some(pid) = inner.pid {
                let res = kill(pid, Signal::SIGKILL);
                debug!(process = %self.name, pid = pid.as_raw(), result = ?res, "final kill");
            }
        }
        info!(process = %self.name, "supervising task exited");
        self.finished.send_replace(true);
    }

    // Accepts only from Stopped/Exited/Fatal and flips to Starting under the
    // lock; all I/O happens on the spawned task.
    async fn start(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().await;
            if self.exit_requested() || !inner.state.can_start() {
                return;
            }
            self.transition(&mut inner, ProcessState::Starting);
        }
        tokio::spawn(Arc::clone(self).spawn_and_wait());
    }


    /*
        @@@
        @spawn_and_wait();
        . Builds the command (log targets, identity, environment) on the blocking pool and launches it.
        . Launch failure: waits the launch backoff, then reports Fatal. The supervising loop retries later.
        . Launch success: Running until the child is reaped, then Exited (or Fatal if waiting itself failed).
        . A stop that arrived while Starting is applied as soon as the pid is known.
    */
    async fn spawn_and_wait(self: Arc<Self>) {
        if self.exit_requested() {
            let mut inner = self.inner.lock().await;
            debug!(process = %self.name, "torn down before launch");
            self.transition(&mut inner, ProcessState::Fatal);
            return;
        }

        // Log-file opens and passwd/group lookups may block for a long time.
        let name = self.name.clone();
        let config = Arc::clone(&self.config);
        let mut command = match tokio::task::spawn_blocking(move || build_command(&name, &config)).await {
            Ok(command) => command,
            Err(e) => {
                error!(process = %self.name, error = %e, "preparing launch failed");
                self.launch_failed().await;
                return;
            }
        };
        let spawned = command.spawn();
        drop(command);

        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                error!(process = %self.name, command = %self.config.command, error = %e, "start fail");
                self.launch_failed().await;
                return;
            }
        };

        let pid = child.id().map(|id| Pid::from_raw(id as i32));
        let parked = {
            let mut inner = self.inner.lock().await;
            inner.pid = pid;
            inner.start_time = Utc::now().timestamp();
            self.transition(&mut inner, ProcessState::Running);
            inner.user_stopped
        };
        info!(process = %self.name, pid = ?pid.map(Pid::as_raw), "running");

        // Exit may have been requested after the final kill already ran.
        if self.exit_requested() {
            warn!(process = %self.name, "exit requested during launch, killing child");
            let _ = child.start_kill();
        } else if parked {
            warn!(process = %self.name, "stop requested during launch, terminating child");
            self.terminate().await;
        }

        let outcome = child.wait().await;

        let mut inner = self.inner.lock().await;
        inner.pid = None;
        inner.stop_time = Utc::now().timestamp();
        match outcome {
            Ok(status) => {
                self.transition(&mut inner, ProcessState::Exited);
                info!(process = %self.name, status = %status, "exited");
            }
            Err(e) => {
                self.transition(&mut inner, ProcessState::Fatal);
                error!(process = %self.name, error = %e, "wait failed");
            }
        }
        debug!(
            process = %self.name,
            start = inner.start_time,
            stop = inner.stop_time,
            "spawn attempt finished"
        );
    }

    async fn launch_failed(&self) {
        sleep(self.timings.launch_backoff).await;
        let mut inner = self.inner.lock().await;
        inner.pid = None;
        self.transition(&mut inner, ProcessState::Fatal);
    }

    // SIGCONT lets a job-control-stopped child act on the SIGTERM.
    async fn terminate(&self) {
        let term = self.deliver(Signal::SIGTERM as i32).await;
        let cont = self.deliver(Signal::SIGCONT as i32).await;
        debug!(process = %self.name, term = ?term.err(), cont = ?cont.err(), "terminate");
    }

    async fn deliver(&self, signo: i32) -> Result<()> {
        let inner = self.inner.lock().await;
        let pid = inner
            .pid
            .ok_or_else(|| SupervisorError::NotRunning(self.name.clone()))?;
        debug!(process = %self.name, pid = pid.as_raw(), signal = signo, "fwd signal");
        send_signal(pid, signo).map_err(|source| match source {
            Errno::EINVAL => SupervisorError::InvalidSignal(signo),
            source => SupervisorError::SignalDelivery {
                name: self.name.clone(),
                source,
            },
        })
    }
}

/// Sends `signo` as-is; `0` only checks that the pid can be signalled.
fn send_signal(pid: Pid, signo: i32) -> nix::Result<()> {
    if signo == 0 {
        return kill(pid, None);
    }
    match Signal::try_from(signo) {
        Ok(sig) => kill(pid, sig),
        // Real-time signals have no `Signal` variant.
        Err(_) => Errno::result(unsafe { nix::libc::kill(pid.as_raw(), signo) }).map(drop),
    }
}

#[async_trait]
impl Supervised for Process {
    fn name(&self) -> &str {
        &self.name
    }

    async fn state(&self) -> ProcessState {
        self.inner.lock().await.state
    }

    async fn info(&self) -> ProcessInfo {
        let inner = self.inner.lock().await;
        ProcessInfo {
            name: self.name.clone(),
            state: inner.state,
            pid: inner.pid.map(Pid::as_raw),
            start_time: inner.start_time,
            stop_time: inner.stop_time,
            user_stopped: inner.user_stopped,
        }
    }

    async fn is_user_stopped(&self) -> bool {
        self.inner.lock().await.user_stopped
    }

    async fn up(&self) {
        let mut inner = self.inner.lock().await;
        if inner.user_stopped {
            inner.user_stopped = false;
            self.wake.notify_one();
        }
        debug!(process = %self.name, "up");
    }

    async fn down(&self) {
        let already_stopped = {
            let mut inner = self.inner.lock().await;
            std::mem::replace(&mut inner.user_stopped, true)
        };
        if already_stopped {
            return;
        }
        debug!(process = %self.name, "down");
        self.terminate().await;
    }

    async fn signal(&self, signo: i32) -> Result<()> {
        self.deliver(signo).await
    }

    fn request_exit(&self) {
        self.exit_requested.store(true, Ordering::SeqCst);
        self.wake.notify_one();
    }

    async fn finished(&self) {
        let mut rx = self.finished.subscribe();
        let _ = rx.wait_for(|done| *done).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fast() -> Timings {
        Timings {
            alive_poll: Duration::from_millis(20),
            parked_poll: Duration::from_millis(40),
            launch_backoff: Duration::from_millis(100),
        }
    }

    async fn wait_until<F, Fut>(timeout: Duration, mut check: F) -> bool
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = bool>,
    {
        tokio::time::timeout(timeout, async {
            while !check().await {
                sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .is_ok()
    }

    #[tokio::test]
    async fn test_new_process_starts_stopped() {
        let p = Process::new("idle".into(), Arc::new(ProcessConfig::new("/bin/true")), fast());
        let info = p.info().await;
        assert_eq!(info.state, ProcessState::Stopped);
        assert_eq!(info.pid, None);
        assert_eq!(info.start_time, 0);
        assert_eq!(info.stop_time, 0);
        assert!(!info.user_stopped);
        assert!(!p.is_alive().await);
    }

    #[tokio::test]
    async fn test_signal_without_child_is_not_running() {
        let p = Process::new("idle".into(), Arc::new(ProcessConfig::new("/bin/true")), fast());
        assert!(p.signal(0).await.unwrap_err().is_not_running());
        assert!(p.signal(15).await.unwrap_err().is_not_running());
        assert_eq!(p.state().await, ProcessState::Stopped);
    }

    #[tokio::test]
    async fn test_up_down_flag() {
        let p = Process::new("idle".into(), Arc::new(ProcessConfig::new("/bin/true")), fast());
        p.down().await;
        assert!(p.is_user_stopped().await);
        p.down().await;
        assert!(p.is_user_stopped().await);
        p.up().await;
        assert!(!p.is_user_stopped().await);
    }

    #[tokio::test]
    async fn test_launch_runs_and_tears_down() {
        let cfg = ProcessConfig::new("/bin/sleep").with_args(["30"]);
        let p = Process::launch("sleeper", Arc::new(cfg), fast());
        assert!(wait_until(Duration::from_secs(5), || async { p.is_alive().await }).await);

        let pid = p.info().await.pid.unwrap();
        p.request_exit();
        tokio::time::timeout(Duration::from_secs(5), p.finished()).await.unwrap();
        assert!(wait_until(Duration::from_secs(5), || async { p.info().await.pid.is_none() }).await);
        assert!(kill(Pid::from_raw(pid), None).is_err());
    }

    #[tokio::test]
    async fn test_invalid_signal_number() {
        let cfg = ProcessConfig::new("/bin/sleep").with_args(["30"]);
        let p = Process::launch("sleeper", Arc::new(cfg), fast());
        assert!(wait_until(Duration::from_secs(5), || async { p.is_alive().await }).await);

        let err = p.signal(9999).await.unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidSignal(9999)));
        let err = p.signal(-3).await.unwrap_err();
        assert!(matches!(err, SupervisorError::InvalidSignal(-3)));
        assert!(p.signal(0).await.is_ok());

        p.request_exit();
        p.finished().await;
    }

    #[tokio::test]
    async fn test_realtime_signal_is_forwarded() {
        let cfg = ProcessConfig::new("/bin/sleep").with_args(["30"]);
        let p = Process::launch("sleeper", Arc::new(cfg), fast());
        assert!(wait_until(Duration::from_secs(5), || async { p.is_alive().await }).await);
        let pid = p.info().await.pid.unwrap();

        // SIGRTMIN+6 on Linux; the default action terminates the child
        p.signal(40).await.unwrap();
        assert!(
            wait_until(Duration::from_secs(5), || async {
                p.info().await.pid.is_some_and(|new_pid| new_pid != pid)
            })
            .await
        );

        p.request_exit();
        p.finished().await;
    }
}
