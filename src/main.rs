use anyhow::Context;
use clap::Parser;
use daemon_manager::{api, logger, parse::parser, shell, Registry, Supervised};
use futures::stream::StreamExt;
use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook_tokio::Signals;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, Runtime};
use tokio::sync::oneshot;
use tokio::task::JoinError;
use tracing::{error, info, warn};

// Upper bound on waiting for supervising tasks to deliver their final kill.
const TEARDOWN_GRACE: Duration = Duration::from_secs(3);

#[derive(Parser, Debug)]
#[command(name = "daemon-manager", about = "Launches, restarts and signals configured daemons")]
struct Args {
    /// YAML config path
    #[arg(short = 'c', long = "config", default_value = "config.yaml")]
    config: String,

    /// log level in [trace|debug|info|warn|error]
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Write logs to a daily-rotating file in this directory instead of stdout
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Open an interactive console next to the HTTP control surface
    #[arg(long)]
    shell: bool,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _guard = logger::init_logging(logger::parse_level(&args.log_level), args.log_dir.as_deref())?;

    let runtime = Runtime::new().context("building tokio runtime")?;
    let result = runtime.block_on(run(args));
    // The console thread may still be parked in readline.
    runtime.shutdown_timeout(Duration::from_millis(200));
    result
}

async fn run(args: Args) -> anyhow::Result<()> {
    let cfg = parser(&args.config).with_context(|| format!("loading config {}", args.config))?;
    cfg.validate()?;

    let registry = Arc::new(Registry::new(cfg.timings()));
    for (name, proc_cfg) in &cfg.processes {
        registry.create(name, Arc::new(proc_cfg.clone())).await;
    }
    info!(count = cfg.processes.len(), "config loaded");

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let addr = cfg.manager.serve_addr.clone();
    let api_registry = Arc::clone(&registry);
    let mut server = tokio::spawn(async move {
        api::serve(&addr, api_registry, async {
            let _ = stop_rx.await;
        })
        .await
    });

    let shell_task = args.shell.then(|| {
        let shell_registry = Arc::clone(&registry);
        let handle = Handle::current();
        let history = args.log_dir.as_ref().map(|dir| dir.join("history.txt"));
        tokio::task::spawn_blocking(move || shell::run_shell(shell_registry, handle, history))
    });
    let shell_done = async move {
        match shell_task {
            Some(task) => task.await,
            None => futures::future::pending::<Result<rustyline::Result<()>, JoinError>>().await,
        }
    };

    let mut signals = Signals::new([SIGINT, SIGTERM, SIGQUIT]).context("installing signal handlers")?;
    let signals_handle = signals.handle();

    tokio::select! {
        Some(sig) = signals.next() => info!(signal = sig, "termination signal received"),
        res = &mut server => match res {
            Ok(Ok(())) => warn!("control surface stopped"),
            Ok(Err(e)) => error!(error = %e, "control surface failed"),
            Err(e) => error!(error = %e, "control surface task panicked"),
        },
        res = shell_done => match res {
            Ok(Ok(())) => info!("console closed"),
            Ok(Err(e)) => error!(error = %e, "console failed"),
            Err(e) => error!(error = %e, "console task panicked"),
        },
    }

    signals_handle.close();
    let _ = stop_tx.send(());

    let evicted = registry.shutdown().await;
    let drain = futures::future::join_all(evicted.iter().map(|p| p.finished()));
    if tokio::time::timeout(TEARDOWN_GRACE, drain).await.is_err() {
        warn!("some supervising tasks did not finish before exit");
    }

    if !server.is_finished() {
        let _ = tokio::time::timeout(Duration::from_secs(1), server).await;
    }
    info!("supervisor stopped");
    Ok(())
}
