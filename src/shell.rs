use crate::control::Registry;
use rustyline::completion::{Completer, Pair};
use rustyline::highlight::Highlighter;
use rustyline::hint::Hinter;
use rustyline::validate::Validator;
use rustyline::{error::ReadlineError, Config, Context, Editor, Helper};
use rustyline::history::DefaultHistory;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;

const COMMANDS: [&str; 6] = ["status", "info", "start", "stop", "signal", "exit"];


/*
    @@@
    @CmdCompleter;
    . Prefix completion: the first word completes against the command list, later words against process names.
    . Process names are captured when the shell starts.
*/
struct CmdCompleter {
    commands: Vec<String>,
    processes: Vec<String>,
}
impl Helper for CmdCompleter {}
impl Hinter for CmdCompleter {
    type Hint = String;
}
impl Highlighter for CmdCompleter {}
impl Validator for CmdCompleter {}
impl Completer for CmdCompleter {
    type Candidate = Pair;
    fn complete(&self, line: &str, pos: usize, _ctx: &Context<'_>) -> Result<(usize, Vec<Pair>), ReadlineError> {
        let line = &line[..pos];
        let start = line.rfind(' ').map(|i| i + 1).unwrap_or(0);
        let word = &line[start..];
        let pool = if start == 0 { &self.commands } else { &self.processes };
        let matches = pool
            .iter()
            .filter(|candidate| candidate.starts_with(word))
            .map(|candidate| Pair { display: candidate.clone(), replacement: candidate.clone() })
            .collect();
        Ok((start, matches))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Status,
    Info,
    Start(String),
    Stop(String),
    Signal(String, i32),
    Exit,
    Empty,
    Usage(&'static str),
    Unknown(String),
}

/// Turns one input line into a command. Never fails; bad input maps to
/// `Usage` or `Unknown`.
pub fn parse_command(line: &str) -> ShellCommand {
    let mut words = line.split_whitespace();
    let Some(head) = words.next() else {
        return ShellCommand::Empty;
    };
    let name = words.next().map(str::to_string);
    let extra = words.next();

    match (head, name) {
        ("status", _) => ShellCommand::Status,
        ("info", _) => ShellCommand::Info,
        ("exit" | "quit", _) => ShellCommand::Exit,
        ("start", Some(name)) => ShellCommand::Start(name),
        ("stop", Some(name)) => ShellCommand::Stop(name),
        ("signal", Some(name)) => match extra.map(str::parse::<i32>) {
            None => ShellCommand::Signal(name, 0),
            Some(Ok(sig)) => ShellCommand::Signal(name, sig),
            Some(Err(_)) => ShellCommand::Usage("signal <name> [number]"),
        },
        ("start", None) => ShellCommand::Usage("start <name>"),
        ("stop", None) => ShellCommand::Usage("stop <name>"),
        ("signal", None) => ShellCommand::Usage("signal <name> [number]"),
        (other, _) => ShellCommand::Unknown(other.to_string()),
    }
}

// Runs one command against the registry; returns false when the shell should close.
fn execute(registry: &Registry, runtime: &Handle, command: ShellCommand) -> bool {
    match command {
        ShellCommand::Status => {
            for (name, label) in runtime.block_on(registry.status_snapshot()) {
                println!("{:<24} {}", name, label);
            }
        }
        ShellCommand::Info => {
            for (name, info) in runtime.block_on(registry.details()) {
                println!(
                    "{:<24} {:<9} pid={:<8} start={} stop={} parked={}",
                    name,
                    info.state,
                    info.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".into()),
                    info.start_time,
                    info.stop_time,
                    info.user_stopped
                );
            }
        }
        ShellCommand::Start(name) => runtime.block_on(registry.start_by_name(&name)),
        ShellCommand::Stop(name) => runtime.block_on(registry.stop_by_name(&name)),
        ShellCommand::Signal(name, sig) => {
            if let Err(e) = runtime.block_on(registry.forward_signal(&name, sig)) {
                println!("{}", e);
            }
        }
        ShellCommand::Usage(usage) => println!("usage: {}", usage),
        ShellCommand::Unknown(other) => println!("Unknown command: {}", other),
        ShellCommand::Empty => {}
        ShellCommand::Exit => return false,
    }
    true
}


/*
    @@@
    @run_shell();
    . Blocking readline loop; call it from a blocking thread (spawn_blocking) so the runtime keeps supervising.
    . Each command is driven to completion on the given runtime handle.
    . Returns on `exit`, Ctrl-C or Ctrl-D, saving history when a path is given.
*/
pub fn run_shell(registry: Arc<Registry>, runtime: Handle, history: Option<PathBuf>) -> rustyline::Result<()> {
    let config = Config::builder().build();
    let mut rl: Editor<CmdCompleter, DefaultHistory> = Editor::with_config(config)?;
    rl.set_helper(Some(CmdCompleter {
        commands: COMMANDS.iter().map(|c| c.to_string()).collect(),
        processes: runtime.block_on(registry.names()),
    }));
    if let Some(path) = &history {
        let _ = rl.load_history(path);
    }

    loop {
        match rl.readline("daemon-manager> ") {
            Ok(line) => {
                let input = line.trim();
                if !input.is_empty() {
                    rl.add_history_entry(input)?;
                }
                if !execute(&registry, &runtime, parse_command(input)) {
                    break;
                }
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(err) => {
                eprintln!("Error: {:?}", err);
                break;
            }
        }
    }

    if let Some(path) = &history {
        rl.save_history(path)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_command("status"), ShellCommand::Status);
        assert_eq!(parse_command("  info  "), ShellCommand::Info);
        assert_eq!(parse_command("exit"), ShellCommand::Exit);
        assert_eq!(parse_command("quit"), ShellCommand::Exit);
        assert_eq!(parse_command(""), ShellCommand::Empty);
        assert_eq!(parse_command("start web"), ShellCommand::Start("web".into()));
        assert_eq!(parse_command("stop   web"), ShellCommand::Stop("web".into()));
    }

    #[test]
    fn test_parse_signal() {
        assert_eq!(parse_command("signal web"), ShellCommand::Signal("web".into(), 0));
        assert_eq!(parse_command("signal web 15"), ShellCommand::Signal("web".into(), 15));
        assert!(matches!(parse_command("signal web term"), ShellCommand::Usage(_)));
    }

    #[test]
    fn test_parse_missing_name_and_unknown() {
        assert_eq!(parse_command("start"), ShellCommand::Usage("start <name>"));
        assert_eq!(parse_command("stop"), ShellCommand::Usage("stop <name>"));
        assert_eq!(parse_command("reload"), ShellCommand::Unknown("reload".into()));
    }

    #[test]
    fn test_execute_exit_closes_shell() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let registry = Registry::default();
        assert!(!execute(&registry, runtime.handle(), ShellCommand::Exit));
        assert!(execute(&registry, runtime.handle(), ShellCommand::Stop("ghost".into())));
        assert!(execute(&registry, runtime.handle(), ShellCommand::Signal("ghost".into(), 0)));
    }
}
