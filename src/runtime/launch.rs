use crate::error::{Result, SupervisorError};
use crate::parse::ProcessConfig;
use nix::unistd::{Gid, Group, Uid, User};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, warn};


/*
    @@@
    @open_log_target();
    . Opens the configured path in append+create mode (0600) so restarts never truncate earlier output.
    . A missing path means "discard". An open failure is logged and also falls back to discard; it never fails the spawn.
*/
pub fn open_log_target(process: &str, stream: &str, path: Option<&str>) -> Stdio {
    let Some(path) = path.filter(|p| !p.trim().is_empty()) else {
        return Stdio::null();
    };

    match OpenOptions::new().append(true).create(true).mode(0o600).open(path) {
        Ok(file) => Stdio::from(file),
        Err(e) => {
            warn!(process = %process, stream, path, error = %e, "log target unavailable, discarding output");
            Stdio::null()
        }
    }
}


/*
    @@@
    @resolve_identity();
    . Accepts "user" or "user:group" and looks both up in the system databases.
    . Without an explicit group the user's primary group is used.
*/
pub fn resolve_identity(spec: &str) -> Result<(Uid, Gid)> {
    let (user_name, group_name) = match spec.split_once(':') {
        Some((user, group)) => (user.trim(), Some(group.trim())),
        None => (spec.trim(), None),
    };

    let user = User::from_name(user_name)?
        .ok_or_else(|| SupervisorError::UnknownUser(user_name.to_string()))?;

    let gid = match group_name.filter(|g| !g.is_empty()) {
        Some(name) => {
            Group::from_name(name)?
                .ok_or_else(|| SupervisorError::UnknownGroup(name.to_string()))?
                .gid
        }
        None => user.gid,
    };

    Ok((user.uid, gid))
}


/// Splits `KEY=VALUE` entries; entries without `=` are skipped.
fn parse_envs<I, S>(entries: I) -> impl Iterator<Item = (String, String)>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    entries.into_iter().filter_map(|entry| {
        entry
            .as_ref()
            .split_once('=')
            .map(|(k, v)| (k.to_string(), v.to_string()))
    })
}

/// Overlays configured overrides on an inherited environment; overrides win.
pub fn merge_envs<I>(inherited: I, overrides: &[String]) -> HashMap<String, String>
where
    I: IntoIterator<Item = (String, String)>,
{
    let mut merged: HashMap<String, String> = inherited.into_iter().collect();
    merged.extend(parse_envs(overrides));
    merged
}


/*
    @@@
    @build_command();
    . Wires stdout/stderr to the configured log targets and stdin to the null device.
    . Applies the identity override when it resolves; otherwise keeps the supervisor's own identity.
    . Replaces the environment with the supervisor's own environment overlaid by the configured pairs.
*/
pub fn build_command(process: &str, cfg: &ProcessConfig) -> Command {
    let mut cmd = Command::new(&cfg.command);
    cmd.args(&cfg.args)
        .stdin(Stdio::null())
        .stdout(open_log_target(process, "stdout", cfg.stdout_path.as_deref()))
        .stderr(open_log_target(process, "stderr", cfg.stderr_path.as_deref()));

    if let Some(spec) = cfg.identity.as_deref().filter(|s| !s.trim().is_empty()) {
        match resolve_identity(spec) {
            Ok((uid, gid)) => {
                debug!(process = %process, user = spec, uid = uid.as_raw(), gid = gid.as_raw(), "dropping privileges");
                cmd.uid(uid.as_raw()).gid(gid.as_raw());
            }
            Err(e) => {
                error!(process = %process, user = spec, error = %e, "identity lookup failed, running as supervisor user");
            }
        }
    }

    if cfg.soft_limit.limit_file_descriptor > 0 {
        debug!(
            process = %process,
            limit_file_descriptor = cfg.soft_limit.limit_file_descriptor,
            "resource limits are not enforced"
        );
    }

    cmd.env_clear().envs(merge_envs(std::env::vars(), &cfg.envs));
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn vars(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_merge_envs_override_wins() {
        let inherited = vars(&[("PATH", "/usr/bin"), ("HOME", "/root")]);
        let merged = merge_envs(inherited, &["HOME=/srv".to_string(), "PORT=80".to_string()]);
        assert_eq!(merged["PATH"], "/usr/bin");
        assert_eq!(merged["HOME"], "/srv");
        assert_eq!(merged["PORT"], "80");
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_merge_envs_later_override_wins_and_skips_malformed() {
        let merged = merge_envs(
            Vec::new(),
            &[
                "A=1".to_string(),
                "garbage".to_string(),
                "A=2".to_string(),
                "B=x=y".to_string(),
                "EMPTY=".to_string(),
            ],
        );
        assert_eq!(merged["A"], "2");
        assert_eq!(merged["B"], "x=y");
        assert_eq!(merged["EMPTY"], "");
        assert!(!merged.contains_key("garbage"));
    }

    #[test]
    fn test_resolve_identity_root() {
        let (uid, gid) = resolve_identity("root").unwrap();
        assert_eq!(uid.as_raw(), 0);
        assert_eq!(gid.as_raw(), 0);
    }

    #[test]
    fn test_resolve_identity_unknown_user() {
        let err = resolve_identity("no-such-user-here").unwrap_err();
        assert!(matches!(err, SupervisorError::UnknownUser(name) if name == "no-such-user-here"));
    }

    #[test]
    fn test_resolve_identity_unknown_group() {
        let err = resolve_identity("root:no-such-group-here").unwrap_err();
        assert!(matches!(err, SupervisorError::UnknownGroup(_)));
    }

    #[test]
    #[traced_test]
    fn test_unopenable_log_target_is_discarded() {
        let _stdio = open_log_target("web", "stdout", Some("/nonexistent-dir/x/web.out"));
        assert!(logs_contain("log target unavailable"));
    }

    #[test]
    fn test_log_target_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.log");
        std::fs::write(&path, "first\n").unwrap();
        let _stdio = open_log_target("web", "stdout", path.to_str());
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\n");
    }
}
