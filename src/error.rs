use nix::errno::Errno;
use thiserror::Error;

/// Errors surfaced by the supervisor core.
///
/// Only request-shaped calls return these. Failures inside a supervising
/// loop are logged and reflected through `ProcessState` instead.
#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("not found process: {0}")]
    NotFound(String),

    #[error("process not running: {0}")]
    NotRunning(String),

    #[error("invalid signal number: {0}")]
    InvalidSignal(i32),

    #[error("signal delivery to {name} failed: {source}")]
    SignalDelivery {
        name: String,
        #[source]
        source: Errno,
    },

    #[error("unknown user: {0}")]
    UnknownUser(String),

    #[error("unknown group: {0}")]
    UnknownGroup(String),

    #[error("identity lookup failed: {0}")]
    IdentityLookup(#[from] Errno),

    #[error("lost process name")]
    MissingName,

    #[error("failed to read config {path}: {source}")]
    ConfigRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl SupervisorError {
    /// Lookup failures against an unknown or stopped process.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SupervisorError::NotFound(_))
    }

    pub fn is_not_running(&self) -> bool {
        matches!(self, SupervisorError::NotRunning(_))
    }
}

pub type Result<T> = std::result::Result<T, SupervisorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SupervisorError::NotFound("web".to_string());
        assert_eq!(err.to_string(), "not found process: web");

        let err = SupervisorError::SignalDelivery {
            name: "web".to_string(),
            source: Errno::ESRCH,
        };
        assert!(err.to_string().starts_with("signal delivery to web failed"));
    }

    #[test]
    fn test_error_categorization() {
        assert!(SupervisorError::NotFound("a".into()).is_not_found());
        assert!(!SupervisorError::NotFound("a".into()).is_not_running());
        assert!(SupervisorError::NotRunning("a".into()).is_not_running());
        assert!(!SupervisorError::MissingName.is_not_found());
    }
}
