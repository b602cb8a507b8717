use serde::Serialize;
use std::fmt;

/// Lifecycle state of one supervised process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProcessState {
    #[default]
    Stopped,
    Starting,
    Running,
    Exited,
    Fatal,
}

impl ProcessState {
    pub fn label(self) -> &'static str {
        match self {
            ProcessState::Stopped => "STOPPED",
            ProcessState::Starting => "STARTING",
            ProcessState::Running => "RUNNING",
            ProcessState::Exited => "EXITED",
            ProcessState::Fatal => "FATAL",
        }
    }

    /// States from which a spawn attempt may begin.
    pub fn can_start(self) -> bool {
        matches!(self, ProcessState::Stopped | ProcessState::Exited | ProcessState::Fatal)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, ProcessState::Exited | ProcessState::Fatal)
    }

    /// Whether `self -> next` is one of the supervision transitions.
    pub fn can_transition_to(self, next: ProcessState) -> bool {
        use ProcessState::*;
        matches!(
            (self, next),
            (Stopped | Exited | Fatal, Starting)
                | (Starting, Running)
                | (Starting, Fatal)
                | (Running, Exited)
                | (Running, Fatal)
        )
    }
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ProcessState::*;

    #[test]
    fn test_labels() {
        assert_eq!(Stopped.to_string(), "STOPPED");
        assert_eq!(Starting.label(), "STARTING");
        assert_eq!(Running.label(), "RUNNING");
        assert_eq!(Exited.label(), "EXITED");
        assert_eq!(Fatal.label(), "FATAL");
        assert_eq!(ProcessState::default(), Stopped);
    }

    #[test]
    fn test_serializes_as_label() {
        assert_eq!(serde_json::to_string(&Running).unwrap(), "\"RUNNING\"");
    }

    #[test]
    fn test_transition_table() {
        assert!(Stopped.can_transition_to(Starting));
        assert!(Exited.can_transition_to(Starting));
        assert!(Fatal.can_transition_to(Starting));
        assert!(Starting.can_transition_to(Running));
        assert!(Starting.can_transition_to(Fatal));
        assert!(Running.can_transition_to(Exited));
        assert!(Running.can_transition_to(Fatal));

        assert!(!Running.can_transition_to(Starting));
        assert!(!Starting.can_transition_to(Exited));
        assert!(!Exited.can_transition_to(Running));
        assert!(!Fatal.can_transition_to(Stopped));
    }

    #[test]
    fn test_can_start() {
        assert!(Stopped.can_start());
        assert!(Exited.can_start());
        assert!(Fatal.can_start());
        assert!(!Starting.can_start());
        assert!(!Running.can_start());
    }
}
