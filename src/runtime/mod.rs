//! Per-process supervision: lifecycle states, the capability trait the
//! registry talks to, and the `Process` state machine itself.

pub mod launch;
pub mod process;
pub mod state;
pub mod supervised;

pub use process::Process;
pub use state::ProcessState;
pub use supervised::{ProcessInfo, Supervised};
