/// State management module
///
/// Frame loop lifecycle and the explicit match session context that the
/// loop threads through every iteration.

pub mod process_state;
pub mod session;

pub use process_state::{ProcessState, ProcessStateMachine, Transition, TransitionError};
pub use session::{Lineup, MatchSession};
