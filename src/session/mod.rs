//! Session orchestration: the run state machine, the sequential scheduler,
//! and the parallel scheduler.

pub mod parallel;
pub mod runner;
pub mod state;

pub use runner::{run_suite, SessionConfig, SessionRunner};
pub use state::{AbortHandle, SessionPhase, SessionState, TestPhase};
