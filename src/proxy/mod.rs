//! Interception and record/replay orchestration

mod intercept;
mod mode;
mod pending;
mod recorder;

pub use intercept::{install, installed, FixtureBody, Interceptor};
pub use mode::{Action, ModeController};
pub use pending::{PendingWrites, WriteGuard};
pub use recorder::{synthesize, Hooks, Ignore, Recorder, RecorderBuilder};
