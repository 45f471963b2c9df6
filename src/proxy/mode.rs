//! Mode state machine

use std::sync::atomic::{AtomicU8, Ordering};

use tracing::info;

use crate::config::Mode;

/// How a single intercepted request is handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Forward to the network, never touch fixtures
    Passthrough,
    /// Serve the stored fixture; a miss is an error
    Replay,
    /// Forward to the network and persist the result
    Record {
        /// Whether an existing fixture is being replaced
        overwrite: bool,
    },
}

/// Process-wide operating mode
///
/// Every mode is reachable from every other; transitions are unconditional.
#[derive(Debug)]
pub struct ModeController {
    mode: AtomicU8,
}

impl ModeController {
    /// Create a controller starting in `mode`
    #[must_use]
    pub fn new(mode: Mode) -> Self {
        Self {
            mode: AtomicU8::new(mode as u8),
        }
    }

    /// Current mode
    #[must_use]
    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Acquire))
    }

    /// Switch mode, returning the previous one
    pub fn set_mode(&self, mode: Mode) -> Mode {
        let previous = Mode::from_u8(self.mode.swap(mode as u8, Ordering::AcqRel));
        if previous != mode {
            info!("Recorder mode: {previous} -> {mode}");
        }
        previous
    }

    /// Record missing fixtures, replay existing ones
    pub fn record(&self) {
        self.set_mode(Mode::Record);
    }

    /// Serve fixtures only
    pub fn replay(&self) {
        self.set_mode(Mode::Replay);
    }

    /// Re-record every fixture
    pub fn rerecord(&self) {
        self.set_mode(Mode::Rerecord);
    }

    /// Bypass fixtures entirely
    pub fn bypass(&self) {
        self.set_mode(Mode::Bypass);
    }

    /// Alias of [`ModeController::bypass`]
    pub fn ignore(&self) {
        self.bypass();
    }

    /// Decide how to handle a request
    ///
    /// `ignored` is the result of the ignore predicate and overrides every
    /// mode. `has_fixture` is only consulted in [`Mode::Record`].
    pub fn plan<F>(mode: Mode, ignored: bool, has_fixture: F) -> Action
    where
        F: FnOnce() -> bool,
    {
        if ignored {
            return Action::Passthrough;
        }

        match mode {
            Mode::Bypass => Action::Passthrough,
            Mode::Replay => Action::Replay,
            Mode::Rerecord => Action::Record { overwrite: true },
            Mode::Record => {
                if has_fixture() {
                    Action::Replay
                } else {
                    Action::Record { overwrite: false }
                }
            }
        }
    }

    /// Whether a request is forwarded without computing its fixture address
    #[must_use]
    pub fn bypasses(mode: Mode, ignored: bool) -> bool {
        ignored || mode == Mode::Bypass
    }
}

impl Default for ModeController {
    fn default() -> Self {
        Self::new(Mode::Record)
    }
}
