//! Session lifecycle states.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Where a session is in its lifecycle.
///
/// `Created -> Active -> Streaming -> Idle`, cycling `Idle -> Active` per
/// submitted prompt; any state may move to `Closed`, which is terminal.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum SessionState {
    /// Opened, no prompt submitted yet.
    Created,
    /// A prompt was accepted; the first model call has not started.
    Active,
    /// Model events are being produced.
    Streaming,
    /// The last turn's result was observed; ready for the next prompt.
    Idle,
    Closed,
}

impl SessionState {
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Created | Idle, Active)
                | (Active, Streaming)
                | (Active | Streaming, Idle)
                | (Created | Active | Streaming | Idle, Closed)
        )
    }

    /// Whether `submit` is accepted in this state.
    pub fn accepts_submit(self) -> bool {
        matches!(self, Self::Created | Self::Idle)
    }

    /// Whether a turn is in flight.
    pub fn is_busy(self) -> bool {
        matches!(self, Self::Active | Self::Streaming)
    }

    pub fn is_closed(self) -> bool {
        self == Self::Closed
    }
}
