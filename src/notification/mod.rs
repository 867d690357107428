//! Turns transaction outcomes into timed, animated feedback.

use serde::{
    Deserialize,
    Serialize,
};
use std::time::Duration;

pub mod animation;
pub mod classify;
pub mod outcome;
pub mod sequencer;

pub use animation::AnimationKey;
pub use classify::classify;
pub use outcome::{
    BattleOutcome,
    ExploreOutcome,
    ItemPurchase,
    MulticallOutcome,
    Outcome,
    StatUpgrades,
    SubOutcome,
    UpgradeSummary,
};
pub use sequencer::{
    NotificationSequencer,
    QueueId,
    SequencerState,
    SequencerTransition,
};

pub const DEFAULT_NOTIFICATION_DURATION: Duration = Duration::from_millis(2000);
pub const DEFAULT_ERROR_DURATION: Duration = Duration::from_millis(5000);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationTimings {
    pub standard: Duration,
    pub error: Duration,
}

impl Default for NotificationTimings {
    fn default() -> Self {
        Self {
            standard: DEFAULT_NOTIFICATION_DURATION,
            error: DEFAULT_ERROR_DURATION,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NotificationEvent {
    pub message: String,
    pub animation: Option<AnimationKey>,
    pub duration: Duration,
    pub is_error: bool,
}
