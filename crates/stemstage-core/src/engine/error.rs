use thiserror::Error;

use crate::types::TrackId;

/// Errors returned by engine operations
///
/// None of these are raised from inside the tick loop; they only answer
/// explicit requests (play before ready, unknown track ids, ...).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("Transport is not ready: tracks are still loading")]
    NotReady,

    #[error("Unknown track {0}")]
    UnknownTrack(TrackId),

    #[error("Song has {count} tracks, at most {max} are supported")]
    TooManyTracks { count: usize, max: usize },

    #[error("Session scheduler is not running")]
    SchedulerStopped,
}

pub type EngineResult<T> = Result<T, EngineError>;
