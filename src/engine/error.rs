use ulid::Ulid;

use crate::model::{Ms, TimeWindow};

/// Scheduling failures. Every variant carries enough structure for the
/// caller to present a precise message; none are retried internally.
#[derive(Debug)]
pub enum EngineError {
    /// start >= end, or timestamps outside the sane range. Client error.
    InvalidWindow { start: Ms, end: Ms },
    /// The candidate window overlaps active reservations on the room.
    /// Carries every conflicting reservation id.
    Conflict {
        room_id: Ulid,
        window: TimeWindow,
        conflicting: Vec<Ulid>,
    },
    NotFound(Ulid),
    AlreadyExists(Ulid),
    /// Room write-lock wait exceeded the configured bound. Retry-safe.
    Busy(Ulid),
    LimitExceeded(&'static str),
    /// Durability failure. The operation was not applied anywhere.
    /// The caller decides whether to retry.
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::InvalidWindow { start, end } => {
                write!(f, "invalid window [{start}, {end}): start must be before end")
            }
            EngineError::Conflict {
                room_id,
                window,
                conflicting,
            } => {
                let ids: Vec<String> = conflicting.iter().map(|id| id.to_string()).collect();
                write!(
                    f,
                    "window [{}, {}) on room {room_id} conflicts with: {}",
                    window.start,
                    window.end,
                    ids.join(", ")
                )
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::Busy(room_id) => {
                write!(f, "room {room_id} is busy: write-lock wait timed out")
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
