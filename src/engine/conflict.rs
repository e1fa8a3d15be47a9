use ulid::Ulid;

use crate::model::{Ms, Reservation, TimeWindow};

use super::EngineError;

pub(crate) fn now_ms() -> Ms {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_millis() as Ms
}

pub(crate) fn validate_window(window: &TimeWindow) -> Result<(), EngineError> {
    use crate::limits::*;
    if window.start >= window.end {
        return Err(EngineError::InvalidWindow {
            start: window.start,
            end: window.end,
        });
    }
    if window.start < MIN_VALID_TIMESTAMP_MS || window.end > MAX_VALID_TIMESTAMP_MS {
        return Err(EngineError::LimitExceeded("timestamp out of range"));
    }
    if window.duration_ms() > MAX_WINDOW_DURATION_MS {
        return Err(EngineError::LimitExceeded("window too wide"));
    }
    Ok(())
}

/// The resolver's verdict on a candidate window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Admit,
    /// Every active reservation the candidate overlaps, for diagnostics.
    Reject(Vec<Ulid>),
}

/// Pure conflict decision: test the candidate against the given active
/// reservations, skipping `exclude` (a reservation being rescheduled never
/// conflicts with itself). O(n) over the active set handed in; callers
/// pre-filter by range via the room's sorted scan.
pub fn resolve<'a, I>(candidate: &TimeWindow, exclude: Option<Ulid>, active: I) -> Decision
where
    I: IntoIterator<Item = &'a Reservation>,
{
    let mut conflicting = Vec::new();
    for r in active {
        if Some(r.id) == exclude {
            continue;
        }
        if candidate.overlaps(&r.window) {
            conflicting.push(r.id);
        }
    }
    if conflicting.is_empty() {
        Decision::Admit
    } else {
        Decision::Reject(conflicting)
    }
}
