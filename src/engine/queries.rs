use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

fn validate_range(range: &TimeWindow) -> Result<(), EngineError> {
    if range.start >= range.end {
        return Err(EngineError::InvalidWindow {
            start: range.start,
            end: range.end,
        });
    }
    if range.duration_ms() > MAX_QUERY_WINDOW_MS {
        return Err(EngineError::LimitExceeded("query window too wide"));
    }
    Ok(())
}

impl Engine {
    pub async fn get_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let room_id = self
            .ledger
            .room_for_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        let room = self
            .ledger
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let guard = room.read().await;
        guard.get(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// Active reservations on the room intersecting the range, start
    /// ascending. The read lock gives a single consistent snapshot; a
    /// write committing concurrently is either fully visible or not at all.
    pub async fn list_active_for_room(
        &self,
        room_id: Ulid,
        range: TimeWindow,
    ) -> Result<Vec<Reservation>, EngineError> {
        validate_range(&range)?;
        let Some(room) = self.ledger.get_room(&room_id) else {
            return Ok(Vec::new());
        };
        let guard = room.read().await;
        Ok(guard.active_overlapping(&range).cloned().collect())
    }

    /// `{day, booked}` for calendar rendering, answered from the derived
    /// index. Writes update the index before releasing the room lock, so a
    /// caller reads its own committed writes.
    pub async fn query_availability(
        &self,
        room_id: Ulid,
        range: TimeWindow,
    ) -> Result<Vec<DayAvailability>, EngineError> {
        validate_range(&range)?;
        Ok(self.index.query(room_id, &range))
    }

    /// Recompute the room's availability projection from the ledger.
    /// Repair path for drift; also used by consistency tests.
    pub async fn rebuild_index(&self, room_id: Ulid) -> Result<(), EngineError> {
        let Some(room) = self.ledger.get_room(&room_id) else {
            self.index.forget_room(&room_id);
            return Ok(());
        };
        let guard = room.read().await;
        self.index.rebuild(&guard);
        Ok(())
    }
}
