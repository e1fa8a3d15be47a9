use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{now_ms, resolve, validate_window, Decision};
use super::{Engine, EngineError};

impl Engine {
    /// Book a room. Decide → commit happens entirely under the room's write
    /// lock, so two concurrent overlapping requests can never both succeed.
    pub async fn create_reservation(
        &self,
        id: Ulid,
        room_id: Ulid,
        window: TimeWindow,
        requester: String,
        note: Option<String>,
    ) -> Result<Reservation, EngineError> {
        validate_window(&window)?;
        if requester.len() > MAX_REQUESTER_LEN {
            return Err(EngineError::LimitExceeded("requester too long"));
        }
        if let Some(ref n) = note
            && n.len() > MAX_NOTE_LEN
        {
            return Err(EngineError::LimitExceeded("note too long"));
        }
        // Claiming the id up front serializes racing creates that share a
        // client-supplied id, including creates against different rooms.
        if !self.ledger.claim_reservation_id(id, room_id) {
            return Err(EngineError::AlreadyExists(id));
        }
        match self.create_claimed(id, room_id, window, requester, note).await {
            Ok(reservation) => Ok(reservation),
            Err(e) => {
                self.ledger.release_reservation_id(&id);
                Err(e)
            }
        }
    }

    async fn create_claimed(
        &self,
        id: Ulid,
        room_id: Ulid,
        window: TimeWindow,
        requester: String,
        note: Option<String>,
    ) -> Result<Reservation, EngineError> {
        if self.ledger.get_room(&room_id).is_none() && self.ledger.room_count() >= MAX_ROOMS {
            return Err(EngineError::LimitExceeded("too many rooms"));
        }

        // Unknown rooms are rooms with zero reservations, so always admit.
        let room = self.ledger.get_or_create_room(room_id);
        let mut guard = self.room_write(room, room_id).await?;
        if guard.reservations.len() >= MAX_RESERVATIONS_PER_ROOM {
            return Err(EngineError::LimitExceeded("too many reservations on room"));
        }

        let decision = resolve(&window, None, guard.active_overlapping(&window));
        if let Decision::Reject(conflicting) = decision {
            metrics::counter!(crate::observability::CONFLICTS_REJECTED_TOTAL).increment(1);
            return Err(EngineError::Conflict {
                room_id,
                window,
                conflicting,
            });
        }

        let now = now_ms();
        let event = Event::ReservationCreated {
            id,
            room_id,
            window,
            requester: requester.clone(),
            note: note.clone(),
            status: self.cfg.default_status,
            created_at: now,
            updated_at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        Ok(Reservation {
            id,
            room_id,
            window,
            requester,
            note,
            status: self.cfg.default_status,
            created_at: now,
            updated_at: now,
        })
    }

    /// Move an existing reservation to a new window, excluding its own id
    /// from the conflict check. Canceled or absent ids are `NotFound`.
    pub async fn reschedule_reservation(
        &self,
        id: Ulid,
        window: TimeWindow,
    ) -> Result<Reservation, EngineError> {
        validate_window(&window)?;
        let room_id = self
            .ledger
            .room_for_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        let room = self
            .ledger
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let mut guard = self.room_write(room, room_id).await?;

        let existing = guard.get(id).ok_or(EngineError::NotFound(id))?;
        if !existing.is_active() {
            // Canceled is terminal; changing the window means rebooking.
            return Err(EngineError::NotFound(id));
        }
        let mut updated = existing.clone();

        let decision = resolve(&window, Some(id), guard.active_overlapping(&window));
        if let Decision::Reject(conflicting) = decision {
            metrics::counter!(crate::observability::CONFLICTS_REJECTED_TOTAL).increment(1);
            return Err(EngineError::Conflict {
                room_id,
                window,
                conflicting,
            });
        }

        let now = now_ms();
        let event = Event::ReservationRescheduled {
            id,
            room_id,
            window,
            at: now,
        };
        self.persist_and_apply(&mut guard, &event).await?;

        updated.window = window;
        updated.updated_at = now;
        Ok(updated)
    }

    /// Pending → Confirmed. Idempotent on already-confirmed reservations;
    /// canceled or absent ids are `NotFound`.
    pub async fn confirm_reservation(&self, id: Ulid) -> Result<Reservation, EngineError> {
        let room_id = self
            .ledger
            .room_for_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        let room = self
            .ledger
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let mut guard = self.room_write(room, room_id).await?;

        let existing = guard.get(id).ok_or(EngineError::NotFound(id))?;
        match existing.status {
            ReservationStatus::Canceled => Err(EngineError::NotFound(id)),
            ReservationStatus::Confirmed => Ok(existing.clone()),
            ReservationStatus::Pending => {
                let mut updated = existing.clone();
                let now = now_ms();
                let event = Event::ReservationConfirmed { id, room_id, at: now };
                self.persist_and_apply(&mut guard, &event).await?;
                updated.status = ReservationStatus::Confirmed;
                updated.updated_at = now;
                Ok(updated)
            }
        }
    }

    /// Transition to Canceled. Idempotent: canceling an already-canceled
    /// reservation is a no-op success with no ledger change.
    pub async fn cancel_reservation(&self, id: Ulid) -> Result<(), EngineError> {
        let room_id = self
            .ledger
            .room_for_reservation(&id)
            .ok_or(EngineError::NotFound(id))?;
        let room = self
            .ledger
            .get_room(&room_id)
            .ok_or(EngineError::NotFound(room_id))?;
        let mut guard = self.room_write(room, room_id).await?;

        let existing = guard.get(id).ok_or(EngineError::NotFound(id))?;
        if !existing.is_active() {
            return Ok(());
        }

        let event = Event::ReservationCanceled {
            id,
            room_id,
            at: now_ms(),
        };
        self.persist_and_apply(&mut guard, &event).await
    }

    /// Administrative purge: destroy canceled records whose last transition
    /// is older than `cutoff`. Returns how many were purged. Rooms whose
    /// lock cannot be taken within the bound are skipped (next run catches
    /// them).
    pub async fn purge_canceled(&self, cutoff: Ms) -> Result<usize, EngineError> {
        let mut purged = 0usize;
        for room_id in self.ledger.room_ids() {
            let Some(room) = self.ledger.get_room(&room_id) else {
                continue;
            };
            let Ok(mut guard) = self.room_write(room, room_id).await else {
                continue;
            };
            let stale: Vec<Ulid> = guard
                .reservations
                .iter()
                .filter(|r| r.status == ReservationStatus::Canceled && r.updated_at < cutoff)
                .map(|r| r.id)
                .collect();
            for id in stale {
                let event = Event::ReservationPurged { id, room_id };
                self.persist_and_apply(&mut guard, &event).await?;
                purged += 1;
            }
        }
        Ok(purged)
    }
}
