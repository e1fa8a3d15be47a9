use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::availability::AvailabilityIndex;

pub type SharedRoomState = Arc<RwLock<RoomState>>;

/// Authoritative reservation store. Owns every reservation record, keyed by
/// room; the availability index is only ever a projection of this state.
///
/// The ledger itself does not enforce the overlap invariant; that is the
/// scheduling service's job, which uses the ledger as its read/write surface
/// while holding the room's write lock.
pub struct Ledger {
    rooms: DashMap<Ulid, SharedRoomState>,
    /// Reverse lookup: reservation id → room id.
    reservation_to_room: DashMap<Ulid, Ulid>,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

impl Ledger {
    pub fn new() -> Self {
        Self {
            rooms: DashMap::new(),
            reservation_to_room: DashMap::new(),
        }
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn get_room(&self, id: &Ulid) -> Option<SharedRoomState> {
        self.rooms.get(id).map(|e| e.value().clone())
    }

    /// Rooms come into being lazily: an unknown room id is a room with zero
    /// reservations.
    pub fn get_or_create_room(&self, id: Ulid) -> SharedRoomState {
        self.rooms
            .entry(id)
            .or_insert_with(|| Arc::new(RwLock::new(RoomState::new(id))))
            .value()
            .clone()
    }

    pub fn room_ids(&self) -> Vec<Ulid> {
        self.rooms.iter().map(|e| *e.key()).collect()
    }

    pub fn room_for_reservation(&self, reservation_id: &Ulid) -> Option<Ulid> {
        self.reservation_to_room
            .get(reservation_id)
            .map(|e| *e.value())
    }

    pub fn contains_reservation(&self, reservation_id: &Ulid) -> bool {
        self.reservation_to_room.contains_key(reservation_id)
    }

    /// Atomically claim a reservation id ahead of commit. Exactly one of any
    /// set of racing creates gets `true`; a claim whose create then fails
    /// must be handed back via `release_reservation_id`.
    pub fn claim_reservation_id(&self, reservation_id: Ulid, room_id: Ulid) -> bool {
        match self.reservation_to_room.entry(reservation_id) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(v) => {
                v.insert(room_id);
                true
            }
        }
    }

    pub fn release_reservation_id(&self, reservation_id: &Ulid) {
        self.reservation_to_room.remove(reservation_id);
    }

    /// Apply a committed event to a room (caller holds the room's write
    /// lock) and keep the availability projection in step. Shared by the
    /// live mutation path and WAL replay, so both produce identical state.
    pub fn apply_event(&self, rs: &mut RoomState, index: &AvailabilityIndex, event: &Event) {
        match event {
            Event::ReservationCreated {
                id,
                room_id,
                window,
                requester,
                note,
                status,
                created_at,
                updated_at,
            } => {
                rs.insert(Reservation {
                    id: *id,
                    room_id: *room_id,
                    window: *window,
                    requester: requester.clone(),
                    note: note.clone(),
                    status: *status,
                    created_at: *created_at,
                    updated_at: *updated_at,
                });
                self.reservation_to_room.insert(*id, *room_id);
                if status.is_active() {
                    index.add(*room_id, window);
                }
            }
            Event::ReservationRescheduled {
                id,
                room_id,
                window,
                at,
            } => {
                if let Some(mut r) = rs.remove(*id) {
                    if r.is_active() {
                        index.remove(*room_id, &r.window);
                        index.add(*room_id, window);
                    }
                    r.window = *window;
                    r.updated_at = *at;
                    rs.insert(r);
                }
            }
            Event::ReservationConfirmed { id, at, .. } => {
                if let Some(r) = rs.get_mut(*id)
                    && r.status == ReservationStatus::Pending
                {
                    r.status = ReservationStatus::Confirmed;
                    r.updated_at = *at;
                }
            }
            Event::ReservationCanceled { id, room_id, at } => {
                if let Some(r) = rs.get_mut(*id)
                    && r.is_active()
                {
                    index.remove(*room_id, &r.window);
                    r.status = ReservationStatus::Canceled;
                    r.updated_at = *at;
                }
            }
            Event::ReservationPurged { id, .. } => {
                rs.remove(*id);
                self.reservation_to_room.remove(id);
            }
        }
    }
}
