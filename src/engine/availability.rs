use std::collections::BTreeMap;

use dashmap::DashMap;
use ulid::Ulid;

use crate::model::{DayAvailability, Ms, RoomState, TimeWindow, DAY_MS};

/// Derived read-model: per room, per UTC day, the number of active
/// reservations touching that day.
///
/// The index exists purely to answer cheap calendar-presence queries; the
/// ledger stays authoritative for every conflict decision. The projection is
/// maintained incrementally under the owning room's write lock and can be
/// rebuilt from the ledger at any time to repair drift.
pub struct AvailabilityIndex {
    days: DashMap<Ulid, BTreeMap<Ms, u32>>,
}

impl Default for AvailabilityIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl AvailabilityIndex {
    pub fn new() -> Self {
        Self {
            days: DashMap::new(),
        }
    }

    /// Mark every day the window touches. Called when a reservation becomes
    /// active on the room (create, or the new window of a reschedule).
    pub fn add(&self, room_id: Ulid, window: &TimeWindow) {
        let mut entry = self.days.entry(room_id).or_default();
        for day in window.days() {
            *entry.entry(day).or_insert(0) += 1;
        }
    }

    /// Unmark every day the window touches. Days drop out of the map when no
    /// other active reservation still covers them.
    pub fn remove(&self, room_id: Ulid, window: &TimeWindow) {
        let Some(mut entry) = self.days.get_mut(&room_id) else {
            return;
        };
        for day in window.days() {
            if let Some(count) = entry.get_mut(&day) {
                *count -= 1;
                if *count == 0 {
                    entry.remove(&day);
                }
            }
        }
    }

    pub fn is_booked(&self, room_id: Ulid, day: Ms) -> bool {
        self.days
            .get(&room_id)
            .is_some_and(|m| m.contains_key(&day))
    }

    /// `{day, booked}` for every UTC day the query range touches,
    /// ascending. Unknown rooms answer all-free.
    pub fn query(&self, room_id: Ulid, range: &TimeWindow) -> Vec<DayAvailability> {
        let marked = self.days.get(&room_id);
        let first = range.first_day();
        let last = range.last_day();
        let mut out = Vec::with_capacity(((last - first) / DAY_MS + 1) as usize);
        let mut day = first;
        while day <= last {
            let booked = marked.as_ref().is_some_and(|m| m.contains_key(&day));
            out.push(DayAvailability { day, booked });
            day += DAY_MS;
        }
        out
    }

    /// Recompute the room's projection from ledger state. Deterministic:
    /// equals the incrementally maintained projection for the same data.
    pub fn rebuild(&self, room: &RoomState) {
        let mut fresh: BTreeMap<Ms, u32> = BTreeMap::new();
        for r in room.reservations.iter().filter(|r| r.is_active()) {
            for day in r.window.days() {
                *fresh.entry(day).or_insert(0) += 1;
            }
        }
        if fresh.is_empty() {
            self.days.remove(&room.id);
        } else {
            self.days.insert(room.id, fresh);
        }
    }

    pub fn forget_room(&self, room_id: &Ulid) {
        self.days.remove(room_id);
    }

    /// Snapshot of the room's day→count map, for consistency checks.
    pub fn snapshot(&self, room_id: &Ulid) -> BTreeMap<Ms, u32> {
        self.days
            .get(room_id)
            .map(|m| m.clone())
            .unwrap_or_default()
    }
}
