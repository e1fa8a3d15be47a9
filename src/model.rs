use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Unix milliseconds UTC, the only time type.
pub type Ms = i64;

/// One UTC day in milliseconds.
pub const DAY_MS: Ms = 86_400_000;

/// Half-open interval `[start, end)`.
///
/// Two windows overlap iff `a.start < b.end && b.start < a.end`, so a
/// reservation ending at 10:00 never conflicts with one starting at 10:00.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: Ms,
    pub end: Ms,
}

impl TimeWindow {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "TimeWindow start must be before end");
        Self { start, end }
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_instant(&self, t: Ms) -> bool {
        self.start <= t && t < self.end
    }

    /// UTC day of the first instant, as the day's midnight timestamp.
    pub fn first_day(&self) -> Ms {
        self.start.div_euclid(DAY_MS) * DAY_MS
    }

    /// UTC day of the last occupied instant. A window ending exactly at
    /// midnight does not occupy the following day (half-open).
    pub fn last_day(&self) -> Ms {
        (self.end - 1).div_euclid(DAY_MS) * DAY_MS
    }

    /// Midnight timestamps of every UTC day this window touches.
    /// A window spanning midnight yields two (or more) days.
    pub fn days(&self) -> impl Iterator<Item = Ms> + use<> {
        let first = self.first_day();
        let last = self.last_day();
        (0..)
            .map(move |i| first + i * DAY_MS)
            .take_while(move |d| *d <= last)
    }
}

/// Reservation lifecycle state.
///
/// Pending and Confirmed count toward conflicts; Canceled is terminal,
/// retained for audit, and excluded from conflict checks and the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReservationStatus {
    Pending,
    Confirmed,
    Canceled,
}

impl ReservationStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, ReservationStatus::Pending | ReservationStatus::Confirmed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Confirmed => "confirmed",
            ReservationStatus::Canceled => "canceled",
        }
    }
}

/// A reservation record. Window and room change only through the engine's
/// reschedule operation; status only through confirm/cancel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: Ulid,
    pub room_id: Ulid,
    pub window: TimeWindow,
    pub requester: String,
    pub note: Option<String>,
    pub status: ReservationStatus,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Reservation {
    pub fn is_active(&self) -> bool {
        self.status.is_active()
    }
}

/// Per-room ledger slice: all reservations on one room (including canceled),
/// sorted by `window.start`.
#[derive(Debug, Clone)]
pub struct RoomState {
    pub id: Ulid,
    pub reservations: Vec<Reservation>,
}

impl RoomState {
    pub fn new(id: Ulid) -> Self {
        Self {
            id,
            reservations: Vec::new(),
        }
    }

    /// Insert maintaining sort order by window.start.
    pub fn insert(&mut self, reservation: Reservation) {
        let pos = self
            .reservations
            .binary_search_by_key(&reservation.window.start, |r| r.window.start)
            .unwrap_or_else(|e| e);
        self.reservations.insert(pos, reservation);
    }

    pub fn remove(&mut self, id: Ulid) -> Option<Reservation> {
        let pos = self.reservations.iter().position(|r| r.id == id)?;
        Some(self.reservations.remove(pos))
    }

    pub fn get(&self, id: Ulid) -> Option<&Reservation> {
        self.reservations.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: Ulid) -> Option<&mut Reservation> {
        self.reservations.iter_mut().find(|r| r.id == id)
    }

    /// Reservations (any status) whose window overlaps the query window.
    /// Binary search skips everything starting at or after `query.end`.
    pub fn overlapping(&self, query: &TimeWindow) -> impl Iterator<Item = &Reservation> {
        let right_bound = self
            .reservations
            .partition_point(|r| r.window.start < query.end);
        self.reservations[..right_bound]
            .iter()
            .filter(move |r| r.window.end > query.start)
    }

    /// Active (pending/confirmed) reservations overlapping the query window.
    pub fn active_overlapping(&self, query: &TimeWindow) -> impl Iterator<Item = &Reservation> {
        self.overlapping(query).filter(|r| r.is_active())
    }
}

/// WAL record format. Flat variants, no nesting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    ReservationCreated {
        id: Ulid,
        room_id: Ulid,
        window: TimeWindow,
        requester: String,
        note: Option<String>,
        status: ReservationStatus,
        // Both carried so WAL compaction can snapshot records losslessly;
        // a live create writes the same value twice.
        created_at: Ms,
        updated_at: Ms,
    },
    ReservationRescheduled {
        id: Ulid,
        room_id: Ulid,
        window: TimeWindow,
        at: Ms,
    },
    ReservationConfirmed {
        id: Ulid,
        room_id: Ulid,
        at: Ms,
    },
    ReservationCanceled {
        id: Ulid,
        room_id: Ulid,
        at: Ms,
    },
    /// Administrative destruction of a canceled record past retention.
    ReservationPurged {
        id: Ulid,
        room_id: Ulid,
    },
}

impl Event {
    pub fn room_id(&self) -> Ulid {
        match self {
            Event::ReservationCreated { room_id, .. }
            | Event::ReservationRescheduled { room_id, .. }
            | Event::ReservationConfirmed { room_id, .. }
            | Event::ReservationCanceled { room_id, .. }
            | Event::ReservationPurged { room_id, .. } => *room_id,
        }
    }
}

/// One day of the availability projection, for calendar rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayAvailability {
    /// Midnight UTC of the day, in milliseconds.
    pub day: Ms,
    /// True if the room has at least one active reservation touching the day.
    pub booked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reservation(start: Ms, end: Ms, status: ReservationStatus) -> Reservation {
        Reservation {
            id: Ulid::new(),
            room_id: Ulid::new(),
            window: TimeWindow::new(start, end),
            requester: "prof.silva".into(),
            note: None,
            status,
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn window_basics() {
        let w = TimeWindow::new(100, 200);
        assert_eq!(w.duration_ms(), 100);
        assert!(w.contains_instant(100));
        assert!(w.contains_instant(199));
        assert!(!w.contains_instant(200)); // half-open
    }

    #[test]
    fn window_overlap_symmetric_half_open() {
        let a = TimeWindow::new(100, 200);
        let b = TimeWindow::new(150, 250);
        let c = TimeWindow::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(b.overlaps(&a));
        assert!(!a.overlaps(&c)); // back-to-back, not a conflict
        assert!(!c.overlaps(&a));
    }

    #[test]
    fn window_days_single() {
        let w = TimeWindow::new(9 * 3_600_000, 11 * 3_600_000);
        let days: Vec<Ms> = w.days().collect();
        assert_eq!(days, vec![0]);
    }

    #[test]
    fn window_days_spanning_midnight() {
        // 23:00 day 0 → 01:00 day 1
        let w = TimeWindow::new(23 * 3_600_000, DAY_MS + 3_600_000);
        let days: Vec<Ms> = w.days().collect();
        assert_eq!(days, vec![0, DAY_MS]);
    }

    #[test]
    fn window_ending_at_midnight_occupies_one_day() {
        let w = TimeWindow::new(22 * 3_600_000, DAY_MS);
        let days: Vec<Ms> = w.days().collect();
        assert_eq!(days, vec![0]);
    }

    #[test]
    fn status_activity() {
        assert!(ReservationStatus::Pending.is_active());
        assert!(ReservationStatus::Confirmed.is_active());
        assert!(!ReservationStatus::Canceled.is_active());
    }

    #[test]
    fn room_insert_keeps_start_order() {
        let mut rs = RoomState::new(Ulid::new());
        rs.insert(reservation(300, 400, ReservationStatus::Confirmed));
        rs.insert(reservation(100, 200, ReservationStatus::Confirmed));
        rs.insert(reservation(200, 300, ReservationStatus::Pending));
        let starts: Vec<Ms> = rs.reservations.iter().map(|r| r.window.start).collect();
        assert_eq!(starts, vec![100, 200, 300]);
    }

    #[test]
    fn room_remove_preserves_order() {
        let mut rs = RoomState::new(Ulid::new());
        let mid = reservation(200, 250, ReservationStatus::Confirmed);
        let mid_id = mid.id;
        rs.insert(reservation(100, 150, ReservationStatus::Confirmed));
        rs.insert(mid);
        rs.insert(reservation(300, 350, ReservationStatus::Confirmed));
        assert!(rs.remove(mid_id).is_some());
        assert!(rs.remove(mid_id).is_none());
        let starts: Vec<Ms> = rs.reservations.iter().map(|r| r.window.start).collect();
        assert_eq!(starts, vec![100, 300]);
    }

    #[test]
    fn overlapping_skips_adjacent_and_far() {
        let mut rs = RoomState::new(Ulid::new());
        rs.insert(reservation(100, 200, ReservationStatus::Confirmed)); // ends at query start
        rs.insert(reservation(150, 250, ReservationStatus::Confirmed));
        rs.insert(reservation(500, 600, ReservationStatus::Confirmed)); // starts after query end
        let query = TimeWindow::new(200, 400);
        let hits: Vec<_> = rs.overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].window, TimeWindow::new(150, 250));
    }

    #[test]
    fn active_overlapping_excludes_canceled() {
        let mut rs = RoomState::new(Ulid::new());
        rs.insert(reservation(100, 200, ReservationStatus::Canceled));
        rs.insert(reservation(150, 250, ReservationStatus::Confirmed));
        let query = TimeWindow::new(0, 1000);
        let hits: Vec<_> = rs.active_overlapping(&query).collect();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].status, ReservationStatus::Confirmed);
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::ReservationCreated {
            id: Ulid::new(),
            room_id: Ulid::new(),
            window: TimeWindow::new(1000, 2000),
            requester: "coordenacao".into(),
            note: Some("weekly seminar".into()),
            status: ReservationStatus::Confirmed,
            created_at: 42,
            updated_at: 42,
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}
