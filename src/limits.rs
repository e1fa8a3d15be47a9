use crate::model::Ms;

/// Sanity floor for timestamps: 2000-01-01T00:00:00Z.
pub const MIN_VALID_TIMESTAMP_MS: Ms = 946_684_800_000;

/// Sanity ceiling for timestamps: 2100-01-01T00:00:00Z.
pub const MAX_VALID_TIMESTAMP_MS: Ms = 4_102_444_800_000;

/// A single reservation may not span more than 30 days.
pub const MAX_WINDOW_DURATION_MS: Ms = 30 * 86_400_000;

/// Range queries (listing, availability) are capped at 366 days.
pub const MAX_QUERY_WINDOW_MS: Ms = 366 * 86_400_000;

pub const MAX_REQUESTER_LEN: usize = 128;
pub const MAX_NOTE_LEN: usize = 1024;

pub const MAX_RESERVATIONS_PER_ROOM: usize = 10_000;
pub const MAX_ROOMS: usize = 100_000;
