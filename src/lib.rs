pub mod auth;
pub mod engine;
pub mod janitor;
pub mod limits;
pub mod model;
pub mod notify;
pub mod observability;
pub mod sql;
pub mod tls;
pub mod wal;
pub mod wire;

pub use engine::{Engine, EngineError, SchedulerConfig};
pub use model::{DayAvailability, Reservation, ReservationStatus, TimeWindow};
pub use notify::NotifyHub;
