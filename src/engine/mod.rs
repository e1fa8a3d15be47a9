mod availability;
mod conflict;
mod error;
mod ledger;
mod mutations;
mod queries;

pub use availability::AvailabilityIndex;
pub use conflict::{resolve, Decision};
pub use error::EngineError;
pub use ledger::{Ledger, SharedRoomState};

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, OwnedRwLockWriteGuard};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::wal::Wal;

/// Scheduling policy knobs, collected from the environment in `main`.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Status given to freshly created reservations. `Confirmed` matches the
    /// front end's behavior; `Pending` enables the moderation flow.
    pub default_status: ReservationStatus,
    /// Bounded wait for a room's write lock before answering `Busy`.
    pub lock_wait: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            default_status: ReservationStatus::Confirmed,
            lock_wait: Duration::from_secs(2),
        }
    }
}

// ── Group-commit WAL channel ─────────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
    AppendsSinceCompact {
        response: oneshot::Sender<u64>,
    },
}

/// Background task that owns the WAL and batches appends for group commit.
/// 1. Block until the first Append arrives.
/// 2. Buffer it (no fsync).
/// 3. Drain all immediately available Appends (the batch window).
/// 4. Single flush_sync for the whole batch.
/// 5. Respond Ok to all senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        match cmd {
            WalCommand::Append { event, response } => {
                let mut batch = vec![(event, response)];

                // Drain all immediately available appends
                loop {
                    match rx.try_recv() {
                        Ok(WalCommand::Append { event, response }) => {
                            batch.push((event, response));
                        }
                        Ok(other) => {
                            // Flush current batch first, then handle the non-append command
                            flush_and_respond(&mut wal, &mut batch);
                            handle_non_append(&mut wal, other);
                            break;
                        }
                        Err(_) => break, // channel empty, flush batch
                    }
                }

                if !batch.is_empty() {
                    flush_and_respond(&mut wal, &mut batch);
                }
            }
            other => handle_non_append(&mut wal, other),
        }
    }
}

fn flush_and_respond(wal: &mut Wal, batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>) {
    metrics::histogram!(crate::observability::WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
    let flush_start = std::time::Instant::now();
    let result = flush_batch(wal, batch);
    metrics::histogram!(crate::observability::WAL_FLUSH_DURATION_SECONDS)
        .record(flush_start.elapsed().as_secs_f64());
    respond_batch(batch, &result);
}

fn flush_batch(
    wal: &mut Wal,
    batch: &mut [(Event, oneshot::Sender<io::Result<()>>)],
) -> io::Result<()> {
    let mut append_err: Option<io::Error> = None;
    for (event, _) in batch.iter() {
        if let Err(e) = wal.append_buffered(event) {
            append_err = Some(e);
            break;
        }
    }
    // Always flush, even on append error, so partially buffered bytes
    // don't leak into the next batch (callers were told this batch failed).
    let flush_err = wal.flush_sync().err();
    if let Some(e) = append_err {
        return Err(e);
    }
    if let Some(e) = flush_err {
        return Err(e);
    }
    Ok(())
}

fn respond_batch(batch: &mut Vec<(Event, oneshot::Sender<io::Result<()>>)>, result: &io::Result<()>) {
    for (_, tx) in batch.drain(..) {
        let r = match result {
            Ok(()) => Ok(()),
            Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
        };
        let _ = tx.send(r);
    }
}

fn handle_non_append(wal: &mut Wal, cmd: WalCommand) {
    match cmd {
        WalCommand::Compact { events, response } => {
            let result = Wal::write_compact_file(wal.path(), &events)
                .and_then(|()| wal.swap_compact_file());
            let _ = response.send(result);
        }
        WalCommand::AppendsSinceCompact { response } => {
            let _ = response.send(wal.appends_since_compact());
        }
        WalCommand::Append { .. } => unreachable!(),
    }
}

/// The scheduling service: orchestrates create/reschedule/confirm/cancel
/// against the ledger through the conflict resolver, keeps the availability
/// index in step, and persists every committed mutation to the WAL.
pub struct Engine {
    pub ledger: Ledger,
    pub index: AvailabilityIndex,
    pub notify: Arc<NotifyHub>,
    pub(super) cfg: SchedulerConfig,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
}

impl Engine {
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        cfg: SchedulerConfig,
    ) -> std::io::Result<Self> {
        let events = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let engine = Self {
            ledger: Ledger::new(),
            index: AvailabilityIndex::new(),
            notify,
            cfg,
            wal_tx,
        };

        // Replay through the same application path as live mutations, so the
        // ledger and index come back exactly as they were. We're the sole
        // owner of the room Arcs here, so try_write always succeeds; never
        // block_on inside an async context.
        for event in &events {
            let room = engine.ledger.get_or_create_room(event.room_id());
            let mut guard = room.try_write().expect("replay: uncontended write");
            engine.ledger.apply_event(&mut guard, &engine.index, event);
        }

        Ok(engine)
    }

    /// Write event to WAL via the background group-commit writer.
    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Acquire the room's write lock with the configured bounded wait.
    /// Per-room serialization point for all check-then-act mutations;
    /// contention beyond the bound surfaces as `Busy`, never a hang.
    pub(super) async fn room_write(
        &self,
        room: SharedRoomState,
        room_id: Ulid,
    ) -> Result<OwnedRwLockWriteGuard<RoomState>, EngineError> {
        match tokio::time::timeout(self.cfg.lock_wait, room.write_owned()).await {
            Ok(guard) => Ok(guard),
            Err(_) => {
                metrics::counter!(crate::observability::ROOM_BUSY_TOTAL).increment(1);
                Err(EngineError::Busy(room_id))
            }
        }
    }

    /// WAL-append + apply + notify in one call. The WAL append happens
    /// first: if durability fails, nothing is applied anywhere.
    pub(super) async fn persist_and_apply(
        &self,
        rs: &mut RoomState,
        event: &Event,
    ) -> Result<(), EngineError> {
        self.wal_append(event).await?;
        self.ledger.apply_event(rs, &self.index, event);
        self.notify.send(event.room_id(), event);
        Ok(())
    }

    /// Compact the WAL by rewriting it with only the events needed to
    /// recreate the current state: one snapshot event per surviving record.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = Vec::new();
        for room_id in self.ledger.room_ids() {
            let Some(room) = self.ledger.get_room(&room_id) else {
                continue;
            };
            let guard = room.read().await;
            for r in &guard.reservations {
                events.push(Event::ReservationCreated {
                    id: r.id,
                    room_id: r.room_id,
                    window: r.window,
                    requester: r.requester.clone(),
                    note: r.note.clone(),
                    status: r.status,
                    created_at: r.created_at,
                    updated_at: r.updated_at,
                });
            }
        }

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("WAL writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("WAL writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    pub async fn wal_appends_since_compact(&self) -> u64 {
        let (tx, rx) = oneshot::channel();
        if self
            .wal_tx
            .send(WalCommand::AppendsSinceCompact { response: tx })
            .await
            .is_err()
        {
            return 0;
        }
        rx.await.unwrap_or(0)
    }
}
