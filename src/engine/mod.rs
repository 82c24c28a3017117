mod availability;
mod clock;
mod error;
pub mod lifecycle;
mod mutations;
mod policy;
mod queries;
mod slots;
mod store;
mod validate;

pub use availability::{DayAvailability, availability_calendar, available_slots, check_slot};
pub use clock::{Clock, FixedClock, SystemClock};
pub use error::{EngineError, Unavailable};
pub use lifecycle::{Action, Transition};
pub use policy::{DateRejection, bookable_dates, check_date, is_date_bookable, max_booking_date};
pub use slots::generate_slots;
pub use store::{AppointmentStore, Hold, SharedAppointment, holdings};

use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::{RwLock, mpsc, oneshot};
use ulid::Ulid;

use crate::model::*;
use crate::notify::NotifyHub;
use crate::observability::{WAL_FLUSH_BATCH_SIZE, WAL_FLUSH_DURATION_SECONDS};
use crate::wal::Wal;

// ── Group-commit journal writer ──────────────────────────

pub(super) enum WalCommand {
    Append {
        event: Event,
        response: oneshot::Sender<io::Result<()>>,
    },
    Compact {
        events: Vec<Event>,
        response: oneshot::Sender<io::Result<()>>,
    },
}

type PendingAppend = (Event, oneshot::Sender<io::Result<()>>);

/// Owns the journal. Each wakeup drains every append already queued, writes
/// them with a single fsync, then answers all of their senders.
async fn wal_writer_loop(mut wal: Wal, mut rx: mpsc::Receiver<WalCommand>) {
    while let Some(cmd) = rx.recv().await {
        let mut batch: Vec<PendingAppend> = Vec::new();
        let mut deferred = None;
        match cmd {
            WalCommand::Append { event, response } => batch.push((event, response)),
            other => deferred = Some(other),
        }
        while deferred.is_none() {
            match rx.try_recv() {
                Ok(WalCommand::Append { event, response }) => batch.push((event, response)),
                Ok(other) => deferred = Some(other),
                Err(_) => break,
            }
        }

        if !batch.is_empty() {
            metrics::histogram!(WAL_FLUSH_BATCH_SIZE).record(batch.len() as f64);
            let started = std::time::Instant::now();
            let result = flush_batch(&mut wal, &batch);
            metrics::histogram!(WAL_FLUSH_DURATION_SECONDS).record(started.elapsed().as_secs_f64());
            for (_, tx) in batch {
                let r = match &result {
                    Ok(()) => Ok(()),
                    Err(e) => Err(io::Error::new(e.kind(), e.to_string())),
                };
                let _ = tx.send(r);
            }
        }

        if let Some(WalCommand::Compact { events, response }) = deferred {
            tracing::debug!(
                appended = wal.appends_since_compact(),
                records = events.len(),
                "compacting journal"
            );
            let _ = response.send(wal.compact(&events));
        }
    }
}

/// Buffer and commit a whole batch, or none of it.
fn flush_batch(wal: &mut Wal, batch: &[PendingAppend]) -> io::Result<()> {
    if let Err(e) = batch
        .iter()
        .try_for_each(|(event, _)| wal.append_buffered(event))
    {
        wal.discard_pending();
        return Err(e);
    }
    wal.flush_sync()
}

// ── Engine ───────────────────────────────────────────────

/// The booking authority: settings, blocks, appointments and their journal.
pub struct Engine {
    pub(super) settings: RwLock<AppointmentSettings>,
    pub(super) blocked: RwLock<BTreeMap<Ulid, BlockedSlot>>,
    pub(super) store: AppointmentStore,
    pub(super) wal_tx: mpsc::Sender<WalCommand>,
    pub notify: Arc<NotifyHub>,
    pub(super) clock: Arc<dyn Clock>,
    replayed: usize,
}

impl Engine {
    /// Replay the journal at `wal_path` and start its writer task.
    pub fn new(
        wal_path: PathBuf,
        notify: Arc<NotifyHub>,
        clock: Arc<dyn Clock>,
    ) -> io::Result<Self> {
        let events: Vec<Event> = Wal::replay(&wal_path)?;
        let wal = Wal::open(&wal_path)?;
        let (wal_tx, wal_rx) = mpsc::channel(4096);
        tokio::spawn(wal_writer_loop(wal, wal_rx));

        let mut settings = AppointmentSettings::default();
        let mut blocked = BTreeMap::new();
        let store = AppointmentStore::new();

        for event in &events {
            match event {
                Event::SettingsSaved { settings: s } => settings = s.clone(),
                Event::BlockAdded { block } => {
                    blocked.insert(block.id, block.clone());
                }
                Event::BlockRemoved { id } => {
                    blocked.remove(id);
                }
                Event::AppointmentBooked { appointment } => {
                    hold_all(&store, appointment);
                    store.insert(appointment.clone());
                }
                Event::AppointmentUpdated { appointment } => {
                    let Some(shared) = store.get(&appointment.id) else {
                        tracing::warn!(id = %appointment.id, "journal update for unknown appointment");
                        continue;
                    };
                    // Sole owner during replay: the lock is uncontended.
                    let Ok(mut guard) = shared.try_write() else {
                        continue;
                    };
                    reindex(&store, &guard, appointment);
                    *guard = appointment.clone();
                }
            }
        }

        tracing::info!(
            path = %wal_path.display(),
            records = events.len(),
            appointments = store.len(),
            blocks = blocked.len(),
            "journal replayed"
        );

        Ok(Self {
            settings: RwLock::new(settings),
            blocked: RwLock::new(blocked),
            store,
            wal_tx,
            notify,
            clock,
            replayed: events.len(),
        })
    }

    /// Number of journal records read at startup.
    pub fn replayed_records(&self) -> usize {
        self.replayed
    }

    pub(super) async fn wal_append(&self, event: &Event) -> Result<(), EngineError> {
        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Append {
                event: event.clone(),
                response: tx,
            })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))
    }

    /// Consistent read of settings and blocks for one computation.
    pub(super) async fn snapshot(&self) -> (AppointmentSettings, BlockedSlots) {
        let settings = self.settings.read().await.clone();
        let blocked = BlockedSlots::from_entries(self.blocked.read().await.values());
        (settings, blocked)
    }
}

/// Reserve every slot `appointment` holds. Replay trusts the journal, so a
/// clash is logged rather than refused.
fn hold_all(store: &AppointmentStore, appointment: &Appointment) {
    for (slot, hold) in holdings(appointment) {
        if let Err(e) = store.reserve(slot, appointment.id, hold, None) {
            tracing::warn!(id = %appointment.id, "replay: {e}");
        }
    }
}

/// Move the slot index from `old`'s held slots to `new`'s.
fn reindex(store: &AppointmentStore, old: &Appointment, new: &Appointment) {
    let keep = new.held_slots();
    for slot in old.held_slots() {
        if !keep.contains(&slot) {
            store.release(slot, old.id);
        }
    }
    hold_all(store, new);
}
