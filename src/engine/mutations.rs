use chrono::NaiveDate;
use tokio::sync::oneshot;
use tracing::{debug, info};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;
use crate::observability::{BOOKINGS_TOTAL, TRANSITIONS_TOTAL};

use super::availability::check_slot;
use super::lifecycle::{self, Action, Transition};
use super::store::{Hold, count_booked_on, holdings};
use super::validate::*;
use super::{Engine, EngineError, WalCommand};

impl Engine {
    // ── Admin configuration ──────────────────────────────────

    pub async fn save_settings(&self, settings: AppointmentSettings) -> Result<(), EngineError> {
        validate_settings(&settings)?;
        let mut guard = self.settings.write().await;
        let event = Event::SettingsSaved {
            settings: settings.clone(),
        };
        self.wal_append(&event).await?;
        info!(
            start = %settings.start_time,
            end = %settings.end_time,
            interval = settings.interval_minutes,
            advance = settings.advance_business_days,
            "appointment settings saved"
        );
        *guard = settings;
        Ok(())
    }

    /// Block a whole date or a time on every date. Blocking the same target
    /// twice returns the existing entry.
    pub async fn add_blocked(
        &self,
        target: BlockTarget,
        reason: Option<String>,
    ) -> Result<BlockedSlot, EngineError> {
        validate_block_reason(reason.as_deref())?;
        let mut guard = self.blocked.write().await;
        if let Some(existing) = guard.values().find(|b| b.target == target) {
            return Ok(existing.clone());
        }
        if guard.len() >= MAX_BLOCKED_ENTRIES {
            return Err(EngineError::LimitExceeded("too many blocked entries"));
        }
        let block = BlockedSlot {
            id: Ulid::new(),
            target,
            reason,
        };
        self.wal_append(&Event::BlockAdded {
            block: block.clone(),
        })
        .await?;
        info!(id = %block.id, target = ?block.target, "block added");
        guard.insert(block.id, block.clone());
        Ok(block)
    }

    pub async fn remove_blocked(&self, id: Ulid) -> Result<BlockedSlot, EngineError> {
        let mut guard = self.blocked.write().await;
        if !guard.contains_key(&id) {
            return Err(EngineError::NotFound(id));
        }
        self.wal_append(&Event::BlockRemoved { id }).await?;
        info!(%id, "block removed");
        guard.remove(&id).ok_or(EngineError::NotFound(id))
    }

    // ── Booking ──────────────────────────────────────────────

    pub async fn propose_booking(
        &self,
        account_id: String,
        date: NaiveDate,
        time: TimeOfDay,
        details: AppointmentDetails,
    ) -> Result<Appointment, EngineError> {
        let result = self.try_book(account_id, SlotKey::new(date, time), details).await;
        let outcome = match &result {
            Ok(_) => "booked",
            Err(e) => e.kind(),
        };
        metrics::counter!(BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        result
    }

    async fn try_book(
        &self,
        account_id: String,
        slot: SlotKey,
        details: AppointmentDetails,
    ) -> Result<Appointment, EngineError> {
        validate_booking(&account_id, &details)?;
        let (settings, blocked) = self.snapshot().await;
        let existing = self.store.find_non_terminal_on(slot.date).await;

        check_slot(slot, self.clock.today(), &settings, &blocked, &existing).map_err(|reason| {
            debug!(%slot, %reason, "booking refused");
            EngineError::SlotUnavailable { slot, reason }
        })?;
        // A booking still mid-write holds the index before it is listed.
        if self.store.holder(slot).is_some() {
            return Err(EngineError::SlotTaken(slot));
        }
        if let Some(cap) = settings.daily_cap
            && count_booked_on(slot.date, &existing, None) >= cap as usize
        {
            return Err(EngineError::DailyCapReached { date: slot.date, cap });
        }
        if self.store.len() >= MAX_APPOINTMENTS {
            return Err(EngineError::LimitExceeded("too many appointments"));
        }

        let appointment = Appointment::new(Ulid::new(), account_id, slot, details, self.clock.now_ms());
        // The holder check and cap above are advisory; this claim enforces both.
        self.store.reserve(slot, appointment.id, Hold::Own, settings.daily_cap)?;
        let event = Event::AppointmentBooked {
            appointment: appointment.clone(),
        };
        if let Err(e) = self.wal_append(&event).await {
            self.store.release(slot, appointment.id);
            return Err(e);
        }
        self.store.insert(appointment.clone());

        info!(id = %appointment.id, account = %appointment.account_id, %slot, "appointment booked");
        self.notify.send(StatusChange::for_appointment(&appointment, None));
        Ok(appointment)
    }

    // ── Lifecycle ────────────────────────────────────────────

    /// Apply one lifecycle action under the appointment's write lock:
    /// claim the slots the next snapshot holds (daily cap enforced for a new
    /// own or requested slot on another date), journal the snapshot, release
    /// dropped slots, then emit the status change.
    async fn transition(
        &self,
        id: Ulid,
        action: Action,
        admin_notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        validate_admin_notes(admin_notes.as_deref())?;
        let shared = self.store.get(&id).ok_or(EngineError::NotFound(id))?;
        let mut guard = shared.write().await;
        let action_name = action.name();
        let Transition { appointment: next, change } =
            lifecycle::apply(&guard, action, admin_notes, self.clock.now_ms())?;

        let cap = self.settings.read().await.daily_cap;
        let after = holdings(&next);
        let dropped: Vec<SlotKey> = guard
            .held_slots()
            .into_iter()
            .filter(|s| !after.iter().any(|(kept, _)| kept == s))
            .collect();

        let mut claimed: Vec<(SlotKey, Option<Hold>)> = Vec::with_capacity(after.len());
        for &(slot, hold) in &after {
            match self.store.reserve(slot, id, hold, cap) {
                Ok(previous) => claimed.push((slot, previous)),
                Err(e) => {
                    self.unclaim(id, &claimed);
                    return Err(e);
                }
            }
        }
        let event = Event::AppointmentUpdated {
            appointment: next.clone(),
        };
        if let Err(e) = self.wal_append(&event).await {
            self.unclaim(id, &claimed);
            return Err(e);
        }
        for slot in &dropped {
            self.store.release(*slot, id);
        }

        info!(%id, action = action_name, from = %guard.status, to = %next.status, "appointment transition");
        metrics::counter!(TRANSITIONS_TOTAL, "action" => action_name).increment(1);
        *guard = next.clone();
        drop(guard);

        if let Some(change) = change {
            self.notify.send(change);
        }
        Ok(next)
    }

    fn unclaim(&self, id: Ulid, claimed: &[(SlotKey, Option<Hold>)]) {
        for &(slot, previous) in claimed.iter().rev() {
            self.store.restore(slot, id, previous);
        }
    }

    pub async fn confirm(&self, id: Ulid, admin_notes: Option<String>) -> Result<Appointment, EngineError> {
        self.transition(id, Action::Confirm, admin_notes).await
    }

    pub async fn reject(&self, id: Ulid, admin_notes: Option<String>) -> Result<Appointment, EngineError> {
        self.transition(id, Action::Reject, admin_notes).await
    }

    pub async fn mark_completed(&self, id: Ulid, admin_notes: Option<String>) -> Result<Appointment, EngineError> {
        self.transition(id, Action::Complete, admin_notes).await
    }

    pub async fn mark_no_show(&self, id: Ulid, admin_notes: Option<String>) -> Result<Appointment, EngineError> {
        self.transition(id, Action::MarkNoShow, admin_notes).await
    }

    /// Ask to move a confirmed appointment. The requested slot must pass the
    /// same checks as a fresh booking and is held until the admin decides.
    pub async fn request_reschedule(
        &self,
        id: Ulid,
        date: NaiveDate,
        time: TimeOfDay,
        reason: Option<String>,
    ) -> Result<Appointment, EngineError> {
        validate_reason(reason.as_deref())?;
        let current = self.get_appointment(id).await?;
        let action = Action::RequestReschedule { date, time, reason };
        if lifecycle::target_status(current.status, &action).is_none() {
            return Err(EngineError::InvalidState {
                id,
                status: current.status,
                action: action.name(),
            });
        }
        let requested = SlotKey::new(date, time);
        if requested == current.slot() {
            return Err(EngineError::Validation(
                "requested slot is the current slot".into(),
            ));
        }
        self.check_reschedule_target(&current, requested).await?;
        self.transition(id, action, None).await
    }

    /// Approve (move to the requested slot) or deny (keep the original).
    /// Approval re-checks the calendar rules for the requested slot.
    pub async fn decide_reschedule(
        &self,
        id: Ulid,
        approved: bool,
        admin_notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        if !approved {
            return self.transition(id, Action::DenyReschedule, admin_notes).await;
        }
        let current = self.get_appointment(id).await?;
        if let Some(requested) = current.requested_slot()
            && current.status == AppointmentStatus::ReschedulePending
        {
            self.check_reschedule_target(&current, requested).await?;
        }
        self.transition(id, Action::ApproveReschedule, admin_notes).await
    }

    pub async fn request_cancellation(
        &self,
        id: Ulid,
        reason: Option<String>,
    ) -> Result<Appointment, EngineError> {
        validate_reason(reason.as_deref())?;
        self.transition(id, Action::RequestCancellation { reason }, None).await
    }

    pub async fn decide_cancellation(
        &self,
        id: Ulid,
        approved: bool,
        admin_notes: Option<String>,
    ) -> Result<Appointment, EngineError> {
        let action = if approved {
            Action::ApproveCancellation
        } else {
            Action::DenyCancellation
        };
        self.transition(id, action, admin_notes).await
    }

    /// Calendar rules plus daily cap for a slot `current` wants to move to.
    /// `current`'s own holdings never count against it.
    async fn check_reschedule_target(
        &self,
        current: &Appointment,
        requested: SlotKey,
    ) -> Result<(), EngineError> {
        let (settings, blocked) = self.snapshot().await;
        let others: Vec<Appointment> = self
            .store
            .find_non_terminal_on(requested.date)
            .await
            .into_iter()
            .filter(|a| a.id != current.id)
            .collect();
        check_slot(requested, self.clock.today(), &settings, &blocked, &others)
            .map_err(|reason| EngineError::SlotUnavailable { slot: requested, reason })?;
        if let Some(cap) = settings.daily_cap
            && requested.date != current.date
            && count_booked_on(requested.date, &others, None) >= cap as usize
        {
            return Err(EngineError::DailyCapReached { date: requested.date, cap });
        }
        Ok(())
    }

    // ── Maintenance ──────────────────────────────────────────

    /// Rewrite the journal as a snapshot of current state. Meant for startup
    /// or quiet periods: writes racing the snapshot can be lost.
    pub async fn compact_wal(&self) -> Result<(), EngineError> {
        let mut events = vec![Event::SettingsSaved {
            settings: self.settings.read().await.clone(),
        }];
        events.extend(
            self.blocked
                .read()
                .await
                .values()
                .map(|block| Event::BlockAdded { block: block.clone() }),
        );
        let mut ids = self.store.ids();
        ids.sort();
        for id in ids {
            if let Some(shared) = self.store.get(&id) {
                events.push(Event::AppointmentBooked {
                    appointment: shared.read().await.clone(),
                });
            }
        }
        let records = events.len();

        let (tx, rx) = oneshot::channel();
        self.wal_tx
            .send(WalCommand::Compact { events, response: tx })
            .await
            .map_err(|_| EngineError::WalError("journal writer shut down".into()))?;
        rx.await
            .map_err(|_| EngineError::WalError("journal writer dropped response".into()))?
            .map_err(|e| EngineError::WalError(e.to_string()))?;
        info!(records, "journal compacted");
        Ok(())
    }
}
