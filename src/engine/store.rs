use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use dashmap::DashMap;
use tokio::sync::RwLock;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

pub type SharedAppointment = Arc<RwLock<Appointment>>;

/// How an appointment holds a slot in the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hold {
    /// The appointment's own slot. Counts toward the date's daily cap.
    Own,
    /// Target of a pending reschedule.
    Requested,
}

/// Slots a live appointment occupies, tagged by how it holds them.
pub fn holdings(appointment: &Appointment) -> Vec<(SlotKey, Hold)> {
    if appointment.status.is_terminal() {
        return Vec::new();
    }
    let own = appointment.slot();
    let mut held = vec![(own, Hold::Own)];
    if appointment.status == AppointmentStatus::ReschedulePending
        && let Some(requested) = appointment.requested_slot()
        && requested != own
    {
        held.push((requested, Hold::Requested));
    }
    held
}

/// Appointment records plus the slot index that keeps a live slot to one holder.
pub struct AppointmentStore {
    appointments: DashMap<Ulid, SharedAppointment>,
    /// date → time → (holder, hold). An entry exists for every slot a live
    /// appointment occupies, including bookings whose journal write is in flight.
    slots: DashMap<NaiveDate, BTreeMap<TimeOfDay, (Ulid, Hold)>>,
    by_account: DashMap<String, Vec<Ulid>>,
}

impl Default for AppointmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AppointmentStore {
    pub fn new() -> Self {
        Self {
            appointments: DashMap::new(),
            slots: DashMap::new(),
            by_account: DashMap::new(),
        }
    }

    // ── Records ──────────────────────────────────────────────

    pub fn len(&self) -> usize {
        self.appointments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.appointments.is_empty()
    }

    pub fn get(&self, id: &Ulid) -> Option<SharedAppointment> {
        self.appointments.get(id).map(|e| e.value().clone())
    }

    /// Register a record. Slot reservation is separate; see `reserve`.
    pub fn insert(&self, appointment: Appointment) {
        let id = appointment.id;
        self.by_account
            .entry(appointment.account_id.clone())
            .or_default()
            .push(id);
        self.appointments
            .insert(id, Arc::new(RwLock::new(appointment)));
    }

    pub fn ids(&self) -> Vec<Ulid> {
        self.appointments.iter().map(|e| *e.key()).collect()
    }

    // ── Slot index ───────────────────────────────────────────

    /// Claim `slot` for `id` as `hold`, returning how `id` held it before
    /// (`None` for a fresh claim). A claim that changes nothing always succeeds.
    ///
    /// With `cap`, a claim is refused once the date has `cap` own-slot holders,
    /// unless `id` already holds its own slot on that date. The check and the
    /// claim happen under one lock on the date.
    pub fn reserve(
        &self,
        slot: SlotKey,
        id: Ulid,
        hold: Hold,
        cap: Option<u32>,
    ) -> Result<Option<Hold>, EngineError> {
        let mut day = self.slots.entry(slot.date).or_default();
        let previous = match day.get(&slot.time).copied() {
            Some((holder, _)) if holder != id => return Err(EngineError::SlotTaken(slot)),
            Some((_, held)) if held == hold => return Ok(Some(held)),
            Some((_, held)) => Some(held),
            None => None,
        };
        if let Some(cap) = cap
            && !day.values().any(|&(holder, held)| holder == id && held == Hold::Own)
            && day.values().filter(|(_, held)| *held == Hold::Own).count() >= cap as usize
        {
            return Err(EngineError::DailyCapReached { date: slot.date, cap });
        }
        day.insert(slot.time, (id, hold));
        Ok(previous)
    }

    /// Undo a `reserve` given what it returned.
    pub fn restore(&self, slot: SlotKey, id: Ulid, previous: Option<Hold>) {
        let Some(hold) = previous else {
            self.release(slot, id);
            return;
        };
        if let Some(mut day) = self.slots.get_mut(&slot.date)
            && let Some(entry) = day.get_mut(&slot.time)
            && entry.0 == id
        {
            entry.1 = hold;
        }
    }

    /// Give up `slot` if `id` holds it.
    pub fn release(&self, slot: SlotKey, id: Ulid) {
        let now_empty = match self.slots.get_mut(&slot.date) {
            Some(mut day) => {
                if day.get(&slot.time).is_some_and(|(holder, _)| *holder == id) {
                    day.remove(&slot.time);
                }
                day.is_empty()
            }
            None => return,
        };
        if now_empty {
            self.slots.remove_if(&slot.date, |_, day| day.is_empty());
        }
    }

    pub fn holder(&self, slot: SlotKey) -> Option<Ulid> {
        self.slots
            .get(&slot.date)
            .and_then(|day| day.get(&slot.time).map(|(holder, _)| *holder))
    }

    fn holders_on(&self, date: NaiveDate) -> Vec<Ulid> {
        let mut ids: Vec<Ulid> = self
            .slots
            .get(&date)
            .map(|day| day.values().map(|(holder, _)| *holder).collect())
            .unwrap_or_default();
        ids.sort();
        ids.dedup();
        ids
    }

    // ── Typed queries ────────────────────────────────────────

    /// Live appointments holding any slot on `date`, either as their own
    /// slot or as a pending reschedule target.
    pub async fn find_non_terminal_on(&self, date: NaiveDate) -> Vec<Appointment> {
        let mut found = Vec::new();
        for id in self.holders_on(date) {
            let Some(shared) = self.get(&id) else {
                // Reserved but not yet registered: a booking mid-write.
                continue;
            };
            let appt = shared.read().await;
            if !appt.status.is_terminal() {
                found.push(appt.clone());
            }
        }
        found.sort_by_key(|a| a.time);
        found
    }

    pub async fn list_for_account(&self, account_id: &str) -> Vec<Appointment> {
        let ids = self
            .by_account
            .get(account_id)
            .map(|e| e.value().clone())
            .unwrap_or_default();
        let mut found = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(shared) = self.get(&id) {
                found.push(shared.read().await.clone());
            }
        }
        found.sort_by_key(|a| (a.date, a.time));
        found
    }

    /// All appointments on `date` regardless of status.
    pub async fn list_on_date(&self, date: NaiveDate) -> Vec<Appointment> {
        let shared: Vec<SharedAppointment> = self
            .appointments
            .iter()
            .map(|e| e.value().clone())
            .collect();
        let mut found = Vec::new();
        for s in shared {
            let appt = s.read().await;
            if appt.date == date {
                found.push(appt.clone());
            }
        }
        found.sort_by_key(|a| (a.time, a.created_at));
        found
    }
}

/// Live appointments whose own slot is on `date`. Pending reschedule
/// targets do not count against the destination date.
pub fn count_booked_on(date: NaiveDate, existing: &[Appointment], exclude: Option<Ulid>) -> usize {
    existing
        .iter()
        .filter(|a| a.date == date && !a.status.is_terminal())
        .filter(|a| exclude != Some(a.id))
        .count()
}
