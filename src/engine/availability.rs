use std::collections::BTreeSet;

use chrono::NaiveDate;
use serde::Serialize;

use crate::model::*;

use super::error::Unavailable;
use super::policy::{bookable_dates, check_date};
use super::slots::generate_slots;

// ── Slot resolution ──────────────────────────────────────────────

/// Times still bookable on `date`, in chronological order.
///
/// Starts from the day grid, drops every globally blocked time, then drops
/// every time held by a live appointment on that date (including the target
/// of a pending reschedule). An empty result means fully booked or blocked.
pub fn available_slots(
    date: NaiveDate,
    today: NaiveDate,
    settings: &AppointmentSettings,
    blocked: &BlockedSlots,
    existing: &[Appointment],
) -> Vec<TimeOfDay> {
    if check_date(date, today, settings, &blocked.dates).is_err() {
        return Vec::new();
    }
    let held = held_times_on(date, existing);
    generate_slots(settings.start_time, settings.end_time, settings.interval_minutes)
        .into_iter()
        .filter(|t| !blocked.times.contains(t))
        .filter(|t| !held.contains(t))
        .collect()
}

fn held_times_on(date: NaiveDate, existing: &[Appointment]) -> BTreeSet<TimeOfDay> {
    existing
        .iter()
        .flat_map(Appointment::held_slots)
        .filter(|slot| slot.date == date)
        .map(|slot| slot.time)
        .collect()
}

/// Explain why `slot` is not in `available_slots`, or `Ok` if it is.
pub fn check_slot(
    slot: SlotKey,
    today: NaiveDate,
    settings: &AppointmentSettings,
    blocked: &BlockedSlots,
    existing: &[Appointment],
) -> Result<(), Unavailable> {
    check_date(slot.date, today, settings, &blocked.dates).map_err(Unavailable::Date)?;
    if !settings.slots().contains(&slot.time) {
        return Err(Unavailable::OffGrid);
    }
    if blocked.times.contains(&slot.time) {
        return Err(Unavailable::TimeBlocked);
    }
    if held_times_on(slot.date, existing).contains(&slot.time) {
        return Err(Unavailable::Booked);
    }
    Ok(())
}

// ── Calendar summary ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    /// Grid slots not blocked by a global time block.
    pub total: usize,
    pub remaining: usize,
}

/// One entry per bookable date in the window. `existing` may span any dates.
pub fn availability_calendar(
    today: NaiveDate,
    settings: &AppointmentSettings,
    blocked: &BlockedSlots,
    existing: &[Appointment],
) -> Vec<DayAvailability> {
    let open: Vec<TimeOfDay> = settings
        .slots()
        .into_iter()
        .filter(|t| !blocked.times.contains(t))
        .collect();
    bookable_dates(today, settings, &blocked.dates)
        .into_iter()
        .map(|date| {
            let held = held_times_on(date, existing);
            let remaining = open.iter().filter(|t| !held.contains(t)).count();
            DayAvailability {
                date,
                total: open.len(),
                remaining,
            }
        })
        .collect()
}
