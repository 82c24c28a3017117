use crate::model::*;

/// Day grid: `start`, `start + interval`, ... for every point strictly
/// before `end`. A slot that begins before `end` is kept even if its full
/// interval would run past it.
pub fn generate_slots(start: TimeOfDay, end: TimeOfDay, interval_minutes: u32) -> Vec<TimeOfDay> {
    if interval_minutes == 0 || start >= end {
        return Vec::new();
    }
    let mut slots = Vec::new();
    let mut cur = Some(start);
    while let Some(t) = cur
        && t < end
    {
        slots.push(t);
        cur = t.checked_add_minutes(interval_minutes);
    }
    slots
}

impl AppointmentSettings {
    pub fn slots(&self) -> Vec<TimeOfDay> {
        generate_slots(self.start_time, self.end_time, self.interval_minutes)
    }
}
