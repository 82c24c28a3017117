use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ulid::Ulid;

/// Unix milliseconds, used for record timestamps only.
pub type Ms = i64;

// ── Time of day ──────────────────────────────────────────────────

/// A time-of-day label, stored as minutes since midnight.
///
/// Parses `"14:30"` as well as `"02:30 PM"`, and always displays in the
/// 12-hour form. Two labels naming the same minute compare equal no matter
/// which form they were parsed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TimeOfDay(u16);

impl TimeOfDay {
    pub const MINUTES_PER_DAY: u16 = 24 * 60;

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < Self::MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if hour > 23 || minute > 59 {
            return None;
        }
        Some(Self(hour * 60 + minute))
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    /// `None` once the result would reach or pass midnight.
    pub fn checked_add_minutes(self, minutes: u32) -> Option<Self> {
        let total = u32::from(self.0) + minutes;
        u16::try_from(total).ok().and_then(Self::from_minutes)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeParseError {
    pub input: String,
}

impl fmt::Display for TimeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid time '{}': expected HH:MM or hh:mm AM/PM",
            self.input
        )
    }
}

impl std::error::Error for TimeParseError {}

impl FromStr for TimeOfDay {
    type Err = TimeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || TimeParseError { input: s.to_string() };
        let trimmed = s.trim();
        let upper = trimmed.to_ascii_uppercase();

        let (body, meridiem) = if let Some(rest) = upper.strip_suffix("AM") {
            (rest.trim_end(), Some(false))
        } else if let Some(rest) = upper.strip_suffix("PM") {
            (rest.trim_end(), Some(true))
        } else {
            (upper.as_str(), None)
        };

        let (h, m) = body.split_once(':').ok_or_else(err)?;
        let digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if h.is_empty() || h.len() > 2 || m.len() != 2 || !digits(h) || !digits(m) {
            return Err(err());
        }
        let hour: u16 = h.parse().map_err(|_| err())?;
        let minute: u16 = m.parse().map_err(|_| err())?;

        let hour = match meridiem {
            None => hour,
            Some(_) if !(1..=12).contains(&hour) => return Err(err()),
            Some(false) => hour % 12,
            Some(true) => hour % 12 + 12,
        };
        Self::from_hm(hour, minute).ok_or_else(err)
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hour = self.0 / 60;
        let minute = self.0 % 60;
        let (display_hour, suffix) = match hour {
            0 => (12, "AM"),
            1..=11 => (hour, "AM"),
            12 => (12, "PM"),
            _ => (hour - 12, "PM"),
        };
        write!(f, "{display_hour:02}:{minute:02} {suffix}")
    }
}

impl Serialize for TimeOfDay {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for TimeOfDay {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Weekday number with 0 = Sunday .. 6 = Saturday.
pub fn weekday_number(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_sunday() as u8
}

/// A single bookable (date, time-of-day) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SlotKey {
    pub date: NaiveDate,
    pub time: TimeOfDay,
}

impl SlotKey {
    pub fn new(date: NaiveDate, time: TimeOfDay) -> Self {
        Self { date, time }
    }
}

impl fmt::Display for SlotKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.date, self.time)
    }
}

// ── Settings ─────────────────────────────────────────────────────

/// Admin-owned booking settings. Upserted, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppointmentSettings {
    pub start_time: TimeOfDay,
    pub end_time: TimeOfDay,
    pub interval_minutes: u32,
    /// 0 = Sunday .. 6 = Saturday.
    pub allowed_weekdays: BTreeSet<u8>,
    /// Maximum lead time, counted in Monday–Friday days.
    pub advance_business_days: u32,
    /// Maximum number of live appointments per date, if any.
    pub daily_cap: Option<u32>,
}

impl Default for AppointmentSettings {
    fn default() -> Self {
        Self {
            start_time: TimeOfDay(8 * 60),
            end_time: TimeOfDay(16 * 60),
            interval_minutes: 30,
            allowed_weekdays: (1..=5).collect(),
            advance_business_days: 14,
            daily_cap: None,
        }
    }
}

// ── Blocks ───────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlockTarget {
    /// The whole date is unavailable.
    Date(NaiveDate),
    /// This time-of-day is unavailable on every date.
    Time(TimeOfDay),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedSlot {
    pub id: Ulid,
    pub target: BlockTarget,
    pub reason: Option<String>,
}

/// Read-only snapshot of all admin blocks, split by target kind.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockedSlots {
    pub dates: BTreeSet<NaiveDate>,
    pub times: BTreeSet<TimeOfDay>,
}

impl BlockedSlots {
    pub fn from_entries<'a>(entries: impl IntoIterator<Item = &'a BlockedSlot>) -> Self {
        let mut blocked = Self::default();
        for entry in entries {
            match entry.target {
                BlockTarget::Date(d) => {
                    blocked.dates.insert(d);
                }
                BlockTarget::Time(t) => {
                    blocked.times.insert(t);
                }
            }
        }
        blocked
    }
}

// ── Appointments ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AppointmentStatus {
    Scheduled,
    Confirmed,
    Rejected,
    ReschedulePending,
    CancellationPending,
    Cancelled,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            Self::Cancelled | Self::Rejected | Self::Completed | Self::NoShow
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Scheduled => "scheduled",
            Self::Confirmed => "confirmed",
            Self::Rejected => "rejected",
            Self::ReschedulePending => "reschedule-pending",
            Self::CancellationPending => "cancellation-pending",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::NoShow => "no-show",
        }
    }
}

impl fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeetingMode {
    InPerson,
    Online,
}

/// What the requester fills in on the booking form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppointmentDetails {
    pub reason: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub meeting_mode: MeetingMode,
    pub contact_number: String,
    pub email: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub account_id: String,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub reason: String,
    pub notes: Option<String>,
    pub meeting_mode: MeetingMode,
    pub contact_number: String,
    pub email: String,
    pub status: AppointmentStatus,
    pub requested_date: Option<NaiveDate>,
    pub requested_time: Option<TimeOfDay>,
    pub reschedule_reason: Option<String>,
    pub cancellation_reason: Option<String>,
    pub admin_notes: Option<String>,
    pub created_at: Ms,
    pub updated_at: Ms,
}

impl Appointment {
    pub fn new(
        id: Ulid,
        account_id: String,
        slot: SlotKey,
        details: AppointmentDetails,
        now: Ms,
    ) -> Self {
        Self {
            id,
            account_id,
            date: slot.date,
            time: slot.time,
            reason: details.reason,
            notes: details.notes,
            meeting_mode: details.meeting_mode,
            contact_number: details.contact_number,
            email: details.email,
            status: AppointmentStatus::Scheduled,
            requested_date: None,
            requested_time: None,
            reschedule_reason: None,
            cancellation_reason: None,
            admin_notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn slot(&self) -> SlotKey {
        SlotKey::new(self.date, self.time)
    }

    pub fn requested_slot(&self) -> Option<SlotKey> {
        match (self.requested_date, self.requested_time) {
            (Some(date), Some(time)) => Some(SlotKey::new(date, time)),
            _ => None,
        }
    }

    /// Every slot this appointment keeps others from booking: its own slot
    /// while live, plus the requested slot while a reschedule is pending.
    pub fn held_slots(&self) -> Vec<SlotKey> {
        if self.status.is_terminal() {
            return Vec::new();
        }
        let mut held = vec![self.slot()];
        if self.status == AppointmentStatus::ReschedulePending
            && let Some(requested) = self.requested_slot()
        {
            held.push(requested);
        }
        held
    }
}

// ── Journal records ──────────────────────────────────────────────

/// The journal record format. Appointment updates carry the full snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    SettingsSaved { settings: AppointmentSettings },
    BlockAdded { block: BlockedSlot },
    BlockRemoved { id: Ulid },
    AppointmentBooked { appointment: Appointment },
    AppointmentUpdated { appointment: Appointment },
}

// ── Notifications ────────────────────────────────────────────────

/// Emitted whenever an appointment's status changes. `previous_status` is
/// `None` for a newly created booking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub appointment_id: Ulid,
    pub account_id: String,
    pub previous_status: Option<AppointmentStatus>,
    pub new_status: AppointmentStatus,
    pub recipient_email: String,
    pub date: NaiveDate,
    pub time: TimeOfDay,
    pub admin_notes: Option<String>,
}

impl StatusChange {
    pub fn for_appointment(appointment: &Appointment, previous: Option<AppointmentStatus>) -> Self {
        Self {
            appointment_id: appointment.id,
            account_id: appointment.account_id.clone(),
            previous_status: previous,
            new_status: appointment.status,
            recipient_email: appointment.email.clone(),
            date: appointment.date,
            time: appointment.time,
            admin_notes: appointment.admin_notes.clone(),
        }
    }
}
