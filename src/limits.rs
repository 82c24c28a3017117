/// Longest accepted `reason`, `notes`, reschedule and cancellation reasons.
pub const MAX_TEXT_LEN: usize = 2_000;

/// Longest accepted account id, email, or contact number.
pub const MAX_FIELD_LEN: usize = 256;

/// Longest accepted admin note attached to a decision.
pub const MAX_ADMIN_NOTES_LEN: usize = 2_000;

/// A slot step larger than a full day makes no sense.
pub const MAX_INTERVAL_MINUTES: u32 = 24 * 60;

/// Smallest slot step; keeps the grid at most 288 entries.
pub const MIN_INTERVAL_MINUTES: u32 = 5;

/// Roughly one year of business days.
pub const MAX_ADVANCE_BUSINESS_DAYS: u32 = 260;

pub const MAX_DAILY_CAP: u32 = 1_000;

pub const MAX_BLOCKED_ENTRIES: usize = 10_000;

pub const MAX_APPOINTMENTS: usize = 1_000_000;

/// Longest accepted request line on the wire.
pub const MAX_LINE_LEN: usize = 64 * 1024;
