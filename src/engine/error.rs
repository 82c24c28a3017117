use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::{AppointmentStatus, SlotKey};

use super::policy::DateRejection;

/// Why a requested slot could not be offered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unavailable {
    Date(DateRejection),
    /// Off the configured grid for the day.
    OffGrid,
    /// Blocked for every date by the admin.
    TimeBlocked,
    /// Held by another live appointment.
    Booked,
}

impl std::fmt::Display for Unavailable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Unavailable::Date(r) => write!(f, "{r}"),
            Unavailable::OffGrid => write!(f, "time is not on the appointment grid"),
            Unavailable::TimeBlocked => write!(f, "time is blocked"),
            Unavailable::Booked => write!(f, "slot is already booked"),
        }
    }
}

#[derive(Debug)]
pub enum EngineError {
    Validation(String),
    SlotUnavailable {
        slot: SlotKey,
        reason: Unavailable,
    },
    SlotTaken(SlotKey),
    DailyCapReached {
        date: NaiveDate,
        cap: u32,
    },
    InvalidState {
        id: Ulid,
        status: AppointmentStatus,
        action: &'static str,
    },
    NotFound(Ulid),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation(msg) => write!(f, "invalid input: {msg}"),
            EngineError::SlotUnavailable { slot, reason } => {
                write!(f, "slot {slot} unavailable: {reason}")
            }
            EngineError::SlotTaken(slot) => write!(f, "slot {slot} already taken"),
            EngineError::DailyCapReached { date, cap } => {
                write!(f, "daily cap of {cap} reached for {date}")
            }
            EngineError::InvalidState { id, status, action } => {
                write!(f, "cannot {action} appointment {id} while {status}")
            }
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl EngineError {
    /// Stable machine-readable code for the error class.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation",
            EngineError::SlotUnavailable { .. } => "slot_unavailable",
            EngineError::SlotTaken(_) => "slot_taken",
            EngineError::DailyCapReached { .. } => "daily_cap_reached",
            EngineError::InvalidState { .. } => "invalid_state",
            EngineError::NotFound(_) => "not_found",
            EngineError::LimitExceeded(_) => "limit_exceeded",
            EngineError::WalError(_) => "internal",
        }
    }
}
