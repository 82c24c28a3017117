use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::model::*;

use super::EngineError;

/// Everything that can happen to an existing appointment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    Confirm,
    Reject,
    RequestReschedule {
        date: NaiveDate,
        time: TimeOfDay,
        #[serde(default)]
        reason: Option<String>,
    },
    ApproveReschedule,
    DenyReschedule,
    RequestCancellation {
        #[serde(default)]
        reason: Option<String>,
    },
    ApproveCancellation,
    DenyCancellation,
    Complete,
    MarkNoShow,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::Confirm => "confirm",
            Action::Reject => "reject",
            Action::RequestReschedule { .. } => "request_reschedule",
            Action::ApproveReschedule => "approve_reschedule",
            Action::DenyReschedule => "deny_reschedule",
            Action::RequestCancellation { .. } => "request_cancellation",
            Action::ApproveCancellation => "approve_cancellation",
            Action::DenyCancellation => "deny_cancellation",
            Action::Complete => "complete",
            Action::MarkNoShow => "mark_no_show",
        }
    }
}

/// The transition table. `None` means the action is not allowed from `current`.
pub fn target_status(current: AppointmentStatus, action: &Action) -> Option<AppointmentStatus> {
    use AppointmentStatus::*;
    match (current, action) {
        (Scheduled, Action::Confirm) => Some(Confirmed),
        (Scheduled, Action::Reject) => Some(Rejected),
        (Confirmed, Action::RequestReschedule { .. }) => Some(ReschedulePending),
        (ReschedulePending, Action::ApproveReschedule | Action::DenyReschedule) => Some(Confirmed),
        (Confirmed, Action::RequestCancellation { .. }) => Some(CancellationPending),
        (CancellationPending, Action::ApproveCancellation) => Some(Cancelled),
        (CancellationPending, Action::DenyCancellation) => Some(Confirmed),
        (Scheduled | Confirmed, Action::Complete) => Some(Completed),
        (Scheduled | Confirmed, Action::MarkNoShow) => Some(NoShow),
        _ => None,
    }
}

/// Result of applying an action: the next snapshot and the event to emit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub appointment: Appointment,
    pub change: Option<StatusChange>,
}

/// Apply `action` to a copy of `current`. Pure; the caller persists.
///
/// `admin_notes`, when given, replaces the stored note and rides along on
/// the emitted change.
pub fn apply(
    current: &Appointment,
    action: Action,
    admin_notes: Option<String>,
    now: Ms,
) -> Result<Transition, EngineError> {
    let status = target_status(current.status, &action).ok_or(EngineError::InvalidState {
        id: current.id,
        status: current.status,
        action: action.name(),
    })?;

    let mut next = current.clone();
    match action {
        Action::RequestReschedule { date, time, reason } => {
            next.requested_date = Some(date);
            next.requested_time = Some(time);
            next.reschedule_reason = reason;
        }
        Action::ApproveReschedule => {
            let requested = current.requested_slot().ok_or(EngineError::InvalidState {
                id: current.id,
                status: current.status,
                action: "approve_reschedule",
            })?;
            next.date = requested.date;
            next.time = requested.time;
            clear_reschedule(&mut next);
        }
        Action::DenyReschedule => clear_reschedule(&mut next),
        Action::RequestCancellation { reason } => next.cancellation_reason = reason,
        Action::DenyCancellation => next.cancellation_reason = None,
        Action::Confirm
        | Action::Reject
        | Action::ApproveCancellation
        | Action::Complete
        | Action::MarkNoShow => {}
    }

    if admin_notes.is_some() {
        next.admin_notes = admin_notes;
    }
    next.status = status;
    next.updated_at = now;

    let change = (status != current.status)
        .then(|| StatusChange::for_appointment(&next, Some(current.status)));
    Ok(Transition {
        appointment: next,
        change,
    })
}

fn clear_reschedule(appt: &mut Appointment) {
    appt.requested_date = None;
    appt.requested_time = None;
    appt.reschedule_reason = None;
}
