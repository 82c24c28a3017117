use std::sync::Arc;
use std::time::Instant;

use chrono::NaiveDate;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Framed, LinesCodec, LinesCodecError};
use ulid::Ulid;

use crate::engine::{DayAvailability, Engine, EngineError};
use crate::limits::MAX_LINE_LEN;
use crate::model::*;
use crate::observability::{REQUESTS_TOTAL, REQUEST_DURATION_SECONDS};

/// One request per line, tagged by `"op"`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    GetSettings,
    SaveSettings {
        settings: AppointmentSettings,
    },
    ListBlocked,
    AddBlocked {
        target: BlockTarget,
        #[serde(default)]
        reason: Option<String>,
    },
    RemoveBlocked {
        id: Ulid,
    },
    AvailableSlots {
        date: NaiveDate,
    },
    BookableDates,
    Calendar,
    Book {
        account_id: String,
        date: NaiveDate,
        time: TimeOfDay,
        details: AppointmentDetails,
    },
    Get {
        id: Ulid,
    },
    ListForAccount {
        account_id: String,
    },
    ListOnDate {
        date: NaiveDate,
    },
    Confirm {
        id: Ulid,
        #[serde(default)]
        admin_notes: Option<String>,
    },
    Reject {
        id: Ulid,
        #[serde(default)]
        admin_notes: Option<String>,
    },
    RequestReschedule {
        id: Ulid,
        date: NaiveDate,
        time: TimeOfDay,
        #[serde(default)]
        reason: Option<String>,
    },
    DecideReschedule {
        id: Ulid,
        approved: bool,
        #[serde(default)]
        admin_notes: Option<String>,
    },
    RequestCancellation {
        id: Ulid,
        #[serde(default)]
        reason: Option<String>,
    },
    DecideCancellation {
        id: Ulid,
        approved: bool,
        #[serde(default)]
        admin_notes: Option<String>,
    },
    Complete {
        id: Ulid,
        #[serde(default)]
        admin_notes: Option<String>,
    },
    NoShow {
        id: Ulid,
        #[serde(default)]
        admin_notes: Option<String>,
    },
}

impl Request {
    pub fn op(&self) -> &'static str {
        match self {
            Request::GetSettings => "get_settings",
            Request::SaveSettings { .. } => "save_settings",
            Request::ListBlocked => "list_blocked",
            Request::AddBlocked { .. } => "add_blocked",
            Request::RemoveBlocked { .. } => "remove_blocked",
            Request::AvailableSlots { .. } => "available_slots",
            Request::BookableDates => "bookable_dates",
            Request::Calendar => "calendar",
            Request::Book { .. } => "book",
            Request::Get { .. } => "get",
            Request::ListForAccount { .. } => "list_for_account",
            Request::ListOnDate { .. } => "list_on_date",
            Request::Confirm { .. } => "confirm",
            Request::Reject { .. } => "reject",
            Request::RequestReschedule { .. } => "request_reschedule",
            Request::DecideReschedule { .. } => "decide_reschedule",
            Request::RequestCancellation { .. } => "request_cancellation",
            Request::DecideCancellation { .. } => "decide_cancellation",
            Request::Complete { .. } => "complete",
            Request::NoShow { .. } => "no_show",
        }
    }
}

/// Payload of a successful reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Response {
    Done,
    Settings(AppointmentSettings),
    Block(BlockedSlot),
    Blocks(Vec<BlockedSlot>),
    Times(Vec<TimeOfDay>),
    Dates(Vec<NaiveDate>),
    Calendar(Vec<DayAvailability>),
    Appointment(Appointment),
    Appointments(Vec<Appointment>),
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    kind: &'a str,
    message: String,
}

#[derive(Debug, Serialize)]
struct Reply<'a> {
    ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a Response>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<ErrorBody<'a>>,
}

fn ok_line(data: &Response) -> String {
    encode(&Reply {
        ok: true,
        data: Some(data),
        error: None,
    })
}

fn error_line(kind: &str, message: String) -> String {
    encode(&Reply {
        ok: false,
        data: None,
        error: Some(ErrorBody { kind, message }),
    })
}

fn encode(reply: &Reply<'_>) -> String {
    serde_json::to_string(reply).unwrap_or_else(|e| {
        tracing::error!("reply encoding failed: {e}");
        r#"{"ok":false,"error":{"kind":"internal","message":"internal error"}}"#.into()
    })
}

fn engine_error_line(op: &str, e: &EngineError) -> String {
    match e {
        EngineError::WalError(detail) => {
            tracing::error!(op, "journal failure: {detail}");
            error_line(e.kind(), "internal error".into())
        }
        _ => error_line(e.kind(), e.to_string()),
    }
}

/// Serve one connection until the peer closes it.
pub async fn process_connection<S>(socket: S, engine: Arc<Engine>) -> Result<(), LinesCodecError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut lines = Framed::new(socket, LinesCodec::new_with_max_length(MAX_LINE_LEN));
    while let Some(frame) = lines.next().await {
        let line = match frame {
            Ok(line) => line,
            Err(LinesCodecError::MaxLineLengthExceeded) => {
                // The framed stream ends after a decode error; answer, then close.
                metrics::counter!(REQUESTS_TOTAL, "op" => "unknown", "status" => "limit_exceeded")
                    .increment(1);
                lines
                    .send(error_line("limit_exceeded", "request line too long".into()))
                    .await?;
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        if line.trim().is_empty() {
            continue;
        }
        let reply = handle_line(&engine, &line).await;
        lines.send(reply).await?;
    }
    Ok(())
}

/// Decode, execute and encode a single request line.
pub async fn handle_line(engine: &Engine, line: &str) -> String {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => {
            metrics::counter!(REQUESTS_TOTAL, "op" => "unknown", "status" => "bad_request").increment(1);
            return error_line("bad_request", e.to_string());
        }
    };
    let op = request.op();
    let started = Instant::now();
    let result = execute(engine, request).await;
    metrics::histogram!(REQUEST_DURATION_SECONDS, "op" => op).record(started.elapsed().as_secs_f64());
    match result {
        Ok(data) => {
            metrics::counter!(REQUESTS_TOTAL, "op" => op, "status" => "ok").increment(1);
            ok_line(&data)
        }
        Err(e) => {
            metrics::counter!(REQUESTS_TOTAL, "op" => op, "status" => e.kind()).increment(1);
            engine_error_line(op, &e)
        }
    }
}

async fn execute(engine: &Engine, request: Request) -> Result<Response, EngineError> {
    let response = match request {
        Request::GetSettings => Response::Settings(engine.get_settings().await),
        Request::SaveSettings { settings } => {
            engine.save_settings(settings).await?;
            Response::Done
        }
        Request::ListBlocked => Response::Blocks(engine.list_blocked().await),
        Request::AddBlocked { target, reason } => {
            Response::Block(engine.add_blocked(target, reason).await?)
        }
        Request::RemoveBlocked { id } => Response::Block(engine.remove_blocked(id).await?),
        Request::AvailableSlots { date } => Response::Times(engine.available_slots(date).await),
        Request::BookableDates => Response::Dates(engine.bookable_dates().await),
        Request::Calendar => Response::Calendar(engine.availability_calendar().await),
        Request::Book {
            account_id,
            date,
            time,
            details,
        } => Response::Appointment(engine.propose_booking(account_id, date, time, details).await?),
        Request::Get { id } => Response::Appointment(engine.get_appointment(id).await?),
        Request::ListForAccount { account_id } => {
            Response::Appointments(engine.list_for_account(&account_id).await)
        }
        Request::ListOnDate { date } => Response::Appointments(engine.list_on_date(date).await),
        Request::Confirm { id, admin_notes } => {
            Response::Appointment(engine.confirm(id, admin_notes).await?)
        }
        Request::Reject { id, admin_notes } => {
            Response::Appointment(engine.reject(id, admin_notes).await?)
        }
        Request::RequestReschedule {
            id,
            date,
            time,
            reason,
        } => Response::Appointment(engine.request_reschedule(id, date, time, reason).await?),
        Request::DecideReschedule {
            id,
            approved,
            admin_notes,
        } => Response::Appointment(engine.decide_reschedule(id, approved, admin_notes).await?),
        Request::RequestCancellation { id, reason } => {
            Response::Appointment(engine.request_cancellation(id, reason).await?)
        }
        Request::DecideCancellation {
            id,
            approved,
            admin_notes,
        } => Response::Appointment(engine.decide_cancellation(id, approved, admin_notes).await?),
        Request::Complete { id, admin_notes } => {
            Response::Appointment(engine.mark_completed(id, admin_notes).await?)
        }
        Request::NoShow { id, admin_notes } => {
            Response::Appointment(engine.mark_no_show(id, admin_notes).await?)
        }
    };
    Ok(response)
}
