use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use ulid::Ulid;

use slotdesk::engine::{Engine, FixedClock};
use slotdesk::model::StatusChange;
use slotdesk::notify::{LogNotifier, NotifyHub};
use slotdesk::wire;

// ── Test infrastructure ──────────────────────────────────────

async fn start_test_server() -> (SocketAddr, Arc<Engine>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let dir = std::env::temp_dir().join(format!("slotdesk_int_test_{}", Ulid::new()));
    std::fs::create_dir_all(&dir).unwrap();
    let notify = Arc::new(NotifyHub::new(Arc::new(LogNotifier), Duration::from_secs(1)));
    // Monday 2026-10-12.
    let clock = Arc::new(FixedClock(NaiveDate::from_ymd_opt(2026, 10, 12).unwrap()));
    let engine = Arc::new(Engine::new(dir.join("slotdesk.wal"), notify, clock).unwrap());

    let engine2 = engine.clone();
    tokio::spawn(async move {
        loop {
            let (socket, _) = match listener.accept().await {
                Ok(conn) => conn,
                Err(_) => break,
            };
            let engine = engine2.clone();
            tokio::spawn(async move {
                let _ = wire::process_connection(socket, engine).await;
            });
        }
    });

    (addr, engine)
}

struct Client {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
}

impl Client {
    async fn connect(addr: SocketAddr) -> Self {
        let (read, writer) = TcpStream::connect(addr).await.unwrap().into_split();
        Self {
            reader: BufReader::new(read),
            writer,
        }
    }

    async fn send_raw(&mut self, line: &str) -> Value {
        self.writer.write_all(line.as_bytes()).await.unwrap();
        self.writer.write_all(b"\n").await.unwrap();
        let mut reply = String::new();
        self.reader.read_line(&mut reply).await.unwrap();
        serde_json::from_str(&reply).unwrap()
    }

    async fn call(&mut self, request: Value) -> Value {
        self.send_raw(&request.to_string()).await
    }

    /// Call and unwrap a successful reply's data.
    async fn ok(&mut self, request: Value) -> Value {
        let reply = self.call(request.clone()).await;
        assert_eq!(reply["ok"], true, "{request} -> {reply}");
        reply["data"].clone()
    }

    /// Call and return the error kind of a failed reply.
    async fn err(&mut self, request: Value) -> String {
        let reply = self.call(request.clone()).await;
        assert_eq!(reply["ok"], false, "{request} -> {reply}");
        reply["error"]["kind"].as_str().unwrap().to_string()
    }
}

fn booking(account: &str, date: &str, time: &str) -> Value {
    json!({
        "op": "book",
        "account_id": account,
        "date": date,
        "time": time,
        "details": {
            "reason": "Organization recognition",
            "meeting_mode": "in-person",
            "contact_number": "0917 555 0101",
            "email": "org@example.edu"
        }
    })
}

// ── Tests ────────────────────────────────────────────────────

#[tokio::test]
async fn book_and_query_over_tcp() {
    let (addr, _engine) = start_test_server().await;
    let mut c = Client::connect(addr).await;

    let slots = c.ok(json!({"op": "available_slots", "date": "2026-10-13"})).await;
    assert_eq!(slots.as_array().unwrap().len(), 16);
    assert_eq!(slots[0], "08:00 AM");

    let appt = c.ok(booking("org-a", "2026-10-13", "08:00 AM")).await;
    assert_eq!(appt["status"], "scheduled");
    assert_eq!(appt["time"], "08:00 AM");

    let slots = c.ok(json!({"op": "available_slots", "date": "2026-10-13"})).await;
    assert_eq!(slots.as_array().unwrap().len(), 15);
    assert!(!slots.as_array().unwrap().contains(&json!("08:00 AM")));

    let fetched = c.ok(json!({"op": "get", "id": appt["id"]})).await;
    assert_eq!(fetched, appt);

    let mine = c.ok(json!({"op": "list_for_account", "account_id": "org-a"})).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn errors_carry_stable_kinds() {
    let (addr, _engine) = start_test_server().await;
    let mut c = Client::connect(addr).await;

    c.ok(booking("org-a", "2026-10-13", "09:00")).await;
    assert_eq!(c.err(booking("org-b", "2026-10-13", "09:00")).await, "slot_unavailable");
    assert_eq!(c.err(booking("org-b", "2026-10-12", "10:00")).await, "slot_unavailable");
    assert_eq!(
        c.err(json!({"op": "confirm", "id": Ulid::new().to_string()})).await,
        "not_found"
    );
    assert_eq!(c.err(json!({"op": "teleport"})).await, "bad_request");

    let reply = c.send_raw("not json").await;
    assert_eq!(reply["error"]["kind"], "bad_request");

    // The connection survives refused requests.
    c.ok(json!({"op": "bookable_dates"})).await;
}

#[tokio::test]
async fn admin_lifecycle_over_tcp() {
    let (addr, engine) = start_test_server().await;
    let mut student = Client::connect(addr).await;
    let mut admin = Client::connect(addr).await;
    let mut changes = engine.notify.subscribe();

    let appt = student.ok(booking("org-a", "2026-10-14", "10:00")).await;
    let id = appt["id"].clone();
    let created: StatusChange = changes.recv().await.unwrap();
    assert_eq!(created.previous_status, None);

    let confirmed = admin
        .ok(json!({"op": "confirm", "id": id, "admin_notes": "bring your adviser"}))
        .await;
    assert_eq!(confirmed["status"], "confirmed");
    assert_eq!(confirmed["admin_notes"], "bring your adviser");
    let change = changes.recv().await.unwrap();
    assert_eq!(change.new_status.as_str(), "confirmed");

    let pending = student
        .ok(json!({
            "op": "request_reschedule",
            "id": id,
            "date": "2026-10-16",
            "time": "01:00 PM",
            "reason": "midterms"
        }))
        .await;
    assert_eq!(pending["status"], "reschedule-pending");
    assert_eq!(pending["requested_time"], "01:00 PM");

    let moved = admin
        .ok(json!({"op": "decide_reschedule", "id": id, "approved": true}))
        .await;
    assert_eq!(moved["status"], "confirmed");
    assert_eq!(moved["date"], "2026-10-16");
    assert_eq!(moved["time"], "01:00 PM");
    assert_eq!(moved["requested_date"], Value::Null);

    student
        .ok(json!({"op": "request_cancellation", "id": id, "reason": "event cancelled"}))
        .await;
    let cancelled = admin
        .ok(json!({"op": "decide_cancellation", "id": id, "approved": true}))
        .await;
    assert_eq!(cancelled["status"], "cancelled");

    assert_eq!(
        admin.err(json!({"op": "complete", "id": id})).await,
        "invalid_state"
    );
    let slots = admin.ok(json!({"op": "available_slots", "date": "2026-10-16"})).await;
    assert!(slots.as_array().unwrap().contains(&json!("01:00 PM")));
}

#[tokio::test]
async fn settings_and_blocks_over_tcp() {
    let (addr, _engine) = start_test_server().await;
    let mut admin = Client::connect(addr).await;

    let mut settings = admin.ok(json!({"op": "get_settings"})).await;
    assert_eq!(settings["interval_minutes"], 30);
    settings["interval_minutes"] = json!(60);
    settings["daily_cap"] = json!(1);
    assert_eq!(
        admin.ok(json!({"op": "save_settings", "settings": settings})).await,
        Value::Null
    );
    let slots = admin.ok(json!({"op": "available_slots", "date": "2026-10-13"})).await;
    assert_eq!(slots.as_array().unwrap().len(), 8);

    let block = admin
        .ok(json!({"op": "add_blocked", "target": {"date": "2026-10-13"}, "reason": "holiday"}))
        .await;
    assert_eq!(block["target"], json!({"date": "2026-10-13"}));
    assert_eq!(admin.err(booking("org-a", "2026-10-13", "09:00")).await, "slot_unavailable");
    let dates = admin.ok(json!({"op": "bookable_dates"})).await;
    assert!(!dates.as_array().unwrap().contains(&json!("2026-10-13")));

    admin.ok(json!({"op": "remove_blocked", "id": block["id"]})).await;
    assert_eq!(admin.ok(json!({"op": "list_blocked"})).await, json!([]));

    admin.ok(booking("org-a", "2026-10-13", "09:00")).await;
    assert_eq!(
        admin.err(booking("org-b", "2026-10-13", "10:00")).await,
        "daily_cap_reached"
    );

    let calendar = admin.ok(json!({"op": "calendar"})).await;
    let first = &calendar[0];
    assert_eq!(first["date"], "2026-10-13");
    assert_eq!(first["total"], 8);
    assert_eq!(first["remaining"], 7);

    let invalid = admin
        .call(json!({"op": "save_settings", "settings": {"interval_minutes": 0}}))
        .await;
    assert_eq!(invalid["error"]["kind"], "validation");
}
