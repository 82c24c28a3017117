use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

use crate::model::StatusChange;
use crate::observability::NOTIFICATIONS_TOTAL;

const QUEUE_CAPACITY: usize = 1024;
const LISTENER_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Outbound delivery of status changes (the mailer lives behind this).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, change: &StatusChange) -> Result<(), NotifyError>;
}

/// Writes each change to the log instead of sending mail.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, change: &StatusChange) -> Result<(), NotifyError> {
        tracing::info!(
            appointment = %change.appointment_id,
            to = %change.recipient_email,
            from = change.previous_status.map_or("new", |s| s.as_str()),
            status = %change.new_status,
            "status change notification"
        );
        Ok(())
    }
}

/// Fire-and-forget fan-out of status changes.
///
/// `send` never blocks and never fails: changes go to a background
/// dispatcher that calls the `Notifier` with a per-delivery timeout, and to
/// any in-process subscribers.
pub struct NotifyHub {
    queue: mpsc::Sender<StatusChange>,
    listeners: broadcast::Sender<StatusChange>,
}

impl NotifyHub {
    /// Spawns the dispatcher; must be called inside a tokio runtime.
    pub fn new(notifier: Arc<dyn Notifier>, timeout: Duration) -> Self {
        let (queue, rx) = mpsc::channel(QUEUE_CAPACITY);
        tokio::spawn(dispatch_loop(notifier, timeout, rx));
        Self {
            queue,
            listeners: broadcast::channel(LISTENER_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.listeners.subscribe()
    }

    pub fn send(&self, change: StatusChange) {
        // No subscribers is fine.
        let _ = self.listeners.send(change.clone());
        if let Err(e) = self.queue.try_send(change) {
            let change = match e {
                mpsc::error::TrySendError::Full(c) | mpsc::error::TrySendError::Closed(c) => c,
            };
            tracing::warn!(
                appointment = %change.appointment_id,
                status = %change.new_status,
                "notification queue unavailable, dropping"
            );
            metrics::counter!(NOTIFICATIONS_TOTAL, "outcome" => "dropped").increment(1);
        }
    }
}

async fn dispatch_loop(
    notifier: Arc<dyn Notifier>,
    timeout: Duration,
    mut rx: mpsc::Receiver<StatusChange>,
) {
    while let Some(change) = rx.recv().await {
        let outcome = match tokio::time::timeout(timeout, notifier.notify(&change)).await {
            Ok(Ok(())) => "sent",
            Ok(Err(e)) => {
                tracing::warn!(appointment = %change.appointment_id, "{e}");
                "failed"
            }
            Err(_) => {
                tracing::warn!(
                    appointment = %change.appointment_id,
                    "notification timed out after {timeout:?}"
                );
                "timeout"
            }
        };
        metrics::counter!(NOTIFICATIONS_TOTAL, "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::*;
    use chrono::NaiveDate;
    use tokio::sync::Mutex;
    use ulid::Ulid;

    fn change(status: AppointmentStatus) -> StatusChange {
        StatusChange {
            appointment_id: Ulid::new(),
            account_id: "acct".into(),
            previous_status: Some(AppointmentStatus::Scheduled),
            new_status: status,
            recipient_email: "org@example.edu".into(),
            date: NaiveDate::from_ymd_opt(2026, 10, 20).unwrap(),
            time: "09:00".parse().unwrap(),
            admin_notes: None,
        }
    }

    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<StatusChange>>,
        fail: bool,
        delay: Option<Duration>,
    }

    #[async_trait]
    impl Notifier for Recording {
        async fn notify(&self, change: &StatusChange) -> Result<(), NotifyError> {
            if let Some(d) = self.delay {
                tokio::time::sleep(d).await;
            }
            self.seen.lock().await.push(change.clone());
            if self.fail {
                return Err(NotifyError("smtp down".into()));
            }
            Ok(())
        }
    }

    async fn wait_for(rec: &Recording, n: usize) {
        for _ in 0..100 {
            if rec.seen.lock().await.len() >= n {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("notifier never saw {n} changes");
    }

    #[tokio::test]
    async fn subscriber_receives_changes() {
        let hub = NotifyHub::new(Arc::new(LogNotifier), Duration::from_secs(1));
        let mut rx = hub.subscribe();
        let c = change(AppointmentStatus::Confirmed);
        hub.send(c.clone());
        assert_eq!(rx.recv().await.unwrap(), c);
    }

    #[tokio::test]
    async fn dispatcher_delivers_in_order() {
        let rec = Arc::new(Recording::default());
        let hub = NotifyHub::new(rec.clone(), Duration::from_secs(1));
        let a = change(AppointmentStatus::Confirmed);
        let b = change(AppointmentStatus::Cancelled);
        hub.send(a.clone());
        hub.send(b.clone());
        wait_for(&rec, 2).await;
        assert_eq!(*rec.seen.lock().await, vec![a, b]);
    }

    #[tokio::test]
    async fn failing_notifier_keeps_dispatching() {
        let rec = Arc::new(Recording { fail: true, ..Recording::default() });
        let hub = NotifyHub::new(rec.clone(), Duration::from_secs(1));
        hub.send(change(AppointmentStatus::Confirmed));
        hub.send(change(AppointmentStatus::Rejected));
        wait_for(&rec, 2).await;
    }

    #[tokio::test]
    async fn slow_notifier_is_cut_off_without_blocking_send() {
        let rec = Arc::new(Recording {
            delay: Some(Duration::from_secs(30)),
            ..Recording::default()
        });
        let hub = NotifyHub::new(rec.clone(), Duration::from_millis(20));
        let started = std::time::Instant::now();
        for _ in 0..3 {
            hub.send(change(AppointmentStatus::Confirmed));
        }
        assert!(started.elapsed() < Duration::from_secs(1));
        // Each delivery is abandoned at the timeout, so nothing is recorded.
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert!(rec.seen.lock().await.is_empty());
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = NotifyHub::new(Arc::new(LogNotifier), Duration::from_secs(1));
        hub.send(change(AppointmentStatus::NoShow));
    }
}
