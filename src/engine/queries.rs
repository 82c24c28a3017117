use chrono::NaiveDate;
use ulid::Ulid;

use crate::model::*;

use super::availability::{self, DayAvailability};
use super::policy;
use super::{Engine, EngineError};

impl Engine {
    pub async fn get_settings(&self) -> AppointmentSettings {
        self.settings.read().await.clone()
    }

    pub async fn list_blocked(&self) -> Vec<BlockedSlot> {
        self.blocked.read().await.values().cloned().collect()
    }

    /// Bookable times on `date`. Empty when the date itself is not bookable.
    pub async fn available_slots(&self, date: NaiveDate) -> Vec<TimeOfDay> {
        let (settings, blocked) = self.snapshot().await;
        let existing = self.store.find_non_terminal_on(date).await;
        availability::available_slots(date, self.clock.today(), &settings, &blocked, &existing)
    }

    pub async fn bookable_dates(&self) -> Vec<NaiveDate> {
        let (settings, blocked) = self.snapshot().await;
        policy::bookable_dates(self.clock.today(), &settings, &blocked.dates)
    }

    /// Remaining capacity for every bookable date in the window.
    pub async fn availability_calendar(&self) -> Vec<DayAvailability> {
        let (settings, blocked) = self.snapshot().await;
        let today = self.clock.today();
        let mut existing = Vec::new();
        for date in policy::bookable_dates(today, &settings, &blocked.dates) {
            existing.extend(self.store.find_non_terminal_on(date).await);
        }
        availability::availability_calendar(today, &settings, &blocked, &existing)
    }

    pub async fn get_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        let shared = self.store.get(&id).ok_or(EngineError::NotFound(id))?;
        let appointment = shared.read().await.clone();
        Ok(appointment)
    }

    pub async fn list_for_account(&self, account_id: &str) -> Vec<Appointment> {
        self.store.list_for_account(account_id).await
    }

    pub async fn list_on_date(&self, date: NaiveDate) -> Vec<Appointment> {
        self.store.list_on_date(date).await
    }
}
