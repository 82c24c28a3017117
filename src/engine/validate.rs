use crate::limits::*;
use crate::model::*;

use super::EngineError;

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::Validation(msg.into())
}

pub(crate) fn validate_settings(s: &AppointmentSettings) -> Result<(), EngineError> {
    if s.start_time >= s.end_time {
        return Err(invalid("start_time must be before end_time"));
    }
    if s.interval_minutes < MIN_INTERVAL_MINUTES || s.interval_minutes > MAX_INTERVAL_MINUTES {
        return Err(invalid(format!(
            "interval_minutes must be between {MIN_INTERVAL_MINUTES} and {MAX_INTERVAL_MINUTES}"
        )));
    }
    if s.allowed_weekdays.iter().any(|d| *d > 6) {
        return Err(invalid("allowed_weekdays must be 0 (Sunday) through 6 (Saturday)"));
    }
    if s.advance_business_days == 0 {
        return Err(invalid("advance_business_days must be positive"));
    }
    if s.advance_business_days > MAX_ADVANCE_BUSINESS_DAYS {
        return Err(EngineError::LimitExceeded("advance window too long"));
    }
    match s.daily_cap {
        Some(0) => return Err(invalid("daily_cap must be positive when set")),
        Some(cap) if cap > MAX_DAILY_CAP => {
            return Err(EngineError::LimitExceeded("daily cap too large"));
        }
        _ => {}
    }
    Ok(())
}

fn check_len(value: &str, max: usize, what: &'static str) -> Result<(), EngineError> {
    if value.len() > max {
        return Err(EngineError::LimitExceeded(what));
    }
    Ok(())
}

fn require(value: &str, field: &str) -> Result<(), EngineError> {
    if value.trim().is_empty() {
        return Err(invalid(format!("{field} is required")));
    }
    Ok(())
}

pub(crate) fn validate_booking(account_id: &str, d: &AppointmentDetails) -> Result<(), EngineError> {
    require(account_id, "account_id")?;
    require(&d.reason, "reason")?;
    require(&d.contact_number, "contact_number")?;
    require(&d.email, "email")?;
    // Full address validation belongs to the mailer; this only catches typos.
    match d.email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => {}
        _ => return Err(invalid("email is not a valid address")),
    }
    check_len(account_id, MAX_FIELD_LEN, "account_id too long")?;
    check_len(&d.email, MAX_FIELD_LEN, "email too long")?;
    check_len(&d.contact_number, MAX_FIELD_LEN, "contact_number too long")?;
    check_len(&d.reason, MAX_TEXT_LEN, "reason too long")?;
    if let Some(notes) = &d.notes {
        check_len(notes, MAX_TEXT_LEN, "notes too long")?;
    }
    Ok(())
}

pub(crate) fn validate_reason(reason: Option<&str>) -> Result<(), EngineError> {
    match reason {
        Some(r) => check_len(r, MAX_TEXT_LEN, "reason too long"),
        None => Ok(()),
    }
}

pub(crate) fn validate_admin_notes(notes: Option<&str>) -> Result<(), EngineError> {
    match notes {
        Some(n) => check_len(n, MAX_ADMIN_NOTES_LEN, "admin notes too long"),
        None => Ok(()),
    }
}

pub(crate) fn validate_block_reason(reason: Option<&str>) -> Result<(), EngineError> {
    match reason {
        Some(r) => check_len(r, MAX_FIELD_LEN, "block reason too long"),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn details() -> AppointmentDetails {
        AppointmentDetails {
            reason: "Permit".into(),
            notes: None,
            meeting_mode: MeetingMode::Online,
            contact_number: "0917".into(),
            email: "org@example.edu".into(),
        }
    }

    #[test]
    fn default_settings_are_valid() {
        validate_settings(&AppointmentSettings::default()).unwrap();
    }

    #[test]
    fn settings_rules() {
        let base = AppointmentSettings::default();
        let cases = [
            AppointmentSettings { end_time: base.start_time, ..base.clone() },
            AppointmentSettings { interval_minutes: 0, ..base.clone() },
            AppointmentSettings { allowed_weekdays: [7u8].into_iter().collect(), ..base.clone() },
            AppointmentSettings { advance_business_days: 0, ..base.clone() },
            AppointmentSettings { daily_cap: Some(0), ..base.clone() },
        ];
        for s in cases {
            assert!(matches!(validate_settings(&s), Err(EngineError::Validation(_))), "{s:?}");
        }
        let too_far = AppointmentSettings { advance_business_days: MAX_ADVANCE_BUSINESS_DAYS + 1, ..base };
        assert!(matches!(validate_settings(&too_far), Err(EngineError::LimitExceeded(_))));
    }

    #[test]
    fn empty_allowed_weekdays_is_accepted() {
        let s = AppointmentSettings { allowed_weekdays: Default::default(), ..AppointmentSettings::default() };
        validate_settings(&s).unwrap();
    }

    #[test]
    fn booking_fields() {
        validate_booking("acct", &details()).unwrap();
        assert!(validate_booking(" ", &details()).is_err());
        assert!(validate_booking("acct", &AppointmentDetails { reason: "".into(), ..details() }).is_err());
        assert!(validate_booking("acct", &AppointmentDetails { email: "nobody".into(), ..details() }).is_err());
        assert!(validate_booking("acct", &AppointmentDetails { email: "@x.io".into(), ..details() }).is_err());
        let long = "x".repeat(MAX_TEXT_LEN + 1);
        assert!(matches!(
            validate_booking("acct", &AppointmentDetails { notes: Some(long), ..details() }),
            Err(EngineError::LimitExceeded("notes too long"))
        ));
    }
}
