use std::collections::BTreeSet;

use chrono::{Datelike, Days, NaiveDate, Weekday};

use crate::model::*;

/// First booking rule a date fails, checked in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateRejection {
    Past,
    SameDay,
    BeyondWindow { max: NaiveDate },
    WeekdayNotAllowed,
    Blocked,
}

impl std::fmt::Display for DateRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateRejection::Past => write!(f, "date is in the past"),
            DateRejection::SameDay => write!(f, "same-day booking is not allowed"),
            DateRejection::BeyondWindow { max } => {
                write!(f, "date is beyond the booking window (last bookable date {max})")
            }
            DateRejection::WeekdayNotAllowed => write!(f, "weekday is not open for booking"),
            DateRejection::Blocked => write!(f, "date is blocked"),
        }
    }
}

fn is_business_day(date: NaiveDate) -> bool {
    !matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

/// Walk forward from `today` until `advance_business_days` Monday–Friday
/// dates have been counted. Weekends never count, whatever the admin's
/// allowed weekdays are.
pub fn max_booking_date(today: NaiveDate, advance_business_days: u32) -> NaiveDate {
    let mut date = today;
    let mut counted = 0;
    while counted < advance_business_days {
        let Some(next) = date.checked_add_days(Days::new(1)) else {
            break;
        };
        date = next;
        if is_business_day(date) {
            counted += 1;
        }
    }
    date
}

pub fn check_date(
    date: NaiveDate,
    today: NaiveDate,
    settings: &AppointmentSettings,
    blocked_dates: &BTreeSet<NaiveDate>,
) -> Result<(), DateRejection> {
    if date < today {
        return Err(DateRejection::Past);
    }
    if date == today {
        return Err(DateRejection::SameDay);
    }
    let max = max_booking_date(today, settings.advance_business_days);
    if date > max {
        return Err(DateRejection::BeyondWindow { max });
    }
    if !settings.allowed_weekdays.contains(&weekday_number(date)) {
        return Err(DateRejection::WeekdayNotAllowed);
    }
    if blocked_dates.contains(&date) {
        return Err(DateRejection::Blocked);
    }
    Ok(())
}

pub fn is_date_bookable(
    date: NaiveDate,
    today: NaiveDate,
    settings: &AppointmentSettings,
    blocked_dates: &BTreeSet<NaiveDate>,
) -> bool {
    check_date(date, today, settings, blocked_dates).is_ok()
}

/// Every date from tomorrow through the end of the window that passes the policy.
pub fn bookable_dates(
    today: NaiveDate,
    settings: &AppointmentSettings,
    blocked_dates: &BTreeSet<NaiveDate>,
) -> Vec<NaiveDate> {
    let max = max_booking_date(today, settings.advance_business_days);
    today
        .iter_days()
        .skip(1)
        .take_while(|d| *d <= max)
        .filter(|d| is_date_bookable(*d, today, settings, blocked_dates))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    // 2026-10-12 is a Monday.
    fn monday() -> NaiveDate {
        d(2026, 10, 12)
    }

    fn settings(advance: u32) -> AppointmentSettings {
        AppointmentSettings {
            advance_business_days: advance,
            ..AppointmentSettings::default()
        }
    }

    #[test]
    fn same_day_is_never_bookable() {
        let none = BTreeSet::new();
        for offset in 0..7 {
            let today = monday() + chrono::Duration::days(offset);
            let mut s = settings(14);
            s.allowed_weekdays = (0..=6).collect();
            assert_eq!(check_date(today, today, &s, &none), Err(DateRejection::SameDay));
        }
    }

    #[test]
    fn past_is_rejected_first() {
        let none = BTreeSet::new();
        let yesterday = monday() - chrono::Duration::days(1);
        assert_eq!(check_date(yesterday, monday(), &settings(14), &none), Err(DateRejection::Past));
    }

    #[test]
    fn one_business_day_from_monday_allows_only_tuesday() {
        let none = BTreeSet::new();
        let s = settings(1);
        assert_eq!(max_booking_date(monday(), 1), d(2026, 10, 13));
        assert!(is_date_bookable(d(2026, 10, 13), monday(), &s, &none));
        assert_eq!(
            check_date(d(2026, 10, 14), monday(), &s, &none),
            Err(DateRejection::BeyondWindow { max: d(2026, 10, 13) })
        );
        assert_eq!(bookable_dates(monday(), &s, &none), vec![d(2026, 10, 13)]);
    }

    #[test]
    fn window_skips_weekends() {
        // Friday + 1 business day lands on Monday.
        let friday = d(2026, 10, 16);
        assert_eq!(max_booking_date(friday, 1), d(2026, 10, 19));
        // Monday + 5 business days lands on the next Monday.
        assert_eq!(max_booking_date(monday(), 5), d(2026, 10, 19));
        // Saturday + 1 business day lands on Monday.
        assert_eq!(max_booking_date(d(2026, 10, 17), 1), d(2026, 10, 19));
    }

    #[test]
    fn nothing_past_max_date_is_bookable() {
        let mut s = settings(3);
        s.allowed_weekdays = (0..=6).collect();
        let none = BTreeSet::new();
        let max = max_booking_date(monday(), 3);
        for offset in 1..30 {
            let date = max + chrono::Duration::days(offset);
            assert!(!is_date_bookable(date, monday(), &s, &none));
        }
    }

    #[test]
    fn allowed_weekdays_filter_on_top_of_window() {
        let none = BTreeSet::new();
        let mut s = settings(5);
        s.allowed_weekdays = [2u8, 4].into_iter().collect(); // Tue, Thu
        assert_eq!(
            bookable_dates(monday(), &s, &none),
            vec![d(2026, 10, 13), d(2026, 10, 15)]
        );
        assert_eq!(
            check_date(d(2026, 10, 14), monday(), &s, &none),
            Err(DateRejection::WeekdayNotAllowed)
        );
    }

    #[test]
    fn weekend_allowed_but_still_not_counted_as_business_day() {
        let none = BTreeSet::new();
        let mut s = settings(5);
        s.allowed_weekdays = (0..=6).collect();
        let dates = bookable_dates(monday(), &s, &none);
        // Tue..Sun plus the following Monday.
        assert_eq!(dates.len(), 7);
        assert_eq!(dates.last(), Some(&d(2026, 10, 19)));
    }

    #[test]
    fn blocked_date_rejected_last() {
        let blocked: BTreeSet<_> = [d(2026, 10, 14)].into_iter().collect();
        let s = settings(14);
        assert_eq!(check_date(d(2026, 10, 14), monday(), &s, &blocked), Err(DateRejection::Blocked));
        assert!(is_date_bookable(d(2026, 10, 15), monday(), &s, &blocked));
    }
}
