//! Deterministic matching of occurrences against calendar dates.
//!
//! Dates are interpreted in one fixed timezone per evaluator. Weekdays are
//! numbered Monday = 1 ... Sunday = 7, and a specific date is the epoch
//! second of its local midnight (the first instant of the day when midnight
//! falls into a DST gap).

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, TimeZone};
use chrono_tz::Tz;

use crate::model::{Event, Occurrence};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecurrenceEvaluator {
    timezone: Tz,
}

impl RecurrenceEvaluator {
    pub fn new(timezone: Tz) -> Self {
        Self { timezone }
    }

    /// Evaluator for the device's current timezone, UTC if it can't be read.
    pub fn current() -> Self {
        let timezone = match iana_time_zone::get_timezone() {
            Ok(name) => name.parse::<Tz>().unwrap_or_else(|error| {
                tracing::warn!("unknown timezone {}: {}, using UTC", name, error);
                Tz::UTC
            }),
            Err(error) => {
                tracing::warn!("failed to read device timezone: {}, using UTC", error);
                Tz::UTC
            }
        };
        Self::new(timezone)
    }

    pub fn timezone(&self) -> Tz {
        self.timezone
    }

    /// Local calendar date of an instant.
    pub fn local_day<T: TimeZone>(&self, instant: &DateTime<T>) -> NaiveDate {
        instant.with_timezone(&self.timezone).date_naive()
    }

    pub fn weekday(date: NaiveDate) -> u8 {
        date.weekday().number_from_monday() as u8
    }

    pub fn start_of_day(&self, date: NaiveDate) -> DateTime<Tz> {
        let midnight = date.and_time(NaiveTime::MIN);
        for hour in 0..24 {
            let candidate = midnight + Duration::hours(hour);
            if let Some(start) = self.timezone.from_local_datetime(&candidate).earliest() {
                return start;
            }
        }
        self.timezone.from_utc_datetime(&midnight)
    }

    /// Epoch seconds of local midnight, the storage format of specific dates.
    pub fn epoch_day(&self, date: NaiveDate) -> i64 {
        self.start_of_day(date).timestamp()
    }

    pub fn occurs(&self, date: NaiveDate, event: &Event) -> bool {
        self.matches(date, &event.occurrence)
    }

    pub fn occurs_at<T: TimeZone>(&self, instant: &DateTime<T>, event: &Event) -> bool {
        self.occurs(self.local_day(instant), event)
    }

    pub fn matches(&self, date: NaiveDate, occurrence: &Occurrence) -> bool {
        match occurrence {
            Occurrence::Weekly(days) => days.contains(&Self::weekday(date)),
            Occurrence::SpecificDates(dates) => dates.contains(&self.epoch_day(date)),
        }
    }

    /// Events occurring on `date`, in input order.
    pub fn filter<'a>(&self, date: NaiveDate, events: &'a [Event]) -> Vec<&'a Event> {
        events.iter().filter(|event| self.occurs(date, event)).collect()
    }
}

impl Default for RecurrenceEvaluator {
    fn default() -> Self {
        Self::current()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn utc() -> RecurrenceEvaluator {
        RecurrenceEvaluator::new(Tz::UTC)
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn standup() -> Event {
        Event::new("Standup", Occurrence::weekly([1, 3, 5]).expect("weekly"), 540, 570)
    }

    #[test]
    fn weekly_event_matches_weekdays_in_any_year() {
        let evaluator = utc();
        let event = standup();
        for year in [1999, 2024, 2025, 2031] {
            let mut day = date(year, 3, 1);
            for _ in 0..21 {
                let expected = matches!(RecurrenceEvaluator::weekday(day), 1 | 3 | 5);
                assert_eq!(evaluator.occurs(day, &event), expected, "{day}");
                day = day.succ_opt().expect("next day");
            }
        }
        // 2025-01-06 is a Monday
        assert!(evaluator.occurs(date(2025, 1, 6), &event));
        assert!(!evaluator.occurs(date(2025, 1, 7), &event));
    }

    #[test]
    fn specific_date_event_matches_only_that_date() {
        let evaluator = utc();
        let offsite = Event::new("Offsite", Occurrence::specific_dates([1_893_456_000]), 0, 60);
        assert!(evaluator.occurs(date(2030, 1, 1), &offsite));
        let mut day = date(2029, 12, 1);
        while day < date(2030, 2, 1) {
            assert_eq!(evaluator.occurs(day, &offsite), day == date(2030, 1, 1));
            day = day.succ_opt().expect("next day");
        }
        // 2030-01-01 is a Tuesday; the same weekday a week later is not a match
        assert!(!evaluator.occurs(date(2030, 1, 8), &offsite));
    }

    #[test]
    fn epoch_day_uses_local_midnight() {
        let vilnius = RecurrenceEvaluator::new(chrono_tz::Europe::Vilnius);
        // UTC+2 in winter
        assert_eq!(vilnius.epoch_day(date(2030, 1, 1)), 1_893_456_000 - 2 * 3600);
        assert_eq!(utc().epoch_day(date(1970, 1, 1)), 0);

        let event = Event::new(
            "Local",
            Occurrence::specific_dates([vilnius.epoch_day(date(2030, 1, 1))]),
            0,
            60,
        );
        assert!(vilnius.occurs(date(2030, 1, 1), &event));
        assert!(!utc().occurs(date(2030, 1, 1), &event));
    }

    #[test]
    fn instant_is_normalised_to_its_local_day() {
        let vilnius = RecurrenceEvaluator::new(chrono_tz::Europe::Vilnius);
        // 23:30 UTC on Sunday is already Monday in Vilnius
        let instant = Utc.with_ymd_and_hms(2025, 1, 5, 23, 30, 0).single().expect("instant");
        assert!(vilnius.occurs_at(&instant, &standup()));
        assert!(!utc().occurs_at(&instant, &standup()));
    }

    #[test]
    fn empty_occurrence_never_matches() {
        let evaluator = utc();
        let weekly = Event::new("w", Occurrence::weekly(Vec::new()).expect("weekly"), 0, 1);
        let dates = Event::new("d", Occurrence::specific_dates(Vec::new()), 0, 1);
        let mut day = date(2025, 1, 1);
        for _ in 0..14 {
            assert!(!evaluator.occurs(day, &weekly));
            assert!(!evaluator.occurs(day, &dates));
            day = day.succ_opt().expect("next day");
        }
    }

    #[test]
    fn filter_keeps_input_order_and_is_repeatable() {
        let evaluator = utc();
        let monday = date(2025, 1, 6);
        let events = vec![
            Event::new("a", Occurrence::weekly([1]).expect("weekly"), 0, 1),
            Event::new("b", Occurrence::weekly([2]).expect("weekly"), 0, 1),
            Event::new("c", Occurrence::specific_dates([evaluator.epoch_day(monday)]), 0, 1),
            Event::new("d", Occurrence::weekly([1, 7]).expect("weekly"), 0, 1),
        ];
        let first: Vec<&str> = evaluator
            .filter(monday, &events)
            .into_iter()
            .map(|event| event.title.as_str())
            .collect();
        assert_eq!(first, vec!["a", "c", "d"]);
        let second: Vec<&str> = evaluator
            .filter(monday, &events)
            .into_iter()
            .map(|event| event.title.as_str())
            .collect();
        assert_eq!(first, second);
    }
}
