// libs/telemedicine-cell/src/services/eligibility.rs
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};

use crate::models::{Consultation, EligibilityReport};

/// How early a participant may enter before the scheduled start.
pub const JOIN_EARLY_MINUTES: i64 = 15;
/// How long after the scheduled start entry is still allowed.
pub const JOIN_LATE_MINUTES: i64 = 30;

const SECONDS_PER_HOUR: i64 = 60 * 60;
const SECONDS_PER_DAY: i64 = 24 * SECONDS_PER_HOUR;

/// Source of the local wall-clock time consultations are scheduled in.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> NaiveDateTime {
        Local::now().naive_local()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

/// Join-window predicates evaluated against one captured instant.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityEvaluator {
    now: NaiveDateTime,
}

impl EligibilityEvaluator {
    pub fn at(now: NaiveDateTime) -> Self {
        Self { now }
    }

    pub fn from_clock(clock: &dyn Clock) -> Self {
        Self::at(clock.now())
    }

    pub fn now(&self) -> NaiveDateTime {
        self.now
    }

    pub fn is_today(&self, date: NaiveDate) -> bool {
        date == self.now.date()
    }

    /// Whole minutes from now until `date` `time`, floored. Negative once started.
    pub fn minutes_until(&self, date: NaiveDate, time: NaiveTime) -> i64 {
        self.seconds_until(date, time).div_euclid(60)
    }

    pub fn can_join(&self, date: NaiveDate, time: NaiveTime) -> bool {
        self.is_today(date)
            && (-JOIN_LATE_MINUTES..=JOIN_EARLY_MINUTES).contains(&self.minutes_until(date, time))
    }

    pub fn format_relative(&self, date: NaiveDate, time: NaiveTime) -> String {
        let seconds = self.seconds_until(date, time);

        if seconds < 0 {
            return "Past".to_string();
        }

        if seconds > SECONDS_PER_DAY {
            plural(seconds / SECONDS_PER_DAY, "day")
        } else if seconds >= SECONDS_PER_HOUR {
            plural(seconds / SECONDS_PER_HOUR, "hour")
        } else {
            plural(seconds / 60, "minute")
        }
    }

    /// `is_now` override or inside the join window.
    pub fn is_joinable(&self, consultation: &Consultation) -> bool {
        consultation.is_now
            || self.can_join(consultation.scheduled_date, consultation.scheduled_time)
    }

    pub fn report(&self, consultation: &Consultation) -> EligibilityReport {
        let (date, time) = (consultation.scheduled_date, consultation.scheduled_time);
        let can_join = self.can_join(date, time);

        EligibilityReport {
            consultation_id: consultation.id,
            is_today: self.is_today(date),
            minutes_until: self.minutes_until(date, time),
            can_join,
            is_now: consultation.is_now,
            joinable: consultation.is_now || can_join,
            relative_time: self.format_relative(date, time),
        }
    }

    fn seconds_until(&self, date: NaiveDate, time: NaiveTime) -> i64 {
        (date.and_time(time) - self.now).num_seconds()
    }
}

fn plural(count: i64, unit: &str) -> String {
    if count == 1 {
        format!("1 {} away", unit)
    } else {
        format!("{} {}s away", count, unit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 10)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    #[test]
    fn test_minutes_until_floors_partial_minutes() {
        let evaluator = EligibilityEvaluator::at(noon());
        let date = noon().date();

        assert_eq!(evaluator.minutes_until(date, NaiveTime::from_hms_opt(12, 0, 30).unwrap()), 0);
        assert_eq!(evaluator.minutes_until(date, NaiveTime::from_hms_opt(11, 59, 30).unwrap()), -1);
        assert_eq!(evaluator.minutes_until(date, NaiveTime::from_hms_opt(12, 10, 0).unwrap()), 10);
    }

    #[test]
    fn test_fixed_clock() {
        let evaluator = EligibilityEvaluator::from_clock(&FixedClock(noon()));
        assert_eq!(evaluator.now(), noon());
        assert!(evaluator.is_today(noon().date()));
        assert!(!evaluator.is_today(noon().date().succ_opt().unwrap()));
    }

    #[test]
    fn test_exactly_one_day_is_reported_in_hours() {
        let evaluator = EligibilityEvaluator::at(noon());
        let tomorrow = noon().date().succ_opt().unwrap();
        assert_eq!(evaluator.format_relative(tomorrow, noon().time()), "24 hours away");
    }
}
