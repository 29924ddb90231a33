use chrono::{DateTime, Datelike, Local, Weekday};

use crate::scheduler::job::{ClockTime, JobRecord, TimeWindow, Weekdays};

/// Result of the admission check for one job at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Disabled,
    OffDay,
    OutsideWindow,
}

impl Admission {
    pub fn is_admitted(self) -> bool {
        self == Admission::Admitted
    }
}

pub fn admission(record: &JobRecord, now: &DateTime<Local>) -> Admission {
    evaluate(
        record.disabled,
        &record.operating_week_days,
        record.operating_time_window.as_ref(),
        now.weekday(),
        ClockTime::of(now.time()),
    )
}

/// Checks run in order: disabled, weekday, time window. The first one that
/// fails decides.
pub fn evaluate(
    disabled: bool,
    days: &Weekdays,
    window: Option<&TimeWindow>,
    weekday: Weekday,
    time: ClockTime,
) -> Admission {
    if disabled {
        return Admission::Disabled;
    }
    if !days.allows(weekday) {
        return Admission::OffDay;
    }
    match window {
        Some(window) if !window.contains(time) => Admission::OutsideWindow,
        _ => Admission::Admitted,
    }
}
