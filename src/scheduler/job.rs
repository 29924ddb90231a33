use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveTime, Timelike, Utc, Weekday};

use crate::error::{Result, SnowflakeError};
use crate::worker::SharedController;

/// Days on which a job may run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Weekdays {
    #[default]
    All,
    Only(Vec<Weekday>),
}

impl Weekdays {
    /// Parse day names, keeping only the lower-cased first three letters
    /// ("Monday" and "mon" are the same day).
    pub fn from_codes<S: AsRef<str>>(codes: &[S]) -> Result<Self> {
        let mut days = Vec::with_capacity(codes.len());
        for code in codes {
            let day = parse_weekday(code.as_ref()).ok_or_else(|| {
                SnowflakeError::Validation(format!(
                    "'operating_week_days' contains unknown day '{}'",
                    code.as_ref()
                ))
            })?;
            if !days.contains(&day) {
                days.push(day);
            }
        }
        days.sort_by_key(|d: &Weekday| d.num_days_from_monday());
        Ok(Weekdays::Only(days))
    }

    pub fn allows(&self, day: Weekday) -> bool {
        match self {
            Weekdays::All => true,
            Weekdays::Only(days) => days.contains(&day),
        }
    }
}

impl fmt::Display for Weekdays {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Weekdays::All => write!(f, "all"),
            Weekdays::Only(days) => {
                let codes: Vec<&str> = days.iter().map(|d| weekday_code(*d)).collect();
                write!(f, "{}", codes.join(","))
            }
        }
    }
}

fn parse_weekday(raw: &str) -> Option<Weekday> {
    let code: String = raw.trim().to_lowercase().chars().take(3).collect();
    match code.as_str() {
        "mon" => Some(Weekday::Mon),
        "tue" => Some(Weekday::Tue),
        "wed" => Some(Weekday::Wed),
        "thu" => Some(Weekday::Thu),
        "fri" => Some(Weekday::Fri),
        "sat" => Some(Weekday::Sat),
        "sun" => Some(Weekday::Sun),
        _ => None,
    }
}

pub fn weekday_code(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "mon",
        Weekday::Tue => "tue",
        Weekday::Wed => "wed",
        Weekday::Thu => "thu",
        Weekday::Fri => "fri",
        Weekday::Sat => "sat",
        Weekday::Sun => "sun",
    }
}

/// Wall-clock `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    hour: u32,
    minute: u32,
}

impl ClockTime {
    pub fn new(hour: u32, minute: u32) -> Option<Self> {
        (hour < 24 && minute < 60).then_some(Self { hour, minute })
    }

    pub fn hour(&self) -> u32 {
        self.hour
    }

    pub fn minute(&self) -> u32 {
        self.minute
    }

    pub fn of(time: NaiveTime) -> Self {
        Self {
            hour: time.hour(),
            minute: time.minute(),
        }
    }
}

impl FromStr for ClockTime {
    type Err = SnowflakeError;

    fn from_str(raw: &str) -> Result<Self> {
        let invalid = || SnowflakeError::Validation(format!("'{}' is not a valid HH:MM time", raw));
        let (hour, minute) = raw.trim().split_once(':').ok_or_else(invalid)?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour: u32 = hour.parse().map_err(|_| invalid())?;
        let minute: u32 = minute.parse().map_err(|_| invalid())?;
        ClockTime::new(hour, minute).ok_or_else(invalid)
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Inclusive daily window. A window whose start lies after its end
/// wraps around midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: ClockTime,
    pub end: ClockTime,
}

impl TimeWindow {
    pub fn new(start: ClockTime, end: ClockTime) -> Self {
        Self { start, end }
    }

    pub fn contains(&self, time: ClockTime) -> bool {
        if self.start <= self.end {
            self.start <= time && time <= self.end
        } else {
            time >= self.start || time <= self.end
        }
    }
}

impl fmt::Display for TimeWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Rate limit for a job's repeated failure messages: the first occurrence,
/// any new message, and every 60th repetition get logged.
#[derive(Debug, Default)]
pub(crate) struct FailureLog {
    last: Option<String>,
    repeats: u32,
}

impl FailureLog {
    const EVERY: u32 = 60;

    pub(crate) fn should_log(&mut self, message: &str) -> bool {
        if self.last.as_deref() == Some(message) {
            self.repeats = self.repeats.saturating_add(1);
            self.repeats % Self::EVERY == 0
        } else {
            self.last = Some(message.to_string());
            self.repeats = 0;
            true
        }
    }

    pub(crate) fn clear(&mut self) {
        self.last = None;
        self.repeats = 0;
    }
}

/// One managed job. Lives inside the registry; callers only ever see
/// [`JobSummary`] snapshots.
pub struct JobRecord {
    pub id: String,
    pub name: String,
    pub target_path: String,
    /// Observed: true iff the workload was alive at the last check
    pub active: bool,
    pub disabled: bool,
    /// A one-shot job that already ran; cleared only by an explicit enable
    pub finished: bool,
    pub repeat: bool,
    /// Seconds a repeating job rests between runs
    pub repeat_sleep: u64,
    pub operating_week_days: Weekdays,
    pub operating_time_window: Option<TimeWindow>,
    pub time_created: DateTime<Utc>,
    pub time_started: Option<DateTime<Utc>>,
    pub time_stopped: Option<DateTime<Utc>>,
    pub time_duration: Duration,
    pub(crate) seq: u64,
    pub(crate) failures: FailureLog,
    pub(crate) controller: SharedController,
}

impl JobRecord {
    pub(crate) fn new(id: String, name: String, target_path: String, seq: u64, controller: SharedController) -> Self {
        Self {
            id,
            name,
            target_path,
            active: false,
            disabled: false,
            finished: false,
            repeat: false,
            repeat_sleep: 0,
            operating_week_days: Weekdays::All,
            operating_time_window: None,
            time_created: Utc::now(),
            time_started: None,
            time_stopped: None,
            time_duration: Duration::zero(),
            seq,
            failures: FailureLog::default(),
            controller,
        }
    }

    /// Stamp the end of a run. `time_stopped` never precedes `time_started`.
    pub(crate) fn mark_stopped(&mut self, at: DateTime<Utc>) {
        let stopped = match self.time_started {
            Some(started) if at < started => started,
            _ => at,
        };
        self.time_stopped = Some(stopped);
        self.time_duration = self
            .time_started
            .map(|started| stopped - started)
            .unwrap_or_else(Duration::zero);
        self.active = false;
    }

    /// Whether a repeating job is still resting after its last run.
    pub(crate) fn resting(&self, now: DateTime<Utc>) -> bool {
        if !self.repeat || self.repeat_sleep == 0 {
            return false;
        }
        let sleep = Duration::seconds(self.repeat_sleep.min(u64::from(u32::MAX)) as i64);
        match self.time_stopped {
            Some(stopped) => now < stopped + sleep,
            None => false,
        }
    }

    pub fn summary(&self) -> JobSummary {
        JobSummary {
            id: self.id.clone(),
            name: self.name.clone(),
            target_path: self.target_path.clone(),
            active: self.active,
            disabled: self.disabled,
            finished: self.finished,
            repeat: self.repeat,
            repeat_sleep: self.repeat_sleep,
            operating_week_days: self.operating_week_days.clone(),
            operating_time_window: self.operating_time_window,
            time_created: self.time_created,
            time_started: self.time_started,
            time_stopped: self.time_stopped,
            time_duration: self.time_duration,
        }
    }
}

impl fmt::Debug for JobRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRecord")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("active", &self.active)
            .field("disabled", &self.disabled)
            .field("finished", &self.finished)
            .field("repeat", &self.repeat)
            .finish_non_exhaustive()
    }
}

/// Read-only snapshot of a [`JobRecord`].
#[derive(Debug, Clone, PartialEq)]
pub struct JobSummary {
    pub id: String,
    pub name: String,
    pub target_path: String,
    pub active: bool,
    pub disabled: bool,
    pub finished: bool,
    pub repeat: bool,
    pub repeat_sleep: u64,
    pub operating_week_days: Weekdays,
    pub operating_time_window: Option<TimeWindow>,
    pub time_created: DateTime<Utc>,
    pub time_started: Option<DateTime<Utc>>,
    pub time_stopped: Option<DateTime<Utc>>,
    pub time_duration: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t(raw: &str) -> ClockTime {
        raw.parse().unwrap()
    }

    #[test]
    fn weekdays_normalize_to_three_letter_codes() {
        let days = Weekdays::from_codes(&["Monday", "WED", "mon"]).unwrap();
        assert_eq!(days, Weekdays::Only(vec![Weekday::Mon, Weekday::Wed]));
        assert_eq!(days.to_string(), "mon,wed");
        assert!(days.allows(Weekday::Wed));
        assert!(!days.allows(Weekday::Tue));
    }

    #[test]
    fn weekdays_reject_unknown_day() {
        let err = Weekdays::from_codes(&["funday"]).unwrap_err();
        assert!(err.to_string().contains("operating_week_days"));
    }

    #[test]
    fn all_weekdays_allow_everything() {
        assert!(Weekdays::All.allows(Weekday::Sun));
        assert_eq!(Weekdays::All.to_string(), "all");
    }

    #[test]
    fn clock_time_parsing() {
        assert_eq!(t("09:05"), ClockTime::new(9, 5).unwrap());
        assert_eq!(t("9:05"), ClockTime::new(9, 5).unwrap());
        assert!("24:00".parse::<ClockTime>().is_err());
        assert!("12:60".parse::<ClockTime>().is_err());
        assert!("12:0".parse::<ClockTime>().is_err());
        assert!("noon".parse::<ClockTime>().is_err());
        assert!(":30".parse::<ClockTime>().is_err());
    }

    #[test]
    fn window_compares_whole_clock_time() {
        let window = TimeWindow::new(t("09:30"), t("17:00"));
        assert!(!window.contains(t("09:05")));
        assert!(window.contains(t("09:30")));
        assert!(window.contains(t("12:45")));
        assert!(window.contains(t("17:00")));
        assert!(!window.contains(t("17:01")));
    }

    #[test]
    fn window_wraps_midnight() {
        let window = TimeWindow::new(t("22:00"), t("02:00"));
        assert!(window.contains(t("23:15")));
        assert!(window.contains(t("01:59")));
        assert!(!window.contains(t("12:00")));
    }

    #[test]
    fn failure_log_rate_limits_repeats() {
        let mut log = FailureLog::default();
        assert!(log.should_log("boom"));
        let logged = (0..120).filter(|_| log.should_log("boom")).count();
        assert_eq!(logged, 2);
        assert!(log.should_log("different"));
        log.clear();
        assert!(log.should_log("different"));
    }
}
