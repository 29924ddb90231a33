use serde_json::{Map, Value};

use crate::error::{Result, SnowflakeError};
use crate::scheduler::job::{ClockTime, TimeWindow, Weekdays};
use crate::worker::infer_command;

/// Keys a deploy request must carry. `command` may be omitted when it can be
/// inferred from the target path.
pub const MANDATORY_FIELDS: [&str; 3] = ["name", "target_path", "command"];

const WINDOW_HINT: &str =
    "'operating_time_window' wrongly specified! Need a valid time window e.g. [\"12:00\", \"14:30\"]";
const WEEKDAYS_HINT: &str =
    "'operating_week_days' must be a list of strings [\"mon\", \"tue\", ..]!";

/// A validated request to create a job.
#[derive(Debug, Clone, PartialEq)]
pub struct DeployRequest {
    pub name: String,
    pub target_path: String,
    pub command: Option<String>,
    pub arguments: Vec<String>,
    pub disabled: bool,
    pub repeat: bool,
    pub repeat_sleep: u64,
    pub operating_week_days: Weekdays,
    pub operating_time_window: Option<TimeWindow>,
}

impl DeployRequest {
    pub fn new(name: impl Into<String>, target_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            target_path: target_path.into(),
            command: None,
            arguments: Vec::new(),
            disabled: false,
            repeat: false,
            repeat_sleep: 0,
            operating_week_days: Weekdays::All,
            operating_time_window: None,
        }
    }

    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    pub fn with_arguments<I, S>(mut self, arguments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.arguments = arguments.into_iter().map(Into::into).collect();
        self
    }

    pub fn repeating(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    pub fn on_days(mut self, days: Weekdays) -> Self {
        self.operating_week_days = days;
        self
    }

    pub fn within(mut self, window: TimeWindow) -> Self {
        self.operating_time_window = Some(window);
        self
    }

    /// Validate a JSON deploy payload. The first invalid field aborts the
    /// whole request; nothing is partially accepted.
    pub fn from_json(object: &Map<String, Value>) -> Result<Self> {
        let target_path = optional_string(object, "target_path")?;
        let command = optional_string(object, "command")?;
        let name = optional_string(object, "name")?;

        let mut missing = Vec::new();
        if name.as_deref().map_or(true, str::is_empty) {
            missing.push("name".to_string());
        }
        if target_path.as_deref().map_or(true, str::is_empty) {
            missing.push("target_path".to_string());
        }
        let derivable = target_path
            .as_deref()
            .is_some_and(|path| infer_command(path).is_some());
        if command.as_deref().map_or(true, |c| c.trim().is_empty()) && !derivable {
            missing.push("command".to_string());
        }
        if !missing.is_empty() {
            return Err(SnowflakeError::MissingFields(
                missing,
                MANDATORY_FIELDS.iter().map(|f| f.to_string()).collect(),
            ));
        }

        // `active` is observed, never configured, but it must still be well-formed
        if let Some(value) = object.get("active") {
            parse_bool("active", value)?;
        }

        let mut request = DeployRequest::new(name.unwrap_or_default(), target_path.unwrap_or_default());
        request.command = command.filter(|c| !c.trim().is_empty());

        if let Some(value) = object.get("disabled").or_else(|| object.get("disable")) {
            request.disabled = parse_bool("disabled", value)?;
        }
        if let Some(value) = object.get("operating_time_window") {
            request.operating_time_window = Some(parse_time_window(value)?);
        }
        if let Some(value) = object.get("operating_week_days") {
            request.operating_week_days = parse_week_days(value)?;
        }
        if let Some(value) = object.get("repeat") {
            request.repeat = parse_bool("repeat", value)?;
        }
        if let Some(value) = object.get("repeat_sleep") {
            request.repeat_sleep = parse_repeat_sleep(value)?;
        }
        if let Some(value) = object.get("arguments") {
            request.arguments = parse_arguments(value)?;
        }

        Ok(request)
    }
}

/// One scheduling field overwritten through `config`/`set`.
#[derive(Debug, Clone, PartialEq)]
pub enum JobField {
    Name(String),
    Disabled(bool),
    Finished(bool),
    Repeat(bool),
    RepeatSleep(u64),
    WeekDays(Weekdays),
    TimeWindow(Option<TimeWindow>),
}

impl JobField {
    pub fn parse(argument: &str, value: &Value) -> Result<Self> {
        match argument {
            "name" => match value.as_str().map(str::trim) {
                Some(name) if !name.is_empty() => Ok(JobField::Name(name.to_string())),
                _ => Err(SnowflakeError::Validation(
                    "'name' must be a non-empty string!".to_string(),
                )),
            },
            "disabled" | "disable" => Ok(JobField::Disabled(parse_bool("disabled", value)?)),
            "finished" => Ok(JobField::Finished(parse_bool("finished", value)?)),
            "repeat" => Ok(JobField::Repeat(parse_bool("repeat", value)?)),
            "repeat_sleep" => Ok(JobField::RepeatSleep(parse_repeat_sleep(value)?)),
            "operating_week_days" => match value {
                Value::String(all) if all.eq_ignore_ascii_case("all") => {
                    Ok(JobField::WeekDays(Weekdays::All))
                }
                _ => Ok(JobField::WeekDays(parse_week_days(value)?)),
            },
            "operating_time_window" => match value {
                Value::Null => Ok(JobField::TimeWindow(None)),
                _ => Ok(JobField::TimeWindow(Some(parse_time_window(value)?))),
            },
            "active" => Err(SnowflakeError::Validation(
                "'active' follows the process state; use enable or disable instead".to_string(),
            )),
            other => Err(SnowflakeError::Validation(format!(
                "'{}' is not a configurable job argument",
                other
            ))),
        }
    }

    pub fn key(&self) -> &'static str {
        match self {
            JobField::Name(_) => "name",
            JobField::Disabled(_) => "disabled",
            JobField::Finished(_) => "finished",
            JobField::Repeat(_) => "repeat",
            JobField::RepeatSleep(_) => "repeat_sleep",
            JobField::WeekDays(_) => "operating_week_days",
            JobField::TimeWindow(_) => "operating_time_window",
        }
    }
}

fn optional_string(object: &Map<String, Value>, key: &str) -> Result<Option<String>> {
    match object.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(SnowflakeError::Validation(format!("'{}' must be a string!", key))),
    }
}

fn parse_bool(key: &str, value: &Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| SnowflakeError::Validation(format!("'{}' must be boolean!", key)))
}

fn parse_repeat_sleep(value: &Value) -> Result<u64> {
    value.as_u64().ok_or_else(|| {
        SnowflakeError::Validation("'repeat_sleep' must be a non-negative integer!".to_string())
    })
}

fn parse_time_window(value: &Value) -> Result<TimeWindow> {
    let invalid = || SnowflakeError::Validation(WINDOW_HINT.to_string());
    let bounds = value.as_array().ok_or_else(invalid)?;
    let [start, end] = bounds.as_slice() else {
        return Err(invalid());
    };
    let start: ClockTime = start.as_str().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
    let end: ClockTime = end.as_str().ok_or_else(invalid)?.parse().map_err(|_| invalid())?;
    Ok(TimeWindow::new(start, end))
}

fn parse_week_days(value: &Value) -> Result<Weekdays> {
    let invalid = || SnowflakeError::Validation(WEEKDAYS_HINT.to_string());
    let codes = value
        .as_array()
        .ok_or_else(invalid)?
        .iter()
        .map(|v| v.as_str().ok_or_else(invalid))
        .collect::<Result<Vec<&str>>>()?;
    Weekdays::from_codes(&codes)
}

fn parse_arguments(value: &Value) -> Result<Vec<String>> {
    let invalid = || {
        SnowflakeError::Validation(
            "'arguments' must be a string or a list of strings!".to_string(),
        )
    };
    match value {
        Value::String(line) => Ok(line.split_whitespace().map(str::to_string).collect()),
        Value::Array(items) => items
            .iter()
            .map(|v| v.as_str().map(str::to_string).ok_or_else(invalid))
            .collect(),
        _ => Err(invalid()),
    }
}
