use axum::http::StatusCode;
use chrono::Local;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{Result, SnowflakeError};
use crate::scheduler::{DeployRequest, JobField, JobRegistry, JobSummary};

pub const PING_RESPONSE: &str = "ping received.";
pub const GENERIC_FAILURE: &str = "An exception occurred during the request.";

const TIME_FORMAT: &str = "%m-%d-%Y %H:%M:%S";

/// Body of every control-channel reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlResponse {
    pub response: String,
    pub errors: Vec<String>,
}

impl ControlResponse {
    pub fn ok(response: impl Into<String>) -> Self {
        Self {
            response: response.into(),
            errors: Vec::new(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            response: String::new(),
            errors: vec![message.into()],
        }
    }
}

/// Execute one control request against `registry`.
///
/// The body may be the request object itself or a JSON string holding it.
pub async fn dispatch(registry: &JobRegistry, body: Value) -> (StatusCode, ControlResponse) {
    let request = match unwrap_body(body) {
        Ok(request) => request,
        Err(e) => return (StatusCode::BAD_REQUEST, ControlResponse::error(e.to_string())),
    };

    let kind = match request.get("request").and_then(Value::as_str) {
        Some(kind) => kind.trim().to_lowercase(),
        None => {
            return (
                StatusCode::BAD_REQUEST,
                ControlResponse::error("No request type provided."),
            )
        }
    };

    let result = match kind.as_str() {
        "ping" => Ok(PING_RESPONSE.to_string()),
        "ls" => Ok(render_table(&registry.list().await)),
        "deploy" => deploy(registry, &request).await,
        "enable" => match identifier(&request) {
            Ok(identifier) => registry
                .enable(identifier)
                .await
                .map(|job| format!("Job '{}' enabled.", job.name)),
            Err(e) => Err(e),
        },
        "disable" => match identifier(&request) {
            Ok(identifier) => registry
                .disable(identifier)
                .await
                .map(|job| format!("Job '{}' disabled.", job.name)),
            Err(e) => Err(e),
        },
        "config" | "set" => configure(registry, &request).await,
        "halt" => {
            let changed = registry.disable_all().await;
            Ok(format!("Disabled {} job(s).", changed))
        }
        other => {
            tracing::warn!(request = other, "Unknown request type");
            return (
                StatusCode::BAD_REQUEST,
                ControlResponse::error(format!("Unknown request type '{}'.", other)),
            );
        }
    };

    match result {
        Ok(message) => {
            tracing::info!(request = %kind, response = %message.lines().next().unwrap_or_default(), "Request handled");
            (StatusCode::OK, ControlResponse::ok(message))
        }
        Err(e) if e.is_client_error() => {
            tracing::info!(request = %kind, code = e.code(), error = %e, "Request rejected");
            (status_for(&e), ControlResponse::error(e.to_string()))
        }
        Err(e) => {
            tracing::error!(request = %kind, code = e.code(), error = %e, "Request failed");
            (StatusCode::INTERNAL_SERVER_ERROR, ControlResponse::error(GENERIC_FAILURE))
        }
    }
}

fn status_for(error: &SnowflakeError) -> StatusCode {
    match error {
        SnowflakeError::NotFound(_) => StatusCode::NOT_FOUND,
        SnowflakeError::NameConflict(_) => StatusCode::CONFLICT,
        _ => StatusCode::BAD_REQUEST,
    }
}

fn unwrap_body(body: Value) -> Result<Map<String, Value>> {
    let value = match body {
        // Clients may post the request object serialized a second time
        Value::String(encoded) => serde_json::from_str(&encoded).map_err(|e| {
            SnowflakeError::Validation(format!("Request string is not valid JSON: {}", e))
        })?,
        other => other,
    };
    match value {
        Value::Object(map) => Ok(map),
        _ => Err(SnowflakeError::Validation(
            "Request must be a JSON object.".to_string(),
        )),
    }
}

fn identifier(request: &Map<String, Value>) -> Result<&str> {
    let text = move |key: &str| {
        request
            .get(key)
            .and_then(Value::as_str)
            .filter(|identifier| !identifier.is_empty())
    };
    text("id")
        .or_else(|| text("name"))
        .ok_or_else(|| {
            SnowflakeError::Validation("No identifier (name, or id needed) provided.".to_string())
        })
}

async fn deploy(registry: &JobRegistry, request: &Map<String, Value>) -> Result<String> {
    let deploy = DeployRequest::from_json(request)?;
    let job = registry.deploy(deploy).await?;
    Ok(format!(
        "Successfully deployed new cron job process '{}' ({})",
        job.name, job.id
    ))
}

async fn configure(registry: &JobRegistry, request: &Map<String, Value>) -> Result<String> {
    let identifier = identifier(request)?;

    let (argument, value) = match request.get("argument") {
        Some(Value::Array(pair)) => match pair.as_slice() {
            [Value::String(argument), value] => (argument.as_str(), value),
            _ => {
                return Err(SnowflakeError::Validation(
                    "'argument' must be a pair [argument, value].".to_string(),
                ))
            }
        },
        Some(Value::String(argument)) => {
            let value = request.get("value").ok_or_else(|| {
                SnowflakeError::Validation(format!("No value provided for '{}'.", argument))
            })?;
            (argument.as_str(), value)
        }
        _ => {
            return Err(SnowflakeError::Validation(
                "No argument provided.".to_string(),
            ))
        }
    };

    let field = JobField::parse(argument, value)?;
    let job = registry.configure(identifier, field).await?;
    Ok(format!("Set '{}' of job '{}' to {}.", argument, job.name, value))
}

/// Job table for `ls`, one row per job in deploy order.
pub fn render_table(jobs: &[JobSummary]) -> String {
    if jobs.is_empty() {
        return "No jobs deployed.".to_string();
    }

    let mut table = format!(
        "{:<24} {:<8} {:<10} {:<21} JOB ID\n{}",
        "JOB",
        "ACTIVE",
        "DISABLED",
        "CREATED",
        "-".repeat(82)
    );
    for job in jobs {
        let created = job.time_created.with_timezone(&Local).format(TIME_FORMAT).to_string();
        table.push_str(&format!(
            "\n{:<24} {:<8} {:<10} {:<21} {}",
            job.name, job.active, job.disabled, created, job.id
        ));
    }
    table
}
