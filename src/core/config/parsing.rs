use std::collections::BTreeMap;
use std::env;

use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

use super::types::{ConfigError, Environment, StoreBackend};
use crate::core::time::to_primitive_utc;

pub(super) fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
}

pub(super) fn env_or_default(key: &str, default: &str) -> String {
    env_optional(key).unwrap_or_else(|| default.to_string())
}

pub(super) fn parse_u16(field: &'static str, value: String) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u32(field: &'static str, value: String) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_u64(field: &'static str, value: String) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_i32(field: &'static str, value: String) -> Result<i32, ConfigError> {
    value.parse::<i32>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_usize(field: &'static str, value: String) -> Result<usize, ConfigError> {
    value.parse::<usize>().map_err(|_| ConfigError::InvalidValue { field, value })
}

pub(super) fn parse_bool(value: &str) -> bool {
    matches!(value, "1" | "true" | "TRUE" | "yes" | "YES" | "on" | "ON")
}

pub(super) fn parse_environment(value: Option<String>) -> Environment {
    match value.as_deref().map(|item| item.to_lowercase()) {
        Some(ref val) if val == "production" || val == "prod" => Environment::Production,
        Some(ref val) if val == "staging" => Environment::Staging,
        Some(ref val) if val == "test" || val == "testing" => Environment::Test,
        _ => Environment::Development,
    }
}

pub(super) fn parse_store_backend(value: Option<String>) -> Result<StoreBackend, ConfigError> {
    match value.as_deref().map(|item| item.to_ascii_lowercase()) {
        None => Ok(StoreBackend::Postgres),
        Some(ref val) if val == "postgres" || val == "postgresql" => Ok(StoreBackend::Postgres),
        Some(ref val) if val == "memory" => Ok(StoreBackend::Memory),
        Some(other) => Err(ConfigError::InvalidValue { field: "PRB_STORE_BACKEND", value: other }),
    }
}

/// Accepts `1=2019-03-08,2=2019-03-23` or a JSON object keyed by workshop
/// number. Values are calendar dates (midnight UTC) or RFC 3339 timestamps.
pub(super) fn parse_deadlines(
    value: Option<String>,
) -> Result<BTreeMap<i32, PrimitiveDateTime>, ConfigError> {
    let Some(raw) = value else {
        return Ok(BTreeMap::new());
    };

    let pairs: Vec<(String, String)> = if raw.trim_start().starts_with('{') {
        let parsed: BTreeMap<String, String> =
            serde_json::from_str(&raw).map_err(|_| ConfigError::InvalidDeadlines(raw.clone()))?;
        parsed.into_iter().collect()
    } else {
        raw.split(',')
            .map(str::trim)
            .filter(|item| !item.is_empty())
            .map(|item| {
                item.split_once('=')
                    .map(|(key, value)| (key.to_string(), value.to_string()))
                    .ok_or_else(|| ConfigError::InvalidDeadlines(item.to_string()))
            })
            .collect::<Result<_, _>>()?
    };

    let mut deadlines = BTreeMap::new();
    for (key, value) in pairs {
        let workshop: i32 = key
            .trim()
            .parse()
            .ok()
            .filter(|workshop| *workshop >= 1)
            .ok_or_else(|| ConfigError::InvalidDeadlines(format!("workshop '{key}'")))?;
        let deadline = parse_deadline_value(&value)
            .ok_or_else(|| ConfigError::InvalidDeadlines(format!("deadline '{value}'")))?;
        deadlines.insert(workshop, deadline);
    }

    Ok(deadlines)
}

fn parse_deadline_value(raw: &str) -> Option<PrimitiveDateTime> {
    let raw = raw.trim();
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Some(PrimitiveDateTime::new(date, Time::MIDNIGHT));
    }

    OffsetDateTime::parse(raw, &Rfc3339).ok().map(to_primitive_utc)
}
