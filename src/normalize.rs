//! Turning stored task records into well-formed [`Task`]s.
//!
//! The local blob (camelCase) and the remote rows (snake_case) are read
//! through the same lenient [`StoredTask`] shape. Every field is optional and
//! every timestamp is kept as a string until [`normalize`] parses it, so one
//! bad record never poisons a whole load.

use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use serde::Deserialize;
use tracing::warn;

use crate::models::{derive_date, local_day, Task};

const UNTITLED: &str = "Untitled task";

/// A task record as found in storage, before validation.
#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct StoredTask {
    pub id: Option<String>,
    pub title: Option<String>,
    pub completed: Option<bool>,
    #[serde(rename = "createdAt", alias = "created_at")]
    pub created_at: Option<String>,
    #[serde(rename = "completedAt", alias = "completed_at")]
    pub completed_at: Option<String>,
    pub deadline: Option<String>,
    pub date: Option<String>,
    #[serde(rename = "owner", alias = "user_id")]
    pub owner: Option<String>,
}

/// Parses a timestamp written by either store or typed by a user.
///
/// Accepts RFC 3339 and naive `YYYY-MM-DD[T ]HH:MM[:SS[.fff]]` (read as local
/// time).
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    const NAIVE_FORMATS: [&str; 4] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(from_local)
}

/// Parses a deadline. A bare `YYYY-MM-DD` means the end of that local day.
pub fn parse_deadline(raw: &str) -> Option<DateTime<Utc>> {
    parse_timestamp(raw).or_else(|| parse_day(raw).map(end_of_day))
}

pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// 23:59:59 local time on `day`.
pub fn end_of_day(day: NaiveDate) -> DateTime<Utc> {
    let last_second = NaiveTime::from_hms_opt(23, 59, 59).unwrap_or(NaiveTime::MIN);
    from_local(day.and_time(last_second))
}

fn from_local(naive: NaiveDateTime) -> DateTime<Utc> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|ts| ts.with_timezone(&Utc))
        .unwrap_or_else(|| Utc.from_utc_datetime(&naive))
}

/// Repairs a stored record into a valid task.
///
/// Unparsable `createdAt` becomes `now`, unparsable `deadline` is dropped,
/// a missing or invalid `date` is derived from the deadline or creation day,
/// and `completedAt` is forced to agree with `completed`.
///
/// A bad deadline is dropped, not replaced with the current time; the task
/// keeps its stored date, or the creation day.
pub fn normalize(raw: StoredTask, fallback_id: &str, now: DateTime<Utc>) -> Task {
    let id = raw
        .id
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| fallback_id.to_string());

    let title = match raw.title.as_deref().map(str::trim) {
        Some(t) if !t.is_empty() => t.to_string(),
        _ => {
            warn!(task = %id, "stored task has no title");
            UNTITLED.to_string()
        }
    };

    let created_at = match raw.created_at.as_deref().map(parse_timestamp) {
        Some(Some(ts)) => ts,
        other => {
            if other.is_some() {
                warn!(task = %id, value = ?raw.created_at, "unparsable createdAt, using now");
            }
            now
        }
    };

    let deadline = raw.deadline.as_deref().and_then(|value| {
        let parsed = parse_deadline(value);
        if parsed.is_none() {
            warn!(task = %id, value, "unparsable deadline, dropping it");
        }
        parsed
    });

    let completed = raw.completed.unwrap_or(false);
    let completed_at = if completed {
        Some(
            raw.completed_at
                .as_deref()
                .and_then(parse_timestamp)
                .unwrap_or(now),
        )
    } else {
        None
    };

    let fallback_day = raw
        .date
        .as_deref()
        .and_then(parse_day)
        .unwrap_or_else(|| local_day(created_at));

    Task {
        id,
        title,
        completed,
        created_at,
        completed_at,
        deadline,
        date: derive_date(deadline, fallback_day),
        owner: raw.owner,
    }
}

/// Parses and repairs a JSON array of stored tasks.
///
/// A blob that is not an array yields no tasks. Elements of the wrong shape
/// are repaired from an empty record instead of being dropped.
pub fn normalize_blob(blob: &str, now: DateTime<Utc>) -> Vec<Task> {
    let values: Vec<serde_json::Value> = match serde_json::from_str(blob) {
        Ok(values) => values,
        Err(e) => {
            warn!(error = %e, "local task blob is not a JSON array, ignoring it");
            return Vec::new();
        }
    };
    normalize_all(
        values
            .into_iter()
            .map(|value| {
                serde_json::from_value(value).unwrap_or_else(|e| {
                    warn!(error = %e, "malformed stored task, repairing with defaults");
                    StoredTask::default()
                })
            })
            .collect(),
        now,
    )
}

/// Normalizes a batch, giving records without an id a unique fallback.
pub fn normalize_all(records: Vec<StoredTask>, now: DateTime<Utc>) -> Vec<Task> {
    let base = now.timestamp_millis();
    records
        .into_iter()
        .enumerate()
        .map(|(i, raw)| normalize(raw, &format!("{base}-{i}"), now))
        .collect()
}
