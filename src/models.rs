use chrono::{DateTime, Local, NaiveDate, Utc};
use serde::Serialize;

/// Opaque task identifier. Local tasks use a millisecond timestamp,
/// remote tasks use whatever key the backend generates.
pub type TaskId = String;

/// Identifier of an authenticated account.
pub type UserId = String;

/// Represents a single to-do item scoped to a calendar day.
///
/// Serializes to the local blob format (camelCase keys, RFC 3339 timestamps,
/// `YYYY-MM-DD` day). The owner is never written to the local blob.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Unique identifier, stable for the task's lifetime.
    pub id: TaskId,
    /// What needs to be done. Never empty.
    pub title: String,
    /// Whether the task has been completed.
    pub completed: bool,
    /// When the task was created.
    pub created_at: DateTime<Utc>,
    /// When the task was completed; present iff `completed`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Optional deadline chosen by the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    /// Day the task is grouped under. Equals the local day of `deadline` when
    /// one is set.
    pub date: NaiveDate,
    /// Owning account, only set for tasks that live in the remote store.
    #[serde(skip)]
    pub owner: Option<UserId>,
}

impl Task {
    /// Builds a fresh, incomplete task. The day is derived from the deadline
    /// when one is given.
    pub fn new(
        id: TaskId,
        title: &str,
        date: NaiveDate,
        deadline: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> Task {
        Task {
            id,
            title: title.trim().to_string(),
            completed: false,
            created_at: now,
            completed_at: None,
            deadline,
            date: derive_date(deadline, date),
            owner: None,
        }
    }

    /// Flips completion, stamping or clearing `completed_at`.
    pub fn toggle(&mut self, now: DateTime<Utc>) {
        self.completed = !self.completed;
        self.completed_at = if self.completed { Some(now) } else { None };
    }

    /// Whether this task shows up on the given day.
    pub fn is_on(&self, day: NaiveDate) -> bool {
        match self.deadline {
            Some(deadline) => local_day(deadline) == day,
            None => self.date == day,
        }
    }
}

/// The day a task is grouped under: the deadline's local day if set,
/// otherwise the fallback day.
pub fn derive_date(deadline: Option<DateTime<Utc>>, fallback: NaiveDate) -> NaiveDate {
    deadline.map(local_day).unwrap_or(fallback)
}

/// Calendar day of a timestamp in the local time zone.
pub fn local_day(ts: DateTime<Utc>) -> NaiveDate {
    ts.with_timezone(&Local).date_naive()
}

/// Allocates a timestamp-derived id that does not collide with `existing`.
pub fn next_local_id(existing: &[Task], now: DateTime<Utc>) -> TaskId {
    let mut millis = now.timestamp_millis();
    loop {
        let id = millis.to_string();
        if !existing.iter().any(|t| t.id == id) {
            return id;
        }
        millis += 1;
    }
}
