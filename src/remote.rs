use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Serialize;
use tracing::debug;

use crate::auth::SessionHandle;
use crate::config::BackendConfig;
use crate::error::{JoytaskError, Result};
use crate::models::Task;
use crate::normalize::{normalize_all, StoredTask};

const TASKS_TABLE: &str = "tasks";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Fields the caller provides when creating a remote task. The server
/// assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTask {
    pub title: String,
    pub date: NaiveDate,
    pub deadline: Option<DateTime<Utc>>,
}

/// Row storage for authenticated users' tasks.
pub trait RemoteTaskStore {
    fn list(&self, user: &str) -> Result<Vec<Task>>;
    fn insert(&self, user: &str, task: &NewTask) -> Result<Task>;
    fn bulk_insert(&self, user: &str, tasks: &[Task]) -> Result<()>;
    fn update_completion(
        &self,
        id: &str,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
    /// Deletes the row only if it belongs to `user`.
    fn delete(&self, user: &str, id: &str) -> Result<()>;
}

/// Insert payload in the table's column naming.
#[derive(Serialize)]
struct TaskRow<'a> {
    title: &'a str,
    completed: bool,
    created_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    deadline: Option<DateTime<Utc>>,
    date: NaiveDate,
    user_id: &'a str,
}

impl<'a> TaskRow<'a> {
    fn from_task(task: &'a Task, user: &'a str) -> TaskRow<'a> {
        TaskRow {
            title: &task.title,
            completed: task.completed,
            created_at: task.created_at,
            completed_at: task.completed_at,
            deadline: task.deadline,
            date: task.date,
            user_id: user,
        }
    }
}

#[derive(Serialize)]
struct CompletionPatch {
    completed: bool,
    completed_at: Option<DateTime<Utc>>,
}

/// Task table behind the hosted REST row API, authorised with the current
/// session's access token.
pub struct SupabaseTaskStore {
    client: Client,
    table_url: String,
    anon_key: String,
    session: SessionHandle,
}

impl SupabaseTaskStore {
    pub fn new(backend: &BackendConfig, session: SessionHandle) -> Result<SupabaseTaskStore> {
        Ok(SupabaseTaskStore {
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            table_url: format!("{}/rest/v1/{TASKS_TABLE}", backend.base_url()),
            anon_key: backend.anon_key.clone(),
            session,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> Result<RequestBuilder> {
        let token = self
            .session
            .access_token()
            .ok_or_else(|| JoytaskError::Auth("not signed in".to_string()))?;
        Ok(request.header("apikey", &self.anon_key).bearer_auth(token))
    }

    fn delete_request(&self, user: &str, id: &str) -> RequestBuilder {
        self.client
            .delete(&self.table_url)
            .query(&[("id", format!("eq.{id}")), ("user_id", format!("eq.{user}"))])
    }

    fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let resp = self.authorized(request)?.send()?;
        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().unwrap_or_default();
            return Err(JoytaskError::Remote(format!("{what} failed: HTTP {status} {body}")));
        }
        Ok(resp)
    }
}

impl RemoteTaskStore for SupabaseTaskStore {
    fn list(&self, user: &str) -> Result<Vec<Task>> {
        let owner = format!("eq.{user}");
        let request = self
            .client
            .get(&self.table_url)
            .query(&[("select", "*"), ("user_id", owner.as_str())]);
        let rows: Vec<StoredTask> = self.send(request, "list tasks")?.json()?;
        debug!(user, count = rows.len(), "listed remote tasks");
        Ok(normalize_all(rows, Utc::now()))
    }

    fn insert(&self, user: &str, task: &NewTask) -> Result<Task> {
        let draft = Task::new(String::new(), &task.title, task.date, task.deadline, Utc::now());
        let request = self
            .client
            .post(&self.table_url)
            .header("Prefer", "return=representation")
            .json(&TaskRow::from_task(&draft, user));
        let rows: Vec<StoredTask> = self.send(request, "insert task")?.json()?;
        normalize_all(rows, Utc::now())
            .into_iter()
            .next()
            .ok_or_else(|| JoytaskError::Remote("insert returned no row".to_string()))
    }

    fn bulk_insert(&self, user: &str, tasks: &[Task]) -> Result<()> {
        if tasks.is_empty() {
            return Ok(());
        }
        let rows: Vec<TaskRow> = tasks.iter().map(|t| TaskRow::from_task(t, user)).collect();
        let request = self
            .client
            .post(&self.table_url)
            .header("Prefer", "return=minimal")
            .json(&rows);
        self.send(request, "bulk insert")?;
        Ok(())
    }

    fn update_completion(
        &self,
        id: &str,
        completed: bool,
        completed_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let request = self
            .client
            .patch(&self.table_url)
            .query(&[("id", format!("eq.{id}"))])
            .json(&CompletionPatch { completed, completed_at });
        self.send(request, "update task")?;
        Ok(())
    }

    fn delete(&self, user: &str, id: &str) -> Result<()> {
        self.send(self.delete_request(user, id), "delete task")?;
        Ok(())
    }
}
