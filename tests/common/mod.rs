#![allow(dead_code)]

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, NaiveDate, Utc};
use joytask::error::{JoytaskError, Result};
use joytask::models::Task;
use joytask::reconciler::Reconciler;
use joytask::remote::{NewTask, RemoteTaskStore};
use joytask::storage::{KeyValueStore, LocalStore, MemoryKvStore, TASKS_KEY};

#[derive(Default)]
pub struct RemoteState {
    pub rows: Vec<Task>,
    pub next_id: u64,
    pub fail_list: bool,
    pub fail_insert: bool,
    pub fail_bulk: bool,
    pub fail_update: bool,
    pub fail_delete: bool,
    pub bulk_calls: usize,
}

/// Remote store kept in memory, with switches to make calls fail.
#[derive(Clone, Default)]
pub struct FakeRemote {
    inner: Arc<Mutex<RemoteState>>,
}

impl FakeRemote {
    pub fn new() -> FakeRemote {
        FakeRemote::default()
    }

    pub fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.inner.lock().unwrap()
    }

    pub fn rows_for(&self, user: &str) -> Vec<Task> {
        self.state()
            .rows
            .iter()
            .filter(|t| t.owner.as_deref() == Some(user))
            .cloned()
            .collect()
    }

    /// Seeds a remote row for `user`.
    pub fn seed(&self, user: &str, title: &str) -> Task {
        let mut state = self.state();
        let task = owned(&mut state, user, sample(title, day(2024, 1, 1)));
        state.rows.push(task.clone());
        task
    }
}

fn owned(state: &mut RemoteState, user: &str, mut task: Task) -> Task {
    state.next_id += 1;
    task.id = format!("remote-{}", state.next_id);
    task.owner = Some(user.to_string());
    task
}

fn offline(what: &str) -> JoytaskError {
    JoytaskError::Remote(format!("{what} failed: offline"))
}

impl RemoteTaskStore for FakeRemote {
    fn list(&self, user: &str) -> Result<Vec<Task>> {
        if self.state().fail_list {
            return Err(offline("list"));
        }
        Ok(self.rows_for(user))
    }

    fn insert(&self, user: &str, new: &NewTask) -> Result<Task> {
        let mut state = self.state();
        if state.fail_insert {
            return Err(offline("insert"));
        }
        let task = Task::new(String::new(), &new.title, new.date, new.deadline, Utc::now());
        let task = owned(&mut state, user, task);
        state.rows.push(task.clone());
        Ok(task)
    }

    fn bulk_insert(&self, user: &str, tasks: &[Task]) -> Result<()> {
        let mut state = self.state();
        state.bulk_calls += 1;
        if state.fail_bulk {
            return Err(offline("bulk insert"));
        }
        for task in tasks {
            let task = owned(&mut state, user, task.clone());
            state.rows.push(task);
        }
        Ok(())
    }

    fn update_completion(&self, id: &str, completed: bool, completed_at: Option<DateTime<Utc>>) -> Result<()> {
        let mut state = self.state();
        if state.fail_update {
            return Err(offline("update"));
        }
        let row = state
            .rows
            .iter_mut()
            .find(|t| t.id == id)
            .ok_or_else(|| JoytaskError::NotFound(id.to_string()))?;
        row.completed = completed;
        row.completed_at = completed_at;
        Ok(())
    }

    fn delete(&self, user: &str, id: &str) -> Result<()> {
        let mut state = self.state();
        if state.fail_delete {
            return Err(offline("delete"));
        }
        state.rows.retain(|t| t.id != id || t.owner.as_deref() != Some(user));
        Ok(())
    }
}

pub fn day(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn sample(title: &str, date: NaiveDate) -> Task {
    Task::new(String::new(), title, date, None, Utc::now())
}

/// A reconciler over an in-memory key-value store and a fake remote.
pub struct Harness {
    pub kv: MemoryKvStore,
    pub remote: FakeRemote,
}

impl Harness {
    pub fn new() -> Harness {
        Harness { kv: MemoryKvStore::new(), remote: FakeRemote::new() }
    }

    pub fn with_local_blob(blob: &str) -> Harness {
        let harness = Harness::new();
        harness.kv.set(TASKS_KEY, blob).unwrap();
        harness
    }

    pub fn reconciler(&self) -> Reconciler {
        Reconciler::new(
            LocalStore::new(Box::new(self.kv.clone())),
            Box::new(self.remote.clone()),
        )
    }

    pub fn local(&self) -> LocalStore {
        LocalStore::new(Box::new(self.kv.clone()))
    }

    pub fn blob(&self) -> Option<String> {
        self.kv.get(TASKS_KEY).unwrap()
    }
}
