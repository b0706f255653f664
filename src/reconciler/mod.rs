//! Decides where tasks live for the current session and keeps both stores
//! consistent with the in-memory task list.
//!
//! The ordering rules live in the pure [`machine`]; [`Reconciler`] only
//! performs the effects it asks for and feeds the results back in.

pub mod machine;

use std::collections::VecDeque;
use std::sync::mpsc::Receiver;

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{error, info, warn};

use crate::auth::AuthEvent;
use crate::error::{JoytaskError, Result};
use crate::models::{derive_date, next_local_id, Task, TaskId};
use crate::remote::{NewTask, RemoteTaskStore};
use crate::storage::LocalStore;

pub use machine::{Effect, Event, Phase, ReconcilerState, Session};

/// What happened to an optimistic mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The change is in memory and persisted.
    Applied,
    /// The remote store refused it; the previous list was restored.
    RolledBack,
    /// The remote store refused it; the list was re-read from the remote store.
    Refreshed,
}

pub struct Reconciler {
    local: LocalStore,
    remote: Box<dyn RemoteTaskStore>,
    state: ReconcilerState,
}

impl Reconciler {
    pub fn new(local: LocalStore, remote: Box<dyn RemoteTaskStore>) -> Reconciler {
        Reconciler {
            local,
            remote,
            state: ReconcilerState::default(),
        }
    }

    /// Loads the local source and, if a session already exists, switches to
    /// the remote source for that user.
    pub fn start(&mut self, user: Option<String>) {
        self.state.last_seen_user = self.local.last_user().unwrap_or_else(|e| {
            warn!(error = %e, "could not read last-seen user");
            None
        });
        self.reload_local();
        self.state.tasks = self.state.local.clone();
        if let Some(user) = user {
            self.handle_auth_event(AuthEvent::SignedIn(user));
        }
    }

    pub fn handle_auth_event(&mut self, event: AuthEvent) {
        match event {
            AuthEvent::SignedIn(user) => {
                self.reload_local();
                match self.local.is_migrated(&user) {
                    Ok(true) => {
                        self.state.migrated.insert(user.clone());
                    }
                    Ok(false) => {}
                    Err(e) => warn!(error = %e, user = %user, "could not read migration marker"),
                }
                self.dispatch(Event::SignedIn(user));
            }
            AuthEvent::SignedOut => self.dispatch(Event::SignedOut),
        }
    }

    /// Applies every auth event queued on `events`.
    pub fn pump(&mut self, events: &Receiver<AuthEvent>) {
        for event in events.try_iter() {
            self.handle_auth_event(event);
        }
    }

    /// Runs the load for the current user again, retrying a migration that
    /// previously failed. No-op when signed out.
    pub fn reconcile(&mut self) {
        self.reload_local();
        self.dispatch(Event::Reconcile);
    }

    pub fn tasks(&self) -> &[Task] {
        &self.state.tasks
    }

    pub fn session(&self) -> &Session {
        &self.state.session
    }

    pub fn state(&self) -> &ReconcilerState {
        &self.state
    }

    /// Resolves a full id or a unique id prefix.
    pub fn resolve_id(&self, query: &str) -> Result<TaskId> {
        if let Some(t) = self.state.tasks.iter().find(|t| t.id == query) {
            return Ok(t.id.clone());
        }
        let mut matches = self.state.tasks.iter().filter(|t| t.id.starts_with(query));
        match (matches.next(), matches.next()) {
            (Some(t), None) => Ok(t.id.clone()),
            (Some(_), Some(_)) => Err(JoytaskError::InvalidTask(format!("id prefix '{query}' is ambiguous"))),
            (None, _) => Err(JoytaskError::NotFound(query.to_string())),
        }
    }

    /// Creates a task. Returns `None` when the remote store rejected it.
    pub fn add_task(
        &mut self,
        title: &str,
        date: NaiveDate,
        deadline: Option<DateTime<Utc>>,
    ) -> Result<Option<Task>> {
        if title.trim().is_empty() {
            return Err(JoytaskError::InvalidTask("title must not be empty".to_string()));
        }
        match self.state.session.clone() {
            Session::Unauthenticated => {
                let id = next_local_id(&self.state.tasks, Utc::now());
                let task = Task::new(id, title, date, deadline, Utc::now());
                self.state.tasks.push(task.clone());
                self.write_local();
                Ok(Some(task))
            }
            Session::Authenticated { user } => {
                let new = NewTask {
                    title: title.trim().to_string(),
                    date: derive_date(deadline, date),
                    deadline,
                };
                match self.remote.insert(&user, &new) {
                    Ok(task) => {
                        self.state.tasks.push(task.clone());
                        Ok(Some(task))
                    }
                    Err(e) => {
                        warn!(error = %e, "remote insert failed");
                        Ok(None)
                    }
                }
            }
            Session::Migrating { phase, .. } => {
                warn!(?phase, "add refused until the remote store is settled");
                Ok(None)
            }
        }
    }

    /// Flips completion. Remote failures restore the previous list.
    pub fn toggle_task(&mut self, id: &str) -> Result<Outcome> {
        let index = self.index_of(id)?;
        let snapshot = self.state.tasks.clone();
        self.state.tasks[index].toggle(Utc::now());

        match self.state.session.clone() {
            Session::Unauthenticated => {
                self.write_local();
                Ok(Outcome::Applied)
            }
            Session::Authenticated { .. } => {
                let task = &self.state.tasks[index];
                match self.remote.update_completion(&task.id, task.completed, task.completed_at) {
                    Ok(()) => Ok(Outcome::Applied),
                    Err(e) => {
                        warn!(error = %e, task = id, "remote toggle failed, rolling back");
                        self.state.tasks = snapshot;
                        Ok(Outcome::RolledBack)
                    }
                }
            }
            Session::Migrating { .. } => {
                self.state.tasks = snapshot;
                Ok(Outcome::RolledBack)
            }
        }
    }

    /// Removes a task. A failed remote delete re-reads the remote list.
    pub fn delete_task(&mut self, id: &str) -> Result<Outcome> {
        let index = self.index_of(id)?;
        let snapshot = self.state.tasks.clone();
        let removed = self.state.tasks.remove(index);

        match self.state.session.clone() {
            Session::Unauthenticated => {
                self.write_local();
                Ok(Outcome::Applied)
            }
            Session::Authenticated { user } => match self.remote.delete(&user, &removed.id) {
                Ok(()) => Ok(Outcome::Applied),
                Err(e) => {
                    warn!(error = %e, task = id, "remote delete failed, re-fetching");
                    match self.remote.list(&user) {
                        Ok(tasks) => {
                            self.state.tasks = tasks;
                            Ok(Outcome::Refreshed)
                        }
                        Err(e) => {
                            warn!(error = %e, "re-fetch failed, restoring previous list");
                            self.state.tasks = snapshot;
                            Ok(Outcome::RolledBack)
                        }
                    }
                }
            },
            Session::Migrating { .. } => {
                self.state.tasks = snapshot;
                Ok(Outcome::RolledBack)
            }
        }
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.state
            .tasks
            .iter()
            .position(|t| t.id == id)
            .ok_or_else(|| JoytaskError::NotFound(id.to_string()))
    }

    fn reload_local(&mut self) {
        self.state.local = self.local.load_tasks().unwrap_or_else(|e| {
            warn!(error = %e, "could not read local tasks");
            Vec::new()
        });
    }

    /// Write-through for the unauthenticated source.
    fn write_local(&mut self) {
        self.state.local = self.state.tasks.clone();
        if let Err(e) = self.local.save_tasks(&self.state.local) {
            error!(error = %e, "failed to persist local tasks");
        }
    }

    fn dispatch(&mut self, event: Event) {
        let mut queue = VecDeque::from([event]);
        while let Some(event) = queue.pop_front() {
            let state = std::mem::take(&mut self.state);
            let (next, effects) = machine::transition(state, event);
            self.state = next;
            for effect in effects {
                if let Some(follow_up) = self.perform(effect) {
                    queue.push_back(follow_up);
                }
            }
        }
    }

    fn perform(&mut self, effect: Effect) -> Option<Event> {
        match effect {
            Effect::RememberUser(user) => {
                log_write(self.local.set_last_user(&user), "last-seen user");
                None
            }
            Effect::ForgetUser => {
                log_write(self.local.clear_last_user(), "last-seen user");
                None
            }
            Effect::MarkMigrated(user) => {
                log_write(self.local.set_migrated(&user), "migration marker");
                None
            }
            Effect::ClearLocal => {
                log_write(self.local.clear_tasks(), "local task blob");
                None
            }
            Effect::ProbeRemote(user) => Some(match self.remote.list(&user) {
                Ok(tasks) => Event::Probed(tasks),
                Err(e) => {
                    warn!(error = %e, user = %user, "could not list remote tasks");
                    Event::ProbeFailed
                }
            }),
            Effect::FetchRemote(user) => Some(match self.remote.list(&user) {
                Ok(tasks) => Event::Refreshed(tasks),
                Err(e) => {
                    warn!(error = %e, user = %user, "could not list remote tasks");
                    Event::RefreshFailed
                }
            }),
            Effect::PurgeRemote { user, ids } => {
                warn!(user = %user, count = ids.len(), "first login with existing remote tasks, deleting them");
                for id in &ids {
                    if let Err(e) = self.remote.delete(&user, id) {
                        warn!(error = %e, task = %id, "purge failed");
                        return Some(Event::PurgeFailed);
                    }
                }
                Some(Event::Purged)
            }
            Effect::InsertRemote { user, tasks } => Some(match self.remote.bulk_insert(&user, &tasks) {
                Ok(()) => {
                    info!(user = %user, count = tasks.len(), "migrated local tasks");
                    Event::Inserted
                }
                Err(e) => {
                    warn!(error = %e, user = %user, "migration failed, will retry on next load");
                    Event::InsertFailed
                }
            }),
        }
    }
}

fn log_write(result: Result<()>, what: &str) {
    if let Err(e) = result {
        error!(error = %e, "failed to persist {what}");
    }
}
