//! Session source selection as a pure state machine.
//!
//! [`transition`] takes the current [`ReconcilerState`] and one [`Event`] and
//! returns the next state plus the [`Effect`]s the driver must perform, in
//! order. Effects that talk to a store report back through a follow-up event.

use std::collections::BTreeSet;

use tracing::debug;

use crate::models::{Task, TaskId, UserId};

/// Where tasks currently come from.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Session {
    /// Local key-value store is the source.
    #[default]
    Unauthenticated,
    /// Transient: deciding between cleanup, migration, or nothing.
    Migrating { user: UserId, phase: Phase },
    /// Remote store is the source.
    Authenticated { user: UserId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the user's remote task list.
    Probing,
    /// Deleting stale remote tasks of a first-time login.
    Purging,
    /// Waiting for the bulk insert of local tasks.
    Inserting,
    /// Re-reading remote tasks after a confirmed insert.
    Refreshing,
    /// A remote step failed before the user was settled. Mutations are
    /// refused until a `Reconcile` gets through.
    Stalled,
}

/// Everything the reconciler knows. Markers mirror what is persisted in the
/// local key-value store.
#[derive(Debug, Clone, Default)]
pub struct ReconcilerState {
    pub session: Session,
    /// Tasks handed to the presentation layer.
    pub tasks: Vec<Task>,
    /// Mirror of the local task blob.
    pub local: Vec<Task>,
    pub last_seen_user: Option<UserId>,
    pub migrated: BTreeSet<UserId>,
    /// User whose new-login check already ran in this session.
    pub cleanup_checked: Option<UserId>,
}

impl ReconcilerState {
    pub fn user(&self) -> Option<&str> {
        match &self.session {
            Session::Unauthenticated => None,
            Session::Migrating { user, .. } | Session::Authenticated { user } => Some(user),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SignedIn(UserId),
    SignedOut,
    /// Re-run the load for the current user (retries a failed migration).
    Reconcile,
    Probed(Vec<Task>),
    ProbeFailed,
    Purged,
    PurgeFailed,
    Inserted,
    InsertFailed,
    Refreshed(Vec<Task>),
    RefreshFailed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Persist the last-seen-user marker.
    RememberUser(UserId),
    /// Remove the last-seen-user marker.
    ForgetUser,
    /// Persist the migration-complete marker.
    MarkMigrated(UserId),
    /// Remove the local task blob.
    ClearLocal,
    /// List remote tasks; answers with `Probed` or `ProbeFailed`.
    ProbeRemote(UserId),
    /// List remote tasks; answers with `Refreshed` or `RefreshFailed`.
    FetchRemote(UserId),
    /// Delete the given remote tasks; answers with `Purged` or `PurgeFailed`.
    PurgeRemote { user: UserId, ids: Vec<TaskId> },
    /// Bulk-insert tasks for the user; answers with `Inserted` or `InsertFailed`.
    InsertRemote { user: UserId, tasks: Vec<Task> },
}

pub fn transition(mut state: ReconcilerState, event: Event) -> (ReconcilerState, Vec<Effect>) {
    debug!(session = ?state.session, event = event_name(&event), "transition");
    let mut effects = Vec::new();

    match (state.session.clone(), event) {
        (_, Event::SignedIn(user)) => {
            let stalled = matches!(state.session, Session::Migrating { phase: Phase::Stalled, .. });
            if state.user() == Some(user.as_str()) && !stalled {
                return (state, effects);
            }
            state.cleanup_checked = None;
            state.tasks.clear();
            begin_probe(&mut state, &mut effects, user);
        }

        (
            Session::Authenticated { user } | Session::Migrating { user, phase: Phase::Stalled },
            Event::Reconcile,
        ) => {
            begin_probe(&mut state, &mut effects, user);
        }

        (Session::Unauthenticated, Event::SignedOut) => {}
        (_, Event::SignedOut) => {
            state.session = Session::Unauthenticated;
            state.tasks.clear();
            state.local.clear();
            state.last_seen_user = None;
            state.cleanup_checked = None;
            effects.push(Effect::ClearLocal);
            effects.push(Effect::ForgetUser);
        }

        (Session::Migrating { user, phase: Phase::Probing }, Event::Probed(remote)) => {
            on_probed(&mut state, &mut effects, user, remote);
        }

        (Session::Migrating { user, phase: Phase::Probing }, Event::ProbeFailed) => {
            // Nothing was checked; the next pass starts over.
            state.cleanup_checked = None;
            state.tasks.clear();
            state.session = Session::Migrating { user, phase: Phase::Stalled };
        }

        (Session::Migrating { user, phase: Phase::Purging }, Event::Purged) => {
            remember(&mut state, &mut effects, &user);
            mark_migrated(&mut state, &mut effects, &user);
            clear_local(&mut state, &mut effects);
            state.tasks.clear();
            state.session = Session::Authenticated { user };
        }

        (Session::Migrating { user, phase: Phase::Purging }, Event::PurgeFailed) => {
            state.cleanup_checked = None;
            state.tasks.clear();
            state.session = Session::Migrating { user, phase: Phase::Stalled };
        }

        (Session::Migrating { user, phase: Phase::Inserting }, Event::Inserted) => {
            clear_local(&mut state, &mut effects);
            mark_migrated(&mut state, &mut effects, &user);
            effects.push(Effect::FetchRemote(user.clone()));
            state.session = Session::Migrating { user, phase: Phase::Refreshing };
        }

        (Session::Migrating { user, phase: Phase::Inserting }, Event::InsertFailed) => {
            // Local blob and marker stay untouched so the migration can retry.
            state.tasks.clear();
            state.session = Session::Migrating { user, phase: Phase::Stalled };
        }

        (
            Session::Migrating { user, phase: Phase::Refreshing } | Session::Authenticated { user },
            Event::Refreshed(tasks),
        ) => {
            state.tasks = tasks;
            state.session = Session::Authenticated { user };
        }

        (Session::Migrating { user, phase: Phase::Refreshing }, Event::RefreshFailed) => {
            state.tasks.clear();
            state.session = Session::Authenticated { user };
        }

        (session, event) => {
            debug!(?session, event = event_name(&event), "ignoring stale event");
        }
    }

    (state, effects)
}

fn begin_probe(state: &mut ReconcilerState, effects: &mut Vec<Effect>, user: UserId) {
    effects.push(Effect::ProbeRemote(user.clone()));
    state.session = Session::Migrating { user, phase: Phase::Probing };
}

fn on_probed(
    state: &mut ReconcilerState,
    effects: &mut Vec<Effect>,
    user: UserId,
    remote: Vec<Task>,
) {
    let first_check = state.cleanup_checked.as_deref() != Some(user.as_str());
    let new_login = state.last_seen_user.as_deref() != Some(user.as_str());
    let migrated = state.migrated.contains(&user);
    state.cleanup_checked = Some(user.clone());

    if first_check && new_login && !migrated && !remote.is_empty() {
        let ids = remote.iter().map(|t| t.id.clone()).collect();
        effects.push(Effect::PurgeRemote { user: user.clone(), ids });
        state.session = Session::Migrating { user, phase: Phase::Purging };
        return;
    }

    remember(state, effects, &user);

    if migrated || !remote.is_empty() {
        // Remote is authoritative; any local leftovers are irrelevant.
        mark_migrated(state, effects, &user);
        clear_local(state, effects);
        state.tasks = remote;
        state.session = Session::Authenticated { user };
    } else if state.local.is_empty() {
        mark_migrated(state, effects, &user);
        state.tasks.clear();
        state.session = Session::Authenticated { user };
    } else {
        let tasks = state
            .local
            .iter()
            .cloned()
            .map(|mut t| {
                t.owner = Some(user.clone());
                t
            })
            .collect();
        effects.push(Effect::InsertRemote { user: user.clone(), tasks });
        state.session = Session::Migrating { user, phase: Phase::Inserting };
    }
}

fn remember(state: &mut ReconcilerState, effects: &mut Vec<Effect>, user: &str) {
    if state.last_seen_user.as_deref() != Some(user) {
        state.last_seen_user = Some(user.to_string());
        effects.push(Effect::RememberUser(user.to_string()));
    }
}

fn mark_migrated(state: &mut ReconcilerState, effects: &mut Vec<Effect>, user: &str) {
    if state.migrated.insert(user.to_string()) {
        effects.push(Effect::MarkMigrated(user.to_string()));
    }
}

fn clear_local(state: &mut ReconcilerState, effects: &mut Vec<Effect>) {
    state.local.clear();
    effects.push(Effect::ClearLocal);
}

fn event_name(event: &Event) -> &'static str {
    match event {
        Event::SignedIn(_) => "signed_in",
        Event::SignedOut => "signed_out",
        Event::Reconcile => "reconcile",
        Event::Probed(_) => "probed",
        Event::ProbeFailed => "probe_failed",
        Event::Purged => "purged",
        Event::PurgeFailed => "purge_failed",
        Event::Inserted => "inserted",
        Event::InsertFailed => "insert_failed",
        Event::Refreshed(_) => "refreshed",
        Event::RefreshFailed => "refresh_failed",
    }
}
