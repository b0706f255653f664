mod common;

use chrono::{Local, TimeZone, Utc};
use common::{day, Harness};
use joytask::auth::AuthEvent;
use joytask::models::local_day;
use joytask::reconciler::{Outcome, Phase, Session};
use joytask::storage::KeyValueStore;
use std::sync::mpsc;

const BUY_MILK: &str = r#"[{"id":"1704103200000","title":"Buy milk","completed":false,
    "createdAt":"2024-01-01T10:00:00Z","date":"2024-01-01"}]"#;

#[test]
fn test_first_login_migrates_local_tasks() {
    let h = Harness::with_local_blob(BUY_MILK);
    let mut rec = h.reconciler();
    rec.start(None);
    assert_eq!(rec.tasks().len(), 1);

    rec.handle_auth_event(AuthEvent::SignedIn("u1".into()));

    let rows = h.remote.rows_for("u1");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "Buy milk");
    assert_eq!(rows[0].date, day(2024, 1, 1));
    assert_eq!(h.blob(), None);
    assert!(h.local().is_migrated("u1").unwrap());
    assert_eq!(h.local().last_user().unwrap().as_deref(), Some("u1"));

    assert_eq!(*rec.session(), Session::Authenticated { user: "u1".into() });
    assert_eq!(rec.tasks()[0].id, rows[0].id);
}

#[test]
fn test_migration_preserves_count_and_content() {
    let blob = r#"[
        {"id":"1","title":"One","completed":false,"createdAt":"2024-01-01T10:00:00Z","date":"2024-01-01"},
        {"id":"2","title":"Two","completed":true,"createdAt":"2024-01-02T10:00:00Z",
         "completedAt":"2024-01-02T12:00:00Z","date":"2024-01-02"},
        {"id":"3","title":"Three","completed":false,"createdAt":"2024-01-03T10:00:00Z","date":"2024-01-05"}
    ]"#;
    let h = Harness::with_local_blob(blob);
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));

    let mut rows = h.remote.rows_for("u1");
    rows.sort_by(|a, b| a.created_at.cmp(&b.created_at));
    let summary: Vec<_> = rows.iter().map(|t| (t.title.as_str(), t.completed, t.date)).collect();
    assert_eq!(
        summary,
        vec![
            ("One", false, day(2024, 1, 1)),
            ("Two", true, day(2024, 1, 2)),
            ("Three", false, day(2024, 1, 5)),
        ]
    );
    assert_eq!(rows[1].completed_at, Some(Utc.with_ymd_and_hms(2024, 1, 2, 12, 0, 0).unwrap()));
}

#[test]
fn test_migration_runs_once() {
    let h = Harness::with_local_blob(BUY_MILK);
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));
    assert_eq!(h.remote.state().bulk_calls, 1);

    // Same local data reappears (e.g. written by an older session).
    h.kv.set(joytask::storage::TASKS_KEY, BUY_MILK).unwrap();
    rec.reconcile();
    let mut second = h.reconciler();
    second.start(Some("u1".into()));

    assert_eq!(h.remote.state().bulk_calls, 1);
    assert_eq!(h.remote.rows_for("u1").len(), 1);
    assert_eq!(h.blob(), None);
}

#[test]
fn test_empty_local_blob_still_marks_migrated() {
    let h = Harness::new();
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));

    assert_eq!(h.remote.state().bulk_calls, 0);
    assert!(h.local().is_migrated("u1").unwrap());
    assert!(rec.tasks().is_empty());
}

#[test]
fn test_failed_migration_is_retried() {
    let h = Harness::with_local_blob(BUY_MILK);
    h.remote.state().fail_bulk = true;
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));

    assert!(!h.local().is_migrated("u1").unwrap());
    assert!(h.blob().is_some());
    assert!(h.remote.rows_for("u1").is_empty());
    assert_eq!(*rec.session(), Session::Migrating { user: "u1".into(), phase: Phase::Stalled });

    h.remote.state().fail_bulk = false;
    rec.reconcile();

    assert!(h.local().is_migrated("u1").unwrap());
    assert_eq!(h.blob(), None);
    assert_eq!(h.remote.rows_for("u1").len(), 1);
    assert_eq!(rec.tasks().len(), 1);
}

#[test]
fn test_new_login_with_stale_remote_rows_purges_them() {
    let h = Harness::new();
    h.local().set_last_user("b").unwrap();
    h.remote.seed("a", "left over");
    h.remote.seed("a", "also left over");
    h.remote.seed("b", "someone else");

    let mut rec = h.reconciler();
    rec.start(None);
    rec.handle_auth_event(AuthEvent::SignedIn("a".into()));

    assert!(h.remote.rows_for("a").is_empty());
    assert_eq!(h.remote.rows_for("b").len(), 1);
    assert!(rec.tasks().is_empty());
    assert_eq!(h.local().last_user().unwrap().as_deref(), Some("a"));
}

#[test]
fn test_returning_user_keeps_remote_rows() {
    let h = Harness::new();
    h.local().set_last_user("b").unwrap();
    h.local().set_migrated("a").unwrap();
    h.remote.seed("a", "keep me");

    let mut rec = h.reconciler();
    rec.start(Some("a".into()));

    assert_eq!(h.remote.rows_for("a").len(), 1);
    assert_eq!(rec.tasks()[0].title, "keep me");
}

#[test]
fn test_existing_remote_rows_skip_migration_and_drop_local() {
    let h = Harness::with_local_blob(BUY_MILK);
    h.local().set_last_user("a").unwrap();
    h.remote.seed("a", "already there");

    let mut rec = h.reconciler();
    rec.start(Some("a".into()));

    assert_eq!(h.remote.state().bulk_calls, 0);
    assert_eq!(h.blob(), None);
    assert!(h.local().is_migrated("a").unwrap());
    assert_eq!(rec.tasks().len(), 1);
}

#[test]
fn test_sign_out_clears_blob_and_last_user_but_keeps_marker() {
    let h = Harness::new();
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));
    rec.add_task("remote task", day(2024, 1, 1), None).unwrap();

    let (tx, rx) = mpsc::channel();
    tx.send(AuthEvent::SignedOut).unwrap();
    rec.pump(&rx);

    assert_eq!(*rec.session(), Session::Unauthenticated);
    assert!(rec.tasks().is_empty());
    assert_eq!(h.blob(), None);
    assert_eq!(h.local().last_user().unwrap(), None);
    assert!(h.local().is_migrated("u1").unwrap());
}

#[test]
fn test_unauthenticated_writes_through_to_local_blob() {
    let h = Harness::new();
    let mut rec = h.reconciler();
    rec.start(None);

    let task = rec.add_task("Walk dog", day(2024, 2, 1), None).unwrap().unwrap();
    let stored = h.local().load_tasks().unwrap();
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].id, task.id);

    rec.toggle_task(&task.id).unwrap();
    assert!(h.local().load_tasks().unwrap()[0].completed);

    rec.delete_task(&task.id).unwrap();
    assert!(h.local().load_tasks().unwrap().is_empty());
}

#[test]
fn test_deadline_sets_date_on_creation() {
    let h = Harness::new();
    let mut rec = h.reconciler();
    rec.start(None);

    let deadline = Local.with_ymd_and_hms(2024, 4, 20, 9, 30, 0).unwrap().with_timezone(&Utc);
    let task = rec.add_task("Taxes", day(2024, 4, 1), Some(deadline)).unwrap().unwrap();
    assert_eq!(task.date, day(2024, 4, 20));
    assert_eq!(task.date, local_day(deadline));

    rec.handle_auth_event(AuthEvent::SignedIn("u1".into()));
    let remote = rec.add_task("Remote taxes", day(2024, 4, 1), Some(deadline)).unwrap().unwrap();
    assert_eq!(remote.date, day(2024, 4, 20));
}

#[test]
fn test_empty_title_is_rejected() {
    let h = Harness::new();
    let mut rec = h.reconciler();
    rec.start(None);
    assert!(rec.add_task("   ", day(2024, 1, 1), None).is_err());
    assert!(rec.tasks().is_empty());
}

#[test]
fn test_toggle_twice_restores_completion() {
    let h = Harness::new();
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));
    let task = rec.add_task("Call mum", day(2024, 1, 1), None).unwrap().unwrap();

    assert_eq!(rec.toggle_task(&task.id).unwrap(), Outcome::Applied);
    assert!(rec.tasks()[0].completed_at.is_some());
    assert_eq!(rec.toggle_task(&task.id).unwrap(), Outcome::Applied);

    let after = &rec.tasks()[0];
    assert_eq!((after.completed, after.completed_at), (task.completed, task.completed_at));
    assert!(!h.remote.rows_for("u1")[0].completed);
}

#[test]
fn test_remote_toggle_failure_rolls_back() {
    let h = Harness::new();
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));
    let task = rec.add_task("Call mum", day(2024, 1, 1), None).unwrap().unwrap();

    h.remote.state().fail_update = true;
    assert_eq!(rec.toggle_task(&task.id).unwrap(), Outcome::RolledBack);
    assert!(!rec.tasks()[0].completed);
    assert_eq!(rec.tasks()[0].completed_at, None);
}

#[test]
fn test_remote_delete_failure_refetches() {
    let h = Harness::new();
    h.local().set_migrated("u1").unwrap();
    let seeded = h.remote.seed("u1", "stubborn");
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));

    h.remote.state().fail_delete = true;
    assert_eq!(rec.delete_task(&seeded.id).unwrap(), Outcome::Refreshed);
    assert_eq!(rec.tasks().len(), 1);

    h.remote.state().fail_list = true;
    assert_eq!(rec.delete_task(&seeded.id).unwrap(), Outcome::RolledBack);
    assert_eq!(rec.tasks().len(), 1);
}

#[test]
fn test_remote_insert_failure_leaves_list_unchanged() {
    let h = Harness::new();
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));
    h.remote.state().fail_insert = true;

    assert_eq!(rec.add_task("lost", day(2024, 1, 1), None).unwrap(), None);
    assert!(rec.tasks().is_empty());
}

#[test]
fn test_unreachable_remote_on_login_changes_nothing_persisted() {
    let h = Harness::with_local_blob(BUY_MILK);
    h.remote.state().fail_list = true;
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));

    assert!(h.blob().is_some());
    assert!(!h.local().is_migrated("u1").unwrap());
    assert_eq!(h.local().last_user().unwrap(), None);
}

#[test]
fn test_unreachable_remote_blocks_writes_until_next_load() {
    let h = Harness::with_local_blob(BUY_MILK);
    h.remote.state().fail_list = true;
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));

    h.remote.state().fail_list = false;
    assert_eq!(rec.add_task("Important", day(2024, 1, 2), None).unwrap(), None);
    assert!(h.remote.rows_for("u1").is_empty());

    let mut next = h.reconciler();
    next.start(Some("u1".into()));

    let rows = h.remote.rows_for("u1");
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].title, "Buy milk");
    assert_eq!(next.tasks().len(), 1);
    assert!(h.local().is_migrated("u1").unwrap());
}

#[test]
fn test_reconcile_recovers_after_unreachable_remote() {
    let h = Harness::with_local_blob(BUY_MILK);
    h.remote.state().fail_list = true;
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));
    assert!(matches!(rec.session(), Session::Migrating { phase: Phase::Stalled, .. }));

    h.remote.state().fail_list = false;
    rec.reconcile();

    assert_eq!(*rec.session(), Session::Authenticated { user: "u1".into() });
    assert_eq!(h.remote.rows_for("u1").len(), 1);
    assert_eq!(h.blob(), None);

    let added = rec.add_task("Important", day(2024, 1, 2), None).unwrap();
    assert!(added.is_some());
    assert_eq!(h.remote.rows_for("u1").len(), 2);
}

#[test]
fn test_failed_purge_keeps_rows_and_local_tasks() {
    let h = Harness::with_local_blob(BUY_MILK);
    h.local().set_last_user("b").unwrap();
    h.remote.seed("a", "left over");
    h.remote.state().fail_delete = true;

    let mut rec = h.reconciler();
    rec.start(Some("a".into()));

    assert_eq!(rec.add_task("new", day(2024, 1, 2), None).unwrap(), None);
    assert_eq!(h.remote.rows_for("a").len(), 1);
    assert!(h.blob().is_some());
    assert_eq!(h.local().last_user().unwrap().as_deref(), Some("b"));
}

#[test]
fn test_migration_keeps_deadline_day() {
    let blob = r#"[{"id":"1","title":"File taxes","completed":false,"createdAt":"2024-01-01T10:00:00Z",
        "date":"2024-01-01","deadline":"2024-03-05T12:00:00"}]"#;
    let h = Harness::with_local_blob(blob);
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));

    let rows = h.remote.rows_for("u1");
    assert_eq!(rows.len(), 1);
    let deadline = rows[0].deadline.unwrap();
    assert_eq!(deadline, Local.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap().with_timezone(&Utc));
    assert_eq!(rows[0].date, day(2024, 3, 5));
    assert_eq!(rec.tasks()[0].date, local_day(deadline));
}

#[test]
fn test_purge_leaves_other_accounts_alone() {
    let h = Harness::new();
    h.local().set_last_user("b").unwrap();
    let mine = h.remote.seed("a", "stale");
    h.remote.seed("b", "keep");

    // Same id under another owner must survive a scoped delete.
    h.remote.state().rows[1].id = mine.id.clone();

    let mut rec = h.reconciler();
    rec.start(Some("a".into()));

    assert!(h.remote.rows_for("a").is_empty());
    assert_eq!(h.remote.rows_for("b").len(), 1);
}

#[test]
fn test_malformed_task_does_not_block_load() {
    let blob = r#"[
        {"id":"1","title":"Good","completed":false,"createdAt":"2024-01-01T10:00:00Z","date":"2024-01-01"},
        {"id":"2","title":"Bad deadline","completed":false,"createdAt":"not a date","deadline":"31/02/2024"},
        {"id":"3","title":"Also good","completed":false,"createdAt":"2024-01-03T10:00:00Z","date":"2024-01-03"}
    ]"#;
    let h = Harness::with_local_blob(blob);
    let mut rec = h.reconciler();
    rec.start(None);

    let tasks = rec.tasks();
    assert_eq!(tasks.len(), 3);
    let bad = tasks.iter().find(|t| t.id == "2").unwrap();
    assert_eq!(bad.deadline, None);
    assert!((Utc::now() - bad.created_at).num_seconds() < 60);
    assert_eq!(bad.date, local_day(bad.created_at));
}

#[test]
fn test_resolve_id_prefix() {
    let h = Harness::new();
    h.local().set_migrated("u1").unwrap();
    h.remote.seed("u1", "first");
    h.remote.seed("u1", "second");
    let mut rec = h.reconciler();
    rec.start(Some("u1".into()));

    assert_eq!(rec.resolve_id("remote-1").unwrap(), "remote-1");
    assert!(rec.resolve_id("remote-").is_err());
    assert!(rec.resolve_id("missing").is_err());
}
