use std::io::{self, Write};
use std::sync::mpsc::Receiver;

use chrono::{Datelike, Local, NaiveDate};
use comfy_table::presets::UTF8_FULL;
use comfy_table::{Attribute, Cell, Color, ContentArrangement, Table};

use crate::auth::{AuthEvent, AuthProvider};
use crate::models::Task;
use crate::normalize::{parse_day, parse_deadline};
use crate::reconciler::{Outcome, Phase, Reconciler, Session};
use crate::storage::FileKvStore;
use crate::views::{month_grid, split_day, tasks_for_day, DayStats, Stats};

fn today() -> NaiveDate {
    Local::now().date_naive()
}

/// Parses an optional `YYYY-MM-DD` argument, defaulting to today.
fn day_arg(date: Option<String>, silent: bool) -> Option<NaiveDate> {
    match date {
        None => Some(today()),
        Some(raw) => {
            let parsed = parse_day(&raw);
            if parsed.is_none() && !silent {
                eprintln!("Invalid date '{}'. Use YYYY-MM-DD.", raw);
            }
            parsed
        }
    }
}

/// Adds a task for `date` (today by default).
///
/// A deadline moves the task to the deadline's day. A bare date deadline
/// means the end of that day.
pub fn cmd_add(rec: &mut Reconciler, title: String, date: Option<String>, deadline: Option<String>, silent: bool) {
    let Some(day) = day_arg(date, silent) else { return };
    let deadline = match deadline {
        None => None,
        Some(raw) => match parse_deadline(&raw) {
            Some(d) => Some(d),
            None => {
                if !silent { eprintln!("Invalid deadline '{}'. Use YYYY-MM-DD or YYYY-MM-DDTHH:MM.", raw); }
                return;
            }
        },
    };

    match rec.add_task(&title, day, deadline) {
        Ok(Some(t)) => { if !silent { println!("Task added (id = {}) for {}", t.id, t.date); } }
        Ok(None) => { if !silent { eprintln!("Could not save the task. Try again later."); } }
        Err(e) => { if !silent { eprintln!("{}", e); } }
    }
}

/// Toggles completion of a task by id or unique id prefix.
pub fn cmd_toggle(rec: &mut Reconciler, id: String, silent: bool) {
    let id = match rec.resolve_id(&id) {
        Ok(id) => id,
        Err(e) => { if !silent { eprintln!("{}", e); } return; }
    };
    match rec.toggle_task(&id) {
        Ok(Outcome::Applied) => {
            if !silent {
                let done = rec.tasks().iter().any(|t| t.id == id && t.completed);
                println!("Task {} marked as {}.", id, if done { "done" } else { "not done" });
            }
        }
        Ok(_) => { if !silent { eprintln!("Task {} could not be updated; change reverted.", id); } }
        Err(e) => { if !silent { eprintln!("{}", e); } }
    }
}

/// Removes a task by id or unique id prefix.
pub fn cmd_remove(rec: &mut Reconciler, id: String, silent: bool) {
    let id = match rec.resolve_id(&id) {
        Ok(id) => id,
        Err(e) => { if !silent { eprintln!("{}", e); } return; }
    };
    match rec.delete_task(&id) {
        Ok(Outcome::Applied) => { if !silent { println!("Task {} removed.", id); } }
        Ok(Outcome::Refreshed) => { if !silent { eprintln!("Task {} could not be removed; list refreshed.", id); } }
        Ok(Outcome::RolledBack) => { if !silent { eprintln!("Task {} could not be removed.", id); } }
        Err(e) => { if !silent { eprintln!("{}", e); } }
    }
}

fn task_table(title: &str, tasks: &[&Task]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec![
            Cell::new("ID").add_attribute(Attribute::Bold),
            Cell::new(title).add_attribute(Attribute::Bold),
            Cell::new("Deadline").add_attribute(Attribute::Bold),
            Cell::new("Status").add_attribute(Attribute::Bold),
        ]);

    let now = chrono::Utc::now();
    for t in tasks {
        let deadline = t
            .deadline
            .map(|d| d.with_timezone(&Local).format("%b %-d, %Y %-I:%M %p").to_string())
            .unwrap_or_default();
        let overdue = !t.completed && t.deadline.is_some_and(|d| d < now);
        let status = match t.completed_at {
            Some(at) => format!("Done {}", at.with_timezone(&Local).format("%b %-d %-I:%M %p")),
            None => "Pending".to_string(),
        };
        table.add_row(vec![
            Cell::new(&t.id),
            Cell::new(&t.title),
            Cell::new(deadline).fg(if overdue { Color::Red } else { Color::Reset }),
            Cell::new(status).fg(if t.completed { Color::Green } else { Color::Yellow }),
        ]);
    }
    table
}

/// Shows one day: statistics, then active and completed tasks.
pub fn cmd_day(rec: &Reconciler, date: Option<String>) {
    let Some(day) = day_arg(date, false) else { return };
    let day_tasks = tasks_for_day(rec.tasks(), day);
    let stats = DayStats::of(&day_tasks);

    println!("{}", day.format("%A, %B %-d, %Y"));
    println!("{} total | {} completed | {} pending", stats.total, stats.completed, stats.pending);

    if day_tasks.is_empty() {
        println!("No tasks for this day.");
        return;
    }
    let (active, done) = split_day(&day_tasks);
    if !active.is_empty() {
        println!("{}", task_table("Active", &active));
    }
    if !done.is_empty() {
        println!("{}", task_table("Completed", &done));
    }
}

/// Prints a month grid (`YYYY-MM`, current month by default) with
/// completed/total counts per day.
pub fn cmd_calendar(rec: &Reconciler, month: Option<String>) {
    let month = match month {
        None => today(),
        Some(raw) => match parse_day(&format!("{}-01", raw.trim())) {
            Some(d) => d,
            None => {
                eprintln!("Invalid month '{}'. Use YYYY-MM.", raw);
                return;
            }
        },
    };
    let grid = month_grid(rec.tasks(), month, today());

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"]
            .into_iter()
            .map(|d| Cell::new(d).add_attribute(Attribute::Bold)));

    for week in grid.chunks(7) {
        table.add_row(week.iter().map(|cell| {
            let stats = cell.stats();
            let mut text = cell.date.day().to_string();
            if stats.total > 0 {
                text.push_str(&format!("\n{}/{}", stats.completed, stats.total));
            }
            let color = if !cell.in_month {
                Color::DarkGrey
            } else if stats.total > 0 && stats.pending == 0 {
                Color::Green
            } else if stats.pending > 0 {
                Color::Yellow
            } else {
                Color::Reset
            };
            let mut c = Cell::new(text).fg(color);
            if cell.is_today {
                c = c.add_attribute(Attribute::Bold).add_attribute(Attribute::Underlined);
            }
            c
        }));
    }

    println!("{}", month.format("%B %Y"));
    println!("{table}");
}

pub fn cmd_stats(rec: &Reconciler) {
    let stats = Stats::compute(rec.tasks(), today());
    let mut table = Table::new();
    table.load_preset(UTF8_FULL)
        .set_header(vec!["Completed Today", "Total Completed", "Active"]);
    table.add_row(vec![
        Cell::new(stats.completed_today).fg(Color::Green),
        Cell::new(stats.total_completed),
        Cell::new(stats.total_active).fg(Color::Yellow),
    ]);
    println!("{table}");
}

/// Signs in and switches to the remote source, migrating local tasks on the
/// first login.
pub fn cmd_login(auth: &dyn AuthProvider, rec: &mut Reconciler, events: &Receiver<AuthEvent>, email: String, password: String) {
    match auth.sign_in(&email, &password) {
        Ok(user) => {
            rec.pump(events);
            println!("Signed in as {} ({} tasks).", email, rec.tasks().len());
            if rec.state().local.is_empty() {
                return;
            }
            eprintln!("Local tasks for {} have not been uploaded yet; run `joytask sync` to retry.", user);
        }
        Err(e) => eprintln!("Sign-in failed: {}", e),
    }
}

pub fn cmd_logout(auth: &dyn AuthProvider, rec: &mut Reconciler, events: &Receiver<AuthEvent>) {
    if matches!(rec.session(), Session::Unauthenticated) {
        println!("Not signed in.");
        return;
    }
    match auth.sign_out() {
        Ok(()) => {
            rec.pump(events);
            println!("Signed out.");
        }
        Err(e) => eprintln!("Sign-out failed: {}", e),
    }
}

pub fn cmd_whoami(rec: &Reconciler) {
    match rec.session() {
        Session::Unauthenticated => println!("Not signed in (tasks are stored locally)."),
        Session::Authenticated { user } => println!("Signed in as {}.", user),
        Session::Migrating { user, phase: Phase::Stalled } => {
            println!("Signed in as {} (account unreachable, read-only; run `joytask sync` to retry).", user)
        }
        Session::Migrating { user, phase } => println!("Signed in as {} ({:?}).", user, phase),
    }
}

/// Re-runs the load for the signed-in user, retrying a pending migration.
pub fn cmd_sync(rec: &mut Reconciler) {
    if matches!(rec.session(), Session::Unauthenticated) {
        println!("Not signed in; nothing to sync.");
        return;
    }
    rec.reconcile();
    println!("{} tasks loaded.", rec.tasks().len());
}

/// Deletes the local store (guest tasks and markers).
pub fn cmd_reset(store: &FileKvStore, force: bool) {
    if !force {
        print!("Are you sure you want to delete all local tasks? This cannot be undone. [y/N] ");
        let _ = io::stdout().flush();
        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() || input.trim().to_lowercase() != "y" {
            println!("Aborted.");
            return;
        }
    }

    if let Err(e) = store.delete() {
        eprintln!("Failed to reset local store: {}", e);
    } else {
        println!("Local store reset successfully.");
    }
}
