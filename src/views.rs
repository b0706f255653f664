use chrono::{Datelike, Duration, NaiveDate};

use crate::models::{local_day, Task};

/// Cells in a month grid: six weeks of seven days.
pub const GRID_CELLS: usize = 42;

/// Counts shown at the top of the task view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Stats {
    /// Tasks completed on `today` (by completion time).
    pub completed_today: usize,
    pub total_completed: usize,
    pub total_active: usize,
}

impl Stats {
    pub fn compute(tasks: &[Task], today: NaiveDate) -> Stats {
        Stats {
            completed_today: tasks
                .iter()
                .filter(|t| t.completed && t.completed_at.map(local_day) == Some(today))
                .count(),
            total_completed: tasks.iter().filter(|t| t.completed).count(),
            total_active: tasks.iter().filter(|t| !t.completed).count(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DayStats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
}

impl DayStats {
    pub fn of(tasks: &[&Task]) -> DayStats {
        let completed = tasks.iter().filter(|t| t.completed).count();
        DayStats {
            total: tasks.len(),
            completed,
            pending: tasks.len() - completed,
        }
    }
}

/// Tasks shown on `day`: deadline day for tasks with a deadline, otherwise
/// their `date`.
pub fn tasks_for_day(tasks: &[Task], day: NaiveDate) -> Vec<&Task> {
    tasks.iter().filter(|t| t.is_on(day)).collect()
}

/// Splits a day's tasks into active (earliest deadline first, then creation
/// order) and completed (most recently completed first).
pub fn split_day<'a>(tasks: &[&'a Task]) -> (Vec<&'a Task>, Vec<&'a Task>) {
    let (mut active, mut done): (Vec<&Task>, Vec<&Task>) =
        tasks.iter().copied().partition(|t| !t.completed);
    active.sort_by_key(|t| (t.deadline.is_none(), t.deadline, t.created_at));
    done.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    (active, done)
}

/// One day in the month grid.
#[derive(Debug, Clone, PartialEq)]
pub struct CalendarCell<'a> {
    pub date: NaiveDate,
    pub in_month: bool,
    pub is_today: bool,
    pub tasks: Vec<&'a Task>,
}

impl CalendarCell<'_> {
    pub fn stats(&self) -> DayStats {
        DayStats::of(&self.tasks)
    }
}

/// First day of the month containing `day`.
pub fn month_start(day: NaiveDate) -> NaiveDate {
    day.with_day(1).unwrap_or(day)
}

pub fn shift_month(month: NaiveDate, delta: i32) -> NaiveDate {
    let index = month.year() * 12 + month.month0() as i32 + delta;
    NaiveDate::from_ymd_opt(index.div_euclid(12), index.rem_euclid(12) as u32 + 1, 1)
        .unwrap_or(month)
}

/// Builds the 42-cell grid for the month containing `month`, starting on the
/// Sunday on or before the 1st.
pub fn month_grid<'a>(tasks: &'a [Task], month: NaiveDate, today: NaiveDate) -> Vec<CalendarCell<'a>> {
    let first = month_start(month);
    let lead = first.weekday().num_days_from_sunday() as i64;
    let grid_start = first - Duration::days(lead);

    (0..GRID_CELLS as i64)
        .map(|offset| {
            let date = grid_start + Duration::days(offset);
            CalendarCell {
                date,
                in_month: date.month() == first.month() && date.year() == first.year(),
                is_today: date == today,
                tasks: tasks
                    .iter()
                    .filter(|t| t.date == date || t.deadline.map(local_day) == Some(date))
                    .collect(),
            }
        })
        .collect()
}
