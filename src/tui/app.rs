use chrono::{Duration, Local, NaiveDate};
use ratatui::widgets::TableState;

use crate::models::Task;
use crate::normalize::parse_deadline;
use crate::reconciler::{Outcome, Reconciler};
use crate::views::{month_start, shift_month, split_day, tasks_for_day};

#[derive(PartialEq)]
pub enum InputMode {
    Normal,
    Adding,
}

#[derive(PartialEq)]
pub enum ViewMode {
    Day,
    Month,
}

/// State for the two-step "Add Task" prompt.
#[derive(Default)]
pub struct AddState {
    pub title: String,
    pub step: usize, // 0: Title, 1: Deadline
}

pub struct App<'a> {
    pub reconciler: &'a mut Reconciler,
    /// Tasks of `date`, active first then completed.
    pub day_tasks: Vec<Task>,
    pub date: NaiveDate,
    pub month: NaiveDate,
    pub state: TableState,
    pub view_mode: ViewMode,
    pub input_mode: InputMode,
    pub input_buffer: String,
    pub add_state: AddState,
    pub status: Option<String>,
}

impl<'a> App<'a> {
    pub fn new(reconciler: &'a mut Reconciler) -> App<'a> {
        let today = Local::now().date_naive();
        let mut app = App {
            reconciler,
            day_tasks: Vec::new(),
            date: today,
            month: month_start(today),
            state: TableState::default(),
            view_mode: ViewMode::Day,
            input_mode: InputMode::Normal,
            input_buffer: String::new(),
            add_state: AddState::default(),
            status: None,
        };
        app.reload();
        app
    }

    pub fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }

    /// Rebuilds the visible task list for the current day.
    pub fn reload(&mut self) {
        let on_day = tasks_for_day(self.reconciler.tasks(), self.date);
        let (active, done) = split_day(&on_day);
        self.day_tasks = active.into_iter().chain(done).cloned().collect();

        if self.day_tasks.is_empty() {
            self.state.select(None);
        } else if let Some(i) = self.state.selected() {
            if i >= self.day_tasks.len() {
                self.state.select(Some(self.day_tasks.len() - 1));
            }
        } else {
            self.state.select(Some(0));
        }
    }

    pub fn next(&mut self) {
        if self.day_tasks.is_empty() { return; }
        let i = match self.state.selected() {
            Some(i) if i + 1 < self.day_tasks.len() => i + 1,
            _ => 0,
        };
        self.state.select(Some(i));
    }

    pub fn previous(&mut self) {
        if self.day_tasks.is_empty() { return; }
        let i = match self.state.selected() {
            Some(0) | None => self.day_tasks.len() - 1,
            Some(i) => i - 1,
        };
        self.state.select(Some(i));
    }

    /// Moves by days in day view, by months in month view.
    pub fn shift(&mut self, delta: i64) {
        match self.view_mode {
            ViewMode::Day => {
                self.date += Duration::days(delta);
                self.month = month_start(self.date);
            }
            ViewMode::Month => self.month = shift_month(self.month, delta as i32),
        }
        self.reload();
    }

    pub fn go_to_today(&mut self) {
        self.date = self.today();
        self.month = month_start(self.date);
        self.reload();
    }

    pub fn toggle_view(&mut self) {
        self.view_mode = match self.view_mode {
            ViewMode::Day => ViewMode::Month,
            ViewMode::Month => {
                // Opening the day view from the month lands on its first day,
                // or today when today is in that month.
                let today = self.today();
                self.date = if month_start(today) == self.month { today } else { self.month };
                ViewMode::Day
            }
        };
        self.reload();
    }

    fn selected_id(&self) -> Option<String> {
        if self.view_mode != ViewMode::Day { return None; }
        self.state
            .selected()
            .and_then(|i| self.day_tasks.get(i))
            .map(|t| t.id.clone())
    }

    pub fn toggle_selected(&mut self) {
        if let Some(id) = self.selected_id() {
            self.status = match self.reconciler.toggle_task(&id) {
                Ok(Outcome::Applied) => None,
                Ok(_) => Some("Update failed; change reverted.".to_string()),
                Err(e) => Some(e.to_string()),
            };
            self.reload();
        }
    }

    pub fn delete_selected(&mut self) {
        if let Some(id) = self.selected_id() {
            self.status = match self.reconciler.delete_task(&id) {
                Ok(Outcome::Applied) => None,
                Ok(_) => Some("Delete failed; list refreshed.".to_string()),
                Err(e) => Some(e.to_string()),
            };
            self.reload();
        }
    }

    pub fn start_add(&mut self) {
        if self.view_mode != ViewMode::Day { return; }
        self.input_mode = InputMode::Adding;
        self.add_state = AddState::default();
        self.input_buffer.clear();
    }

    /// Handles Enter in the "Add Task" prompt.
    pub fn handle_input(&mut self) {
        match self.add_state.step {
            0 => { // Title
                if !self.input_buffer.trim().is_empty() {
                    self.add_state.title = self.input_buffer.clone();
                    self.add_state.step += 1;
                    self.input_buffer.clear();
                }
            }
            1 => { // Deadline
                let deadline = if self.input_buffer.trim().is_empty() {
                    None
                } else {
                    match parse_deadline(&self.input_buffer) {
                        Some(d) => Some(d),
                        None => {
                            self.status = Some(format!("Invalid deadline '{}'", self.input_buffer));
                            return;
                        }
                    }
                };
                self.status = match self.reconciler.add_task(&self.add_state.title, self.date, deadline) {
                    Ok(Some(_)) => None,
                    Ok(None) => Some("Could not save the task.".to_string()),
                    Err(e) => Some(e.to_string()),
                };
                self.input_mode = InputMode::Normal;
                self.input_buffer.clear();
                self.reload();
            }
            _ => {}
        }
    }

    pub fn cancel_input(&mut self) {
        self.input_mode = InputMode::Normal;
        self.input_buffer.clear();
    }
}
