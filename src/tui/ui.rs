use chrono::{Datelike, Local};
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table},
    Frame,
};

use crate::reconciler::{Phase, Session};
use crate::views::{month_grid, CalendarCell, DayStats, Stats};
use super::app::{App, InputMode, ViewMode};

pub fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3), // Stats
            Constraint::Min(0),    // Table
            Constraint::Length(3), // Help
        ].as_ref())
        .split(f.area());

    render_stats(f, app, chunks[0]);

    match app.view_mode {
        ViewMode::Day => render_day(f, app, chunks[1]),
        ViewMode::Month => render_month(f, app, chunks[1]),
    }

    let help_text = match app.input_mode {
        InputMode::Normal => match app.view_mode {
            ViewMode::Day => "q: Quit | a: Add | Space: Toggle Done | d: Del | h/l: Prev/Next Day | t: Today | v: Month View",
            ViewMode::Month => "q: Quit | h/l: Prev/Next Month | t: Today | v: Day View",
        },
        InputMode::Adding => "Enter: Next Step | Esc: Cancel",
    };
    let help_text = match &app.status {
        Some(status) => format!("{status} | {help_text}"),
        None => help_text.to_string(),
    };

    let help = Paragraph::new(help_text)
        .style(Style::default().fg(if app.status.is_some() { Color::Red } else { Color::Gray }))
        .block(Block::default().borders(Borders::ALL));
    f.render_widget(help, chunks[2]);

    if app.input_mode == InputMode::Adding {
        let area = centered_rect(60, 3, f.area());
        f.render_widget(Clear, area);
        let title = match app.add_state.step {
            0 => format!("Add Task for {}: Enter Title", app.date),
            _ => "Add Task: Deadline (YYYY-MM-DD[THH:MM], optional)".to_string(),
        };
        let input = Paragraph::new(app.input_buffer.as_str())
            .style(Style::default().fg(Color::Yellow))
            .block(Block::default().borders(Borders::ALL).title(title));
        f.render_widget(input, area);
    }
}

fn render_stats(f: &mut Frame, app: &App, area: Rect) {
    let stats = Stats::compute(app.reconciler.tasks(), app.today());
    let source = match app.reconciler.session() {
        Session::Unauthenticated => "local".to_string(),
        Session::Migrating { user, phase: Phase::Stalled } => format!("offline, read-only: {user}"),
        Session::Authenticated { user } | Session::Migrating { user, .. } => format!("synced: {user}"),
    };
    let text = format!(
        "Completed today: {}   Total completed: {}   Active: {}   [{}]",
        stats.completed_today, stats.total_completed, stats.total_active, source
    );
    let widget = Paragraph::new(text)
        .style(Style::default().fg(Color::Cyan))
        .block(Block::default().borders(Borders::ALL).title("Joytask"));
    f.render_widget(widget, area);
}

fn render_day(f: &mut Frame, app: &mut App, area: Rect) {
    let now = chrono::Utc::now();
    let rows: Vec<Row> = app
        .day_tasks
        .iter()
        .map(|t| {
            let style = if t.completed {
                Style::default().fg(Color::DarkGray).add_modifier(Modifier::CROSSED_OUT)
            } else if t.deadline.is_some_and(|d| d < now) {
                Style::default().fg(Color::Red)
            } else {
                Style::default().fg(Color::Green)
            };
            let deadline = t
                .deadline
                .map(|d| d.with_timezone(&Local).format("%-I:%M %p").to_string())
                .unwrap_or_default();
            Row::new(vec![
                Cell::from(if t.completed { "[x]" } else { "[ ]" }),
                Cell::from(t.title.clone()),
                Cell::from(deadline),
            ]).style(style)
        })
        .collect();

    let widths = [
        Constraint::Length(4),
        Constraint::Min(20),
        Constraint::Length(10),
    ];

    let refs: Vec<_> = app.day_tasks.iter().collect();
    let stats = DayStats::of(&refs);
    let mut title = format!(
        "{} - {} pending, {} done",
        app.date.format("%A, %B %-d, %Y"),
        stats.pending,
        stats.completed
    );
    if app.date == app.today() {
        title.push_str(" (today)");
    }

    let table = Table::new(rows, widths)
        .header(Row::new(vec!["", "Task", "Deadline"])
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .bottom_margin(1))
        .block(Block::default().borders(Borders::ALL).title(title))
        .row_highlight_style(Style::default().add_modifier(Modifier::BOLD).bg(Color::DarkGray))
        .highlight_symbol(">> ");

    f.render_stateful_widget(table, area, &mut app.state);
}

fn render_month(f: &mut Frame, app: &App, area: Rect) {
    let tasks = app.reconciler.tasks();
    let grid = month_grid(tasks, app.month, app.today());

    let rows: Vec<Row> = grid
        .chunks(7)
        .map(|week| {
            Row::new(week.iter().map(|cell| {
                let stats = cell.stats();
                let mut text = format!("{:>2}", cell.date.day());
                if stats.total > 0 {
                    text.push_str(&format!("  {}/{}", stats.completed, stats.total));
                }
                let mut style = if !cell.in_month {
                    Style::default().fg(Color::DarkGray)
                } else if stats.pending > 0 {
                    Style::default().fg(Color::Yellow)
                } else if stats.total > 0 {
                    Style::default().fg(Color::Green)
                } else {
                    Style::default()
                };
                if cell.is_today {
                    style = style.add_modifier(Modifier::BOLD | Modifier::REVERSED);
                }
                Cell::from(text).style(style)
            }).collect::<Vec<_>>())
            .height(2)
        })
        .collect();

    let widths = [Constraint::Ratio(1, 7); 7];
    let pending = pending_in_month(&grid);
    let table = Table::new(rows, widths)
        .header(Row::new(vec!["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"])
            .style(Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))
            .bottom_margin(1))
        .block(Block::default().borders(Borders::ALL).title(format!(
            "{} - {} pending",
            app.month.format("%B %Y"),
            pending
        )));

    f.render_widget(table, area);
}

fn pending_in_month(grid: &[CalendarCell]) -> usize {
    grid.iter()
        .filter(|c| c.in_month)
        .map(|c| c.stats().pending)
        .sum()
}

fn centered_rect(percent_x: u16, height: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(r.height.saturating_sub(height) / 2),
            Constraint::Length(height),
            Constraint::Length(r.height.saturating_sub(height) / 2),
        ].as_ref())
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ].as_ref())
        .split(popup_layout[1])[1]
}
