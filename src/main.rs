//! # Joytask
//!
//! A to-do list organised by day. Tasks live in a local store until you sign
//! in; on the first sign-in they are moved to your hosted account and synced
//! from then on.
//!
//! ## Usage
//!
//! ### Interactive Mode (TUI)
//!
//! ```bash
//! joytask
//! # or explicitly
//! joytask ui
//! ```
//!
//! **Day View**
//! *   `a`: Add a task for the shown day
//! *   `Space`: Toggle done
//! *   `d`: Delete selected task
//! *   `h` / `l`: Previous / next day
//! *   `t`: Jump to today
//! *   `v`: Switch to the month view
//!
//! ### Command Line Interface (CLI)
//!
//! ```bash
//! # Add a task for today, or for a given day
//! joytask add "Buy milk"
//! joytask add "Dentist" --date 2025-03-04
//! # A deadline moves the task to the deadline's day
//! joytask add "Send report" --deadline 2025-03-07T17:00
//!
//! joytask day              # today
//! joytask day 2025-03-04
//! joytask calendar 2025-03
//! joytask done <ID>        # toggle; id prefixes work
//! joytask rm <ID>
//!
//! joytask login --email me@example.com
//! joytask logout
//! ```
//!
//! ## Configuration
//!
//! `~/.config/joytask/config.toml` (or `JOYTASK_CONFIG`):
//!
//! ```toml
//! log_level = "info"
//! [backend]
//! url = "https://<project>.supabase.co"
//! anon_key = "<anon key>"
//! ```
//!
//! `SUPABASE_URL`, `SUPABASE_ANON_KEY` and `JOYTASK_DATA_DIR` override the
//! file. Local data lives in `~/.local/share/joytask/` on Linux.

use std::io::{self, BufRead, Write};

use anyhow::Context;
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};

use joytask::auth::{AuthProvider, SupabaseAuth};
use joytask::commands::*;
use joytask::config::Config;
use joytask::logging;
use joytask::reconciler::Reconciler;
use joytask::remote::SupabaseTaskStore;
use joytask::storage::{FileKvStore, LocalStore};
use joytask::tui::run_tui;

#[derive(Parser)]
#[command(name = "joytask")]
#[command(about = "Day-by-day to-do list with optional sync", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Add a new task
    Add {
        /// Task title (quoted if it has spaces)
        title: String,
        /// Day in YYYY-MM-DD (defaults to today)
        #[arg(short, long)]
        date: Option<String>,
        /// Deadline: YYYY-MM-DD (end of day) or YYYY-MM-DDTHH:MM
        #[arg(short = 'D', long)]
        deadline: Option<String>,
    },
    /// Show the tasks of one day
    Day {
        /// Day in YYYY-MM-DD (defaults to today)
        date: Option<String>,
    },
    /// Show a month calendar
    Calendar {
        /// Month in YYYY-MM (defaults to the current month)
        month: Option<String>,
    },
    /// Show completion statistics
    Stats,
    /// Toggle a task between done and not done
    Done {
        id: String,
    },
    /// Remove a task
    #[command(alias = "remove")]
    Rm {
        id: String,
    },
    /// Sign in and sync tasks with your account
    Login {
        #[arg(short, long)]
        email: String,
        /// Read from stdin when omitted
        #[arg(short, long)]
        password: Option<String>,
    },
    /// Sign out; tasks go back to the local store
    Logout,
    /// Show who is signed in
    Whoami,
    /// Reload from the account, retrying a pending upload of local tasks
    Sync,
    /// Delete the local store
    Reset {
        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
    /// Generate shell completions
    Completions {
        shell: Shell,
    },
    /// Open interactive TUI
    Ui,
}

fn read_password() -> anyhow::Result<String> {
    print!("Password: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim_end_matches(['\r', '\n']).to_string())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = Config::load();
    logging::init(config.log_level.as_deref());

    if let Some(Commands::Completions { shell }) = cli.command {
        let mut cmd = Cli::command();
        generate(shell, &mut cmd, "joytask", &mut io::stdout());
        return Ok(());
    }

    let backend = config.backend.require().context("joytask needs a configured backend")?;
    let kv = FileKvStore::in_dir(&config.data.dir)
        .with_context(|| format!("cannot open data dir {}", config.data.dir.display()))?;

    if let Some(Commands::Reset { force }) = cli.command {
        cmd_reset(&kv, force);
        return Ok(());
    }

    let auth = SupabaseAuth::new(backend, &config.session_path())?;
    let events = auth.subscribe();
    let remote = SupabaseTaskStore::new(backend, auth.session())?;
    let mut rec = Reconciler::new(LocalStore::new(Box::new(kv)), Box::new(remote));
    rec.start(auth.current_user());

    match cli.command {
        Some(Commands::Add { title, date, deadline }) => cmd_add(&mut rec, title, date, deadline, false),
        Some(Commands::Day { date }) => cmd_day(&rec, date),
        Some(Commands::Calendar { month }) => cmd_calendar(&rec, month),
        Some(Commands::Stats) => cmd_stats(&rec),
        Some(Commands::Done { id }) => cmd_toggle(&mut rec, id, false),
        Some(Commands::Rm { id }) => cmd_remove(&mut rec, id, false),
        Some(Commands::Login { email, password }) => {
            let password = match password {
                Some(p) => p,
                None => read_password()?,
            };
            cmd_login(&auth, &mut rec, &events, email, password)
        }
        Some(Commands::Logout) => cmd_logout(&auth, &mut rec, &events),
        Some(Commands::Whoami) => cmd_whoami(&rec),
        Some(Commands::Sync) => cmd_sync(&mut rec),
        Some(Commands::Reset { .. }) | Some(Commands::Completions { .. }) => {}
        Some(Commands::Ui) | None => {
            if let Err(e) = run_tui(&mut rec) {
                eprintln!("Error running TUI: {}", e);
            }
        }
    }
    Ok(())
}
