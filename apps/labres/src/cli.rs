//! # Command line
//!
//! `labres serve` runs the API with its background jobs. The other
//! commands work directly on the database file and print their result.

use crate::api::{self, AppState};
use crate::config::Config;
use crate::error::{AppError, AppResult};
use crate::jobs;
use chrono::{Duration, Local, NaiveDate, NaiveDateTime};
use clap::{Parser, Subcommand};
use labres_core::{
    FeeFilter, FeeReport, MaintenanceTimeReport, Period, PeriodKind, RedbStore, ReturnReminder,
    Session, UsageReport, WorkCalendar, WorkHours, natural_period,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Parser)]
#[command(name = "labres", version, about = "Lab equipment borrow and upkeep server")]
pub struct Cli {
    /// Path to the TOML config file.
    #[arg(short, long, global = true, default_value = "labres.toml")]
    pub config: PathBuf,

    /// Database file, overrides `storage.path`.
    #[arg(long, global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create an empty database.
    Init {
        #[arg(long)]
        force: bool,
    },
    /// Run the HTTP API and the background jobs.
    Serve {
        /// Listen address, overrides `server.bind`.
        #[arg(long)]
        bind: Option<String>,
    },
    /// Working hours between two instants.
    Hours { start: String, end: String },
    /// Instant at which `hours` working hours after `start` are used up.
    EndTime { start: String, hours: String },
    /// Bounds of the week, month, quarter or year containing a date.
    Period {
        kind: String,
        #[arg(long)]
        date: Option<String>,
        /// Calendar bounds instead of working-time bounds.
        #[arg(long)]
        natural: bool,
    },
    /// Every non-working date of a year.
    Holidays { year: i32 },
    /// Recompute calibration due status.
    RefreshCalibration {
        #[arg(long)]
        date: Option<String>,
    },
    /// Emit due return reminders.
    Remind {
        #[arg(long)]
        at: Option<String>,
        #[arg(long, default_value_t = 24)]
        lead_hours: u32,
    },
    /// Usage rate of every piece of equipment over a window.
    Usage {
        start: String,
        end: String,
        #[arg(long)]
        json: bool,
    },
    /// Repair hours of every piece of equipment over a window.
    Repairs {
        start: String,
        end: String,
        #[arg(long)]
        maintainer: Option<String>,
    },
    /// Billed borrow fees per project over a window.
    Fees {
        start: String,
        end: String,
        #[arg(long)]
        project: Option<String>,
        #[arg(long)]
        section: Option<String>,
    },
}

// =============================================================================
// PARSING
// =============================================================================

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M",
];

pub fn parse_datetime(text: &str) -> AppResult<NaiveDateTime> {
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(text, f).ok())
        .ok_or_else(|| AppError::input(format!("invalid date-time {}, expected YYYY-MM-DD HH:MM", text)))
}

pub fn parse_date(text: &str) -> AppResult<NaiveDate> {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| AppError::input(format!("invalid date {}, expected YYYY-MM-DD", text)))
}

// =============================================================================
// COMMANDS
// =============================================================================

pub fn cmd_init(db_path: &Path, force: bool) -> AppResult<()> {
    if db_path.exists() {
        if !force {
            return Err(AppError::input(format!(
                "database {} already exists, use --force to overwrite",
                db_path.display()
            )));
        }
        std::fs::remove_file(db_path)?;
    }
    RedbStore::open(db_path)?;
    tracing::info!(path = %db_path.display(), "database initialized");
    Ok(())
}

pub fn open_session(db_path: &Path, calendar: WorkCalendar) -> AppResult<Session<RedbStore>> {
    let store = RedbStore::open(db_path)?;
    Ok(Session::new(store, calendar))
}

pub fn cmd_hours(calendar: &WorkCalendar, start: &str, end: &str) -> AppResult<WorkHours> {
    let hours = calendar.work_hours_between(parse_datetime(start)?, parse_datetime(end)?)?;
    Ok(hours)
}

pub fn cmd_end_time(calendar: &WorkCalendar, start: &str, hours: &str) -> AppResult<NaiveDateTime> {
    let hours: WorkHours = hours.parse()?;
    Ok(calendar.end_time_for(parse_datetime(start)?, hours)?)
}

pub fn cmd_period(
    calendar: &WorkCalendar,
    kind: &str,
    date: NaiveDate,
    natural: bool,
) -> AppResult<Period> {
    let kind: PeriodKind = kind.parse()?;
    let period = if natural {
        natural_period(kind, date)?
    } else {
        calendar.working_period(kind, date)?
    };
    Ok(period)
}

pub fn cmd_holidays(calendar: &WorkCalendar, year: i32) -> AppResult<Vec<NaiveDate>> {
    Ok(calendar.holidays_in_year(year)?)
}

pub fn cmd_refresh_calibration(
    db_path: &Path,
    calendar: WorkCalendar,
    today: NaiveDate,
) -> AppResult<usize> {
    let mut session = open_session(db_path, calendar)?;
    Ok(session.refresh_calibrations(today)?)
}

pub fn cmd_remind(
    db_path: &Path,
    calendar: WorkCalendar,
    now: NaiveDateTime,
    lead: Duration,
) -> AppResult<Vec<ReturnReminder>> {
    let mut session = open_session(db_path, calendar)?;
    Ok(session.remind_returns(now, lead)?)
}

fn report_window(start: &str, end: &str) -> AppResult<Period> {
    let window = Period::new(parse_datetime(start)?, parse_datetime(end)?);
    if window.end <= window.start {
        return Err(AppError::input("report window end must be after its start"));
    }
    Ok(window)
}

pub fn cmd_usage(
    db_path: &Path,
    calendar: WorkCalendar,
    start: &str,
    end: &str,
) -> AppResult<UsageReport> {
    let window = report_window(start, end)?;
    let session = open_session(db_path, calendar)?;
    Ok(session.usage_report(window)?)
}

pub fn cmd_repairs(
    db_path: &Path,
    calendar: WorkCalendar,
    start: &str,
    end: &str,
    maintainer: Option<&str>,
) -> AppResult<MaintenanceTimeReport> {
    let window = report_window(start, end)?;
    let session = open_session(db_path, calendar)?;
    Ok(session.maintenance_time_report(window, maintainer)?)
}

pub fn cmd_fees(
    db_path: &Path,
    calendar: WorkCalendar,
    start: &str,
    end: &str,
    filter: &FeeFilter,
) -> AppResult<FeeReport> {
    let window = report_window(start, end)?;
    let session = open_session(db_path, calendar)?;
    Ok(session.fee_report(window, filter)?)
}

pub async fn cmd_serve(config: &Config, db_path: &Path, bind: &str) -> AppResult<()> {
    let session = open_session(db_path, config.build_calendar()?)?;
    let shared = Arc::new(RwLock::new(session));
    let state = AppState::new(shared.clone(), &config.server)?;
    let handles = jobs::spawn_all(shared, &config.jobs);
    let result = api::serve(state, bind).await;
    for handle in handles {
        handle.abort();
    }
    result
}

// =============================================================================
// DISPATCH
// =============================================================================

fn to_json<T: serde::Serialize>(value: &T) -> AppResult<String> {
    serde_json::to_string_pretty(value).map_err(|e| AppError::Server(e.to_string()))
}

pub async fn run(cli: Cli) -> AppResult<()> {
    let config = Config::load(Some(cli.config.as_path()))?;
    let db_path = cli.db.clone().unwrap_or_else(|| config.storage.path.clone());
    let calendar = config.build_calendar()?;

    match cli.command {
        Command::Init { force } => {
            cmd_init(&db_path, force)?;
            println!("Initialized {}", db_path.display());
        }
        Command::Serve { bind } => {
            let bind = bind.unwrap_or_else(|| config.server.bind.clone());
            cmd_serve(&config, &db_path, &bind).await?;
        }
        Command::Hours { start, end } => {
            println!("{}", cmd_hours(&calendar, &start, &end)?);
        }
        Command::EndTime { start, hours } => {
            println!("{}", cmd_end_time(&calendar, &start, &hours)?);
        }
        Command::Period { kind, date, natural } => {
            let date = match date {
                Some(d) => parse_date(&d)?,
                None => Local::now().date_naive(),
            };
            let period = cmd_period(&calendar, &kind, date, natural)?;
            println!("{} - {}", period.start, period.end);
        }
        Command::Holidays { year } => {
            for date in cmd_holidays(&calendar, year)? {
                println!("{}", date);
            }
        }
        Command::RefreshCalibration { date } => {
            let today = match date {
                Some(d) => parse_date(&d)?,
                None => Local::now().date_naive(),
            };
            let updated = cmd_refresh_calibration(&db_path, calendar, today)?;
            println!("Updated {} calibration(s)", updated);
        }
        Command::Remind { at, lead_hours } => {
            let now = match at {
                Some(t) => parse_datetime(&t)?,
                None => Local::now().naive_local(),
            };
            let lead = Duration::hours(i64::from(lead_hours));
            let reminders = cmd_remind(&db_path, calendar, now, lead)?;
            for reminder in &reminders {
                println!("{}", reminder);
            }
            println!("Sent {} reminder(s)", reminders.len());
        }
        Command::Usage { start, end, json } => {
            let report = cmd_usage(&db_path, calendar, &start, &end)?;
            if json {
                println!("{}", to_json(&report)?);
            } else {
                println!("Available hours: {}", report.available);
                for line in &report.equipment {
                    println!(
                        "{:<16} {:>10} {:>8} {:>12}",
                        line.equipment_id.to_string(),
                        line.usage.to_string(),
                        line.rate_percent(),
                        line.amount.to_string()
                    );
                }
            }
        }
        Command::Repairs {
            start,
            end,
            maintainer,
        } => {
            let report = cmd_repairs(&db_path, calendar, &start, &end, maintainer.as_deref())?;
            println!("Available hours: {}", report.available);
            for line in &report.lines {
                println!(
                    "{:<16} {:>10} {:>8}",
                    line.equipment_id.to_string(),
                    line.hours.to_string(),
                    line.rate_percent()
                );
            }
        }
        Command::Fees {
            start,
            end,
            project,
            section,
        } => {
            let filter = FeeFilter {
                project,
                section,
                equipment: None,
            };
            let report = cmd_fees(&db_path, calendar, &start, &end, &filter)?;
            for project in &report.projects {
                let name = project.project.as_deref().unwrap_or("-");
                for line in &project.lines {
                    println!(
                        "{:<16} {:<12} {:<16} {:>12}",
                        name,
                        line.section.as_deref().unwrap_or("-"),
                        line.equipment_id.to_string(),
                        line.amount.to_string()
                    );
                }
                println!("{:<16} {:>42}", name, project.total.to_string());
            }
            println!("Total: {}", report.total);
        }
    }
    Ok(())
}
