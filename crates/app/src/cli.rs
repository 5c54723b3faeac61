use std::str::FromStr;

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use study_core::model::{CourseId, ModuleDraft, ModuleEdit, ModuleId};

#[derive(Debug, Parser)]
#[command(
    name = "study",
    version,
    about = "Track study progress and project completion dates"
)]
pub struct Cli {
    /// SQLite database URL or file path.
    #[arg(
        long = "db",
        env = "STUDY_DB_URL",
        default_value = "sqlite://study.sqlite3",
        global = true
    )]
    pub db_url: String,

    /// Print machine-readable JSON instead of text.
    #[arg(long, global = true, default_value_t = false)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List courses with their progress
    List,
    /// Add a course
    Add {
        title: String,
        /// Module as TITLE:LESSONS:HOURS:MINUTES (repeatable)
        #[arg(long = "module", short = 'm')]
        modules: Vec<ModuleArg>,
        /// Mark every added module complete
        #[arg(long, default_value_t = false)]
        completed: bool,
    },
    /// Rename a course and optionally replace its module list
    Edit {
        course_id: CourseId,
        #[arg(long)]
        title: Option<String>,
        /// Module as [ID=]TITLE:LESSONS:HOURS:MINUTES; unlisted modules are deleted
        #[arg(long = "module", short = 'm')]
        modules: Vec<ModuleArg>,
    },
    /// Change some fields of one module
    Module(ModuleArgs),
    /// Flip a module between done and not done
    Toggle {
        course_id: CourseId,
        module_id: ModuleId,
    },
    /// Delete a course and its modules
    Remove { course_id: CourseId },
    /// Portfolio totals
    Stats,
    /// Projected completion dates for unfinished courses
    Insights,
    /// Show or change the daily study goal
    Goal {
        #[command(subcommand)]
        action: GoalAction,
    },
    /// Attach or remove a course certificate
    Certificate {
        #[command(subcommand)]
        action: CertificateAction,
    },
}

#[derive(Debug, Args)]
pub struct ModuleArgs {
    pub course_id: CourseId,
    pub module_id: ModuleId,
    #[arg(long)]
    pub title: Option<String>,
    #[arg(long)]
    pub lessons: Option<u32>,
    #[arg(long)]
    pub hours: Option<u32>,
    #[arg(long)]
    pub minutes: Option<u32>,
    #[arg(long)]
    pub completed: Option<bool>,
}

#[derive(Debug, Subcommand)]
pub enum GoalAction {
    Show,
    Set {
        daily_hours: f64,
        /// Record that weekends count as study days
        #[arg(long, default_value_t = false)]
        weekends: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum CertificateAction {
    Set {
        course_id: CourseId,
        url: String,
        /// Issue date as YYYY-MM-DD
        #[arg(long)]
        issued: Option<NaiveDate>,
    },
    Clear {
        course_id: CourseId,
    },
}

/// One `--module` value: `[ID=]TITLE:LESSONS:HOURS:MINUTES`.
///
/// Counts are kept signed so negative input reaches validation and is
/// reported per field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleArg {
    pub id: Option<ModuleId>,
    pub title: String,
    pub lessons: i64,
    pub hours: i64,
    pub minutes: i64,
}

impl ModuleArg {
    #[must_use]
    pub fn draft(&self, completed: bool) -> ModuleDraft {
        ModuleDraft::new(self.title.clone(), self.lessons, self.hours, self.minutes)
            .completed(completed)
    }

    #[must_use]
    pub fn into_edit(self) -> ModuleEdit {
        ModuleEdit {
            id: self.id,
            draft: ModuleDraft::new(self.title, self.lessons, self.hours, self.minutes),
        }
    }
}

impl FromStr for ModuleArg {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let (id, spec) = match raw.split_once('=') {
            Some((id, rest)) => match id.parse::<ModuleId>() {
                Ok(id) => (Some(id), rest),
                Err(_) => (None, raw),
            },
            None => (None, raw),
        };

        // the title may itself contain ':'
        let mut parts = spec.rsplitn(4, ':');
        let (Some(minutes), Some(hours), Some(lessons), Some(title)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(format!("expected TITLE:LESSONS:HOURS:MINUTES, got {raw:?}"));
        };

        let count = |name: &str, value: &str| {
            value
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("{name} must be a whole number, got {value:?}"))
        };

        Ok(Self {
            id,
            title: title.to_owned(),
            lessons: count("lessons", lessons)?,
            hours: count("hours", hours)?,
            minutes: count("minutes", minutes)?,
        })
    }
}

/// Turn a bare path into an absolute `sqlite://` URL that creates the file on demand.
#[must_use]
pub fn normalize_sqlite_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed == "sqlite::memory:" || trimmed.starts_with("sqlite:file:") {
        return trimmed.to_owned();
    }

    let path_str = trimmed
        .strip_prefix("sqlite://")
        .or_else(|| trimmed.strip_prefix("sqlite:"))
        .unwrap_or(trimmed);
    let (path_str, query) = match path_str.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_str, None),
    };

    let path = std::path::Path::new(path_str);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| std::path::PathBuf::from("."))
            .join(path)
    };
    match query {
        Some(query) => format!("sqlite://{}?{query}", absolute.display()),
        None => format!("sqlite://{}?mode=rwc", absolute.display()),
    }
}
