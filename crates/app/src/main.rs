use std::process::ExitCode;

use clap::Parser;
use serde::Serialize;
use services::{AppServices, Clock, Notice};
use study_core::model::{
    CertificateDraft, Course, CourseDraft, CourseEdit, Module, ModulePatch, StudyGoalDraft,
};
use study_core::progress::{
    course_completed_minutes, course_progress, course_total_minutes, format_minutes,
    module_minutes,
};
use study_core::projection::{CourseInsight, FALLBACK_DAILY_MINUTES};
use tracing_subscriber::EnvFilter;

mod cli;

use cli::{CertificateAction, Cli, Command, GoalAction, ModuleArg, ModuleArgs};

type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

#[derive(Serialize)]
struct CourseRow<'a> {
    #[serde(flatten)]
    course: &'a Course,
    progress: u8,
    total_minutes: u64,
    completed_minutes: u64,
}

impl<'a> CourseRow<'a> {
    fn new(course: &'a Course) -> Self {
        Self {
            course,
            progress: course_progress(course),
            total_minutes: course_total_minutes(course),
            completed_minutes: course_completed_minutes(course),
        }
    }
}

fn print_json(value: &impl Serialize) -> AppResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_course(course: &Course) {
    let row = CourseRow::new(course);
    println!(
        "#{} {} ({}% of {})",
        course.id(),
        course.title(),
        row.progress,
        format_minutes(row.total_minutes)
    );
    for module in course.modules() {
        println!("{}", module_line(module));
    }
    if let Some(certificate) = course.certificate() {
        match certificate.issued_at() {
            Some(date) => println!("  certificate: {} (issued {date})", certificate.url()),
            None => println!("  certificate: {}", certificate.url()),
        }
    }
}

fn module_line(module: &Module) -> String {
    let mark = if module.completed() { "x" } else { " " };
    format!(
        "  [{mark}] #{} {} ({} lessons, {})",
        module.id(),
        module.title(),
        module.lessons(),
        format_minutes(module_minutes(module))
    )
}

fn print_notices(notices: &[Notice]) {
    for notice in notices {
        match &notice.detail {
            Some(detail) => eprintln!("{}: {detail}", notice.title),
            None => eprintln!("{}", notice.title),
        }
    }
}

fn prepare_sqlite_file(db_url: &str) -> AppResult<()> {
    let Some(path) = db_url.strip_prefix("sqlite://") else {
        return Ok(());
    };
    let path = path.split('?').next().unwrap_or(path);
    if let Some(parent) = std::path::Path::new(path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

fn print_course_result(course: &Course, json: bool) -> AppResult<()> {
    if json {
        print_json(&CourseRow::new(course))
    } else {
        print_course(course);
        Ok(())
    }
}

async fn execute(app: &AppServices, command: Command, json: bool) -> AppResult<()> {
    let courses = app.courses();
    let goals = app.goals();
    courses.load_courses().await?;

    match command {
        Command::List => {
            let list = courses.courses();
            if json {
                print_json(&list.iter().map(CourseRow::new).collect::<Vec<_>>())?;
            } else if list.is_empty() {
                println!("No courses yet.");
            } else {
                list.iter().for_each(print_course);
            }
        }
        Command::Add {
            title,
            modules,
            completed,
        } => {
            let draft = modules
                .iter()
                .fold(CourseDraft::new(title), |draft, module| {
                    draft.with_module(module.draft(completed))
                });
            let course = courses.create_course(draft).await?;
            print_course_result(&course, json)?;
        }
        Command::Edit {
            course_id,
            title,
            modules,
        } => {
            let edit = CourseEdit {
                title,
                modules: (!modules.is_empty())
                    .then(|| modules.into_iter().map(ModuleArg::into_edit).collect()),
            };
            let course = courses.update_course(course_id, edit).await?;
            print_course_result(&course, json)?;
        }
        Command::Module(ModuleArgs {
            course_id,
            module_id,
            title,
            lessons,
            hours,
            minutes,
            completed,
        }) => {
            let patch = ModulePatch {
                title,
                lessons,
                hours,
                minutes,
                completed,
            };
            courses.patch_module(course_id, module_id, patch).await?;
        }
        Command::Toggle {
            course_id,
            module_id,
        } => courses.toggle_module(course_id, module_id).await?,
        Command::Remove { course_id } => courses.delete_course(course_id).await?,
        Command::Stats => {
            let summary = courses.portfolio();
            if json {
                print_json(&summary)?;
            } else {
                println!(
                    "courses:   {}/{} complete",
                    summary.completed_courses, summary.total_courses
                );
                println!(
                    "modules:   {}/{} complete, {} lessons",
                    summary.completed_modules, summary.total_modules, summary.total_lessons
                );
                println!(
                    "time:      {} of {}",
                    format_minutes(summary.completed_minutes),
                    format_minutes(summary.total_minutes)
                );
                println!("progress:  {}%", summary.overall_progress);
            }
        }
        Command::Insights => {
            let goal = goals.load().await?;
            let insights = courses.insights(goal.as_ref());
            if json {
                return print_json(&insights);
            }
            if goal.and_then(|g| g.daily_minutes()).is_none() {
                println!("No daily goal set; assuming {FALLBACK_DAILY_MINUTES} minutes a day.");
            }
            let list = courses.courses();
            for CourseInsight {
                course_id,
                remaining_minutes,
                estimated_days,
                estimated_completion_date,
            } in insights
            {
                let title = list
                    .iter()
                    .find(|c| c.id() == course_id)
                    .map_or("?", Course::title);
                let left = format_minutes(remaining_minutes);
                println!(
                    "#{course_id} {title}: {left} left, {estimated_days} days, \
                     done by {estimated_completion_date}"
                );
            }
        }
        Command::Goal {
            action: GoalAction::Show,
        } => {
            let goal = goals.load().await?;
            if json {
                return print_json(&goal);
            }
            match goal {
                Some(goal) if goal.consider_weekends() => {
                    println!("{} hours a day, weekends included", goal.daily_hours());
                }
                Some(goal) => println!("{} hours a day", goal.daily_hours()),
                None => println!("No daily goal set."),
            }
        }
        Command::Goal {
            action:
                GoalAction::Set {
                    daily_hours,
                    weekends,
                },
        } => {
            let saved = goals
                .save(StudyGoalDraft::new(daily_hours, weekends))
                .await?;
            if json {
                print_json(&saved)?;
            }
        }
        Command::Certificate {
            action:
                CertificateAction::Set {
                    course_id,
                    url,
                    issued,
                },
        } => {
            let draft = CertificateDraft {
                url,
                issued_at: issued,
            };
            courses.set_certificate(course_id, draft).await?;
        }
        Command::Certificate {
            action: CertificateAction::Clear { course_id },
        } => courses.clear_certificate(course_id).await?,
    }
    Ok(())
}

async fn run(cli: Cli) -> AppResult<()> {
    let db_url = cli::normalize_sqlite_url(&cli.db_url);
    prepare_sqlite_file(&db_url)?;
    tracing::debug!(%db_url, "opening store");

    let app = AppServices::new_sqlite(&db_url, Clock::default_clock()).await?;
    let outcome = execute(&app, cli.command, cli.json).await;
    print_notices(&app.take_notices());
    outcome
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use study_core::model::{ModuleDraft, ModuleId};
    use study_core::time::fixed_now;

    #[test]
    fn module_line_shows_mark_and_duration() {
        let module = ModuleDraft::new("Lifetimes", 5, 2, 90)
            .completed(true)
            .validate()
            .unwrap()
            .assign_id(ModuleId::new(3), fixed_now());

        assert_eq!(module_line(&module), "  [x] #3 Lifetimes (5 lessons, 3h 30min)");
    }
}
