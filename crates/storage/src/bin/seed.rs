use chrono::{DateTime, Duration, Utc};
use clap::Parser;
use storage::repository::Storage;
use study_core::model::{CourseDraft, ModuleDraft, StudyGoalDraft};

/// Seed a study database with sample courses and a daily goal.
#[derive(Debug, Parser)]
#[command(name = "seed")]
struct Args {
    /// SQLite URL to seed.
    #[arg(
        long = "db",
        env = "STUDY_DB_URL",
        default_value = "sqlite:dev.sqlite3?mode=rwc"
    )]
    db_url: String,

    /// Daily study goal to store, in hours.
    #[arg(long, default_value_t = 2.0)]
    daily_hours: f64,

    /// Fixed current time (RFC3339) for deterministic seeding.
    #[arg(long)]
    now: Option<DateTime<Utc>>,
}

fn sample_courses() -> Vec<CourseDraft> {
    vec![
        CourseDraft::new("Rust Fundamentals")
            .with_module(ModuleDraft::new("Ownership and borrowing", 6, 2, 30).completed(true))
            .with_module(ModuleDraft::new("Traits and generics", 5, 2, 0).completed(true))
            .with_module(ModuleDraft::new("Async Rust", 8, 3, 15)),
        CourseDraft::new("Relational Databases")
            .with_module(ModuleDraft::new("Modelling", 4, 1, 30))
            .with_module(ModuleDraft::new("Indexes", 3, 1, 0)),
        CourseDraft::new("Spanish A2"),
    ]
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let goal = StudyGoalDraft::new(args.daily_hours, false).validate()?;
    let storage = Storage::sqlite(&args.db_url).await?;
    let now = args.now.unwrap_or_else(Utc::now);

    let existing = storage.courses.list_courses().await?;
    if existing.is_empty() {
        for (offset, draft) in (0_i64..).zip(sample_courses()) {
            let course = storage
                .courses
                .create_course(draft.validate()?, now + Duration::minutes(offset))
                .await?;
            println!("created course {} ({})", course.id(), course.title());
        }
    } else {
        println!("{} courses already present; skipping sample courses", existing.len());
    }

    let goal = storage.goals.upsert_goal(&goal).await?;
    println!("daily goal: {} hours", goal.daily_hours());

    Ok(())
}

#[tokio::main]
async fn main() {
    if let Err(err) = run(Args::parse()).await {
        eprintln!("seed failed: {err}");
        std::process::exit(2);
    }
}
