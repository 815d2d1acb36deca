use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand, ValueEnum};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::info;

mod assessment;
mod db;
mod gradebook;
mod grading;
mod models;
mod registry;
mod report;
mod seed;
mod telemetry;

use models::{Component, Term, TermConfig};

#[derive(Parser)]
#[command(name = "report-cards")]
#[command(about = "Term report card engine for school assessment records", long_about = None)]
struct Cli {
    /// Postgres connection string
    #[arg(long, env = "DATABASE_URL", global = true, hide_env_values = true)]
    database_url: Option<String>,
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    max_connections: u32,
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,
    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Markdown,
    Json,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a mock school with Term 1 fully marked
    Seed,
    /// Import scores, exam results or attendance from CSV files
    #[command(group(
        ArgGroup::new("source")
            .args(["scores", "exams", "attendance"])
            .required(true)
            .multiple(true)
    ))]
    Import {
        #[arg(long)]
        scores: Option<PathBuf>,
        #[arg(long)]
        exams: Option<PathBuf>,
        #[arg(long)]
        attendance: Option<PathBuf>,
    },
    /// Show component averages for one student in one subject
    Summary {
        #[arg(long)]
        student: String,
        #[arg(long)]
        subject: String,
        #[arg(long)]
        term: Term,
        #[arg(long, default_value = assessment::DEFAULT_ACADEMIC_YEAR)]
        academic_year: String,
    },
    /// Generate one student's report card
    Report {
        #[arg(long)]
        student: String,
        #[arg(long)]
        class: String,
        #[arg(long)]
        term: Term,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Generate report cards for every student in a class
    BulkReport {
        #[arg(long)]
        class: String,
        #[arg(long)]
        term: Term,
        #[arg(long, value_enum, default_value_t = OutputFormat::Markdown)]
        format: OutputFormat,
        #[arg(long, default_value = "class-report.md")]
        out: PathBuf,
    },
    /// Map a percentage to its letter grade
    Grade {
        #[arg(allow_negative_numbers = true)]
        percentage: f64,
    },
}

async fn connect(cli: &Cli) -> anyhow::Result<PgPool> {
    let database_url = cli
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set to a Postgres instance")?;

    PgPoolOptions::new()
        .max_connections(cli.max_connections)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

fn write_output(out: Option<&PathBuf>, contents: &str) -> anyhow::Result<()> {
    match out {
        Some(path) => {
            std::fs::write(path, contents)
                .with_context(|| format!("failed to write {}", path.display()))?;
            println!("Report written to {}.", path.display());
        }
        None => print!("{contents}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    telemetry::init_tracing(&cli.log_level, cli.log_json)?;

    match &cli.command {
        Commands::Grade { percentage } => {
            let grade = grading::letter_grade(*percentage);
            println!("{} ({})", grade.grade, grade.remark);
        }
        Commands::InitDb => {
            let pool = connect(&cli).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            let pool = connect(&cli).await?;
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Import {
            scores,
            exams,
            attendance,
        } => {
            let pool = connect(&cli).await?;
            if let Some(path) = scores {
                let written = db::import_scores_csv(&pool, path).await?;
                println!("Recorded {written} scores from {}.", path.display());
            }
            if let Some(path) = exams {
                let written = db::import_exams_csv(&pool, path).await?;
                println!("Recorded {written} exam results from {}.", path.display());
            }
            if let Some(path) = attendance {
                let inserted = db::import_attendance_csv(&pool, path).await?;
                println!("Inserted {inserted} attendance records from {}.", path.display());
            }
        }
        Commands::Summary {
            student,
            subject,
            term,
            academic_year,
        } => {
            let pool = connect(&cli).await?;
            let scores = db::fetch_student_scores(&pool, student, subject, *term).await?;
            let configs = db::fetch_term_configs(&pool).await?;
            let config = TermConfig::resolve(&configs, academic_year, *term);
            let summary = assessment::student_summary(student, subject, *term, &scores, &config);

            println!("{student} in {subject}, {term}:");
            for component in Component::ALL {
                println!(
                    "- {}: {:.2} / {:.2}",
                    component.label(),
                    summary.average(component),
                    config.max_score(component)
                );
            }
            println!(
                "Total {:.2} / {:.2} ({:.2}%)",
                summary.total,
                config.total_max_score(),
                summary.percentage
            );
        }
        Commands::Report {
            student,
            class,
            term,
            format,
            out,
        } => {
            let pool = connect(&cli).await?;
            let registry = db::load_registry(&pool).await?;
            let book = db::load_gradebook(&pool, class, *term).await?;
            let report = report::compute_student_report(&registry, &book, student, class, *term)
                .with_context(|| format!("student {student} or class {class} not found"))?;

            let contents = match format {
                OutputFormat::Markdown => report::render_markdown(&report),
                OutputFormat::Json => serde_json::to_string_pretty(&report)?,
            };
            write_output(out.as_ref(), &contents)?;
        }
        Commands::BulkReport {
            class,
            term,
            format,
            out,
        } => {
            let pool = connect(&cli).await?;
            let registry = db::load_registry(&pool).await?;
            let book = db::load_gradebook(&pool, class, *term).await?;
            let class_info = registry
                .class(class)
                .with_context(|| format!("class {class} not found"))?;
            let reports = report::generate_bulk_reports(&registry, &book, class, *term);
            info!(
                enrolled = class_info.student_ids.len(),
                reported = reports.len(),
                "bulk reports generated"
            );

            let contents = match format {
                OutputFormat::Markdown => {
                    report::render_class_markdown(&class_info.name, *term, &reports)
                }
                OutputFormat::Json => serde_json::to_string_pretty(&reports)?,
            };
            write_output(Some(out), &contents)?;
        }
    }

    Ok(())
}
