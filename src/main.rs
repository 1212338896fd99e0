use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use chrono::{Duration, Utc};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

mod api;
mod auth;
mod config;
mod db;
mod error;
mod export;
mod models;
mod report;
mod store;

use crate::auth::Claims;
use crate::config::{DatabaseArgs, ServerSettings};
use crate::db::PgStore;
use crate::export::ExportFormat;
use crate::models::UserStatus;
use crate::store::SurveyStore;

#[derive(Parser)]
#[command(name = "feedflow")]
#[command(about = "Multi-tenant survey collection and reporting service", long_about = None)]
struct Cli {
    #[command(flatten)]
    database: DatabaseArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the database schema
    InitDb,
    /// Load a demo tenant with surveys and responses
    Seed,
    /// Run the HTTP API
    Serve {
        #[command(flatten)]
        settings: ServerSettings,
    },
    /// Print a bearer token for an active user, carrying the company and
    /// role stored on the account
    Token {
        #[arg(long)]
        user_id: i64,
        #[arg(long, default_value_t = 24)]
        ttl_hours: i64,
        #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
        jwt_secret: String,
    },
    /// Write a survey report to disk
    Report {
        #[arg(long)]
        survey_id: i64,
        #[arg(long)]
        company_id: i64,
        #[arg(long, value_enum, default_value_t = ReportFormat::Json)]
        format: ReportFormat,
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Xlsx,
    Pdf,
}

impl ReportFormat {
    fn extension(self) -> &'static str {
        match self {
            ReportFormat::Json => "json",
            ReportFormat::Xlsx => ExportFormat::Xlsx.extension(),
            ReportFormat::Pdf => ExportFormat::Pdf.extension(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let pool = cli.database.connect().await?;

    match cli.command {
        Commands::InitDb => {
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Seed => {
            db::seed(&pool).await?;
            println!("Seed data inserted.");
        }
        Commands::Serve { settings } => {
            settings.validate()?;
            let store: Arc<dyn SurveyStore> = Arc::new(PgStore::new(pool));
            let state = api::AppState::new(store, &settings.jwt_secret, &settings.public_base_url);
            api::serve(state, &settings).await?;
        }
        Commands::Token {
            user_id,
            ttl_hours,
            jwt_secret,
        } => {
            if jwt_secret.trim().is_empty() {
                bail!("JWT_SECRET must not be empty");
            }
            let store = PgStore::new(pool);
            let Some(account) = store.user_account(user_id).await? else {
                bail!("user {user_id} does not exist");
            };
            if account.status == UserStatus::Inactive {
                bail!("user {user_id} is inactive");
            }

            let expires_at = (Utc::now() + Duration::hours(ttl_hours)).timestamp();
            let claims = Claims::for_account(&account, expires_at);
            let token = auth::sign_token(&claims, jwt_secret.as_bytes())?;
            eprintln!(
                "Token for {} ({}, company {}).",
                account.email,
                account.role.as_str(),
                account.company_id
            );
            println!("{token}");
        }
        Commands::Report {
            survey_id,
            company_id,
            format,
            out,
        } => {
            let store = PgStore::new(pool);
            let report = report::load_report(&store, survey_id, company_id)
                .await
                .with_context(|| format!("failed to load report for survey {survey_id}"))?;

            let bytes = match format {
                ReportFormat::Json => {
                    serde_json::to_vec_pretty(&export::json::to_json(company_id, &report))?
                }
                ReportFormat::Xlsx => ExportFormat::Xlsx.encode(&report)?,
                ReportFormat::Pdf => ExportFormat::Pdf.encode(&report)?,
            };

            let out = out.unwrap_or_else(|| {
                PathBuf::from(format!("reporte_encuesta_{survey_id}.{}", format.extension()))
            });
            std::fs::write(&out, bytes)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!(
                "Report for survey {survey_id} ({} questions) written to {}.",
                report.questions.len(),
                out.display()
            );
        }
    }

    Ok(())
}
