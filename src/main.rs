use std::path::PathBuf;

use anyhow::Context;
use clap::{ArgGroup, Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod batch;
mod client;
mod collector;
mod config;
mod console;
mod display;
mod error;
mod feedback;
mod identity;
mod models;
mod report;
mod session;

use crate::client::ScoringApi;
use crate::collector::{Collector, Preset};
use crate::config::{Config, ServiceArgs};
use crate::feedback::Judgement;
use crate::models::{Mode, PredictionId};
use crate::session::Session;

#[derive(Parser)]
#[command(name = "fraud-check")]
#[command(about = "Terminal client for the fraud scoring service", long_about = None)]
struct Cli {
    #[command(flatten)]
    service: ServiceArgs,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one transaction
    Check {
        #[arg(long, value_enum, default_value_t = Mode::Banking)]
        mode: Mode,
        /// Field override as NAME=VALUE, e.g. -f Transaction_Amount=120.5
        #[arg(short = 'f', long = "field", value_parser = parse_field)]
        fields: Vec<(String, String)>,
        /// Credit card sample values, applied before any -f overrides
        #[arg(long, value_enum)]
        preset: Option<Preset>,
        /// Print the raw result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Report whether a stored verdict was right; the verdict itself is
    /// looked up from the service
    #[command(group(
        ArgGroup::new("judgement")
            .args(["correct", "incorrect"])
            .required(true)
    ))]
    Feedback {
        /// Prediction id printed by `check`
        #[arg(long)]
        id: Option<String>,
        #[arg(long)]
        correct: bool,
        #[arg(long, requires = "note")]
        incorrect: bool,
        /// Required with --incorrect
        #[arg(long)]
        note: Option<String>,
    },
    /// Show aggregate statistics
    Stats,
    /// Check the service and its models
    Health,
    /// List recently stored predictions
    Predictions {
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Show one stored prediction
    Prediction {
        #[arg(long)]
        id: String,
    },
    /// Score every row of a CSV file and write a markdown report
    Batch {
        #[arg(long, value_enum, default_value_t = Mode::Banking)]
        mode: Mode,
        #[arg(long)]
        csv: PathBuf,
        #[arg(long, default_value = "fraud-report.md")]
        out: PathBuf,
    },
    /// Interactive dashboard
    Console {
        #[arg(long, value_enum, default_value_t = Mode::Banking)]
        mode: Mode,
    },
    /// Show the signed-in user
    Whoami,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("fraud_check_console=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::from_args(cli.service)?;
    let api = config.client()?;

    match cli.command {
        Commands::Check {
            mode,
            fields,
            preset,
            json,
        } => {
            let mut collector = Collector::new(mode);
            if let Some(preset) = preset {
                collector.apply_preset(preset)?;
            }
            for (name, value) in &fields {
                collector.set_field(name, value)?;
            }
            let record = collector.collect()?;
            let result = api
                .check_fraud(&record)
                .await
                .context("fraud check failed")?;

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                print!("{}", display::render_result(&result));
            }
        }
        Commands::Feedback {
            id,
            correct,
            incorrect: _,
            note,
        } => {
            let judgement = if correct {
                Judgement::Correct
            } else {
                Judgement::Incorrect {
                    note: note.unwrap_or_default(),
                }
            };
            let prediction_id = id.as_deref().and_then(PredictionId::parse);
            let ack = feedback::submit_stored(&api, prediction_id.as_ref(), judgement)
                .await
                .context("feedback not recorded")?;
            match ack.message {
                Some(message) => println!("Thank you for your feedback. ({message})"),
                None => println!("Thank you for your feedback."),
            }
        }
        Commands::Stats => {
            let stats = api.stats().await.context("could not load statistics")?;
            let users = identity::registered_user_count(&config.user_registry);
            print!("{}", display::render_stats(&stats, Some(users)));
        }
        Commands::Health => {
            let health = api.health().await.context("health check failed")?;
            print!("{}", display::render_health(&health));
        }
        Commands::Predictions { limit } => {
            let predictions = api.recent_predictions(limit).await?;
            print!("{}", display::render_predictions(&predictions));
        }
        Commands::Prediction { id } => {
            let id = PredictionId::parse(&id).context("prediction id must be a positive number")?;
            let prediction = api.prediction(&id).await?;
            print!("{}", display::render_prediction_detail(&prediction));
        }
        Commands::Batch { mode, csv, out } => {
            let file = std::fs::File::open(&csv)
                .with_context(|| format!("cannot open {}", csv.display()))?;
            let rows = batch::load_rows(mode, file)?;
            let outcomes = batch::run(&api, rows).await;
            let report = report::build_report(
                Uuid::new_v4(),
                mode,
                &csv.display().to_string(),
                &outcomes,
            );
            std::fs::write(&out, report)?;
            println!("Scored {} rows; report written to {}.", outcomes.len(), out.display());
        }
        Commands::Console { mode } => {
            let users = identity::registered_user_count(&config.user_registry);
            let mut console = console::Console::new(
                Session::new(mode),
                config.auth.user().clone(),
                config.auth.is_demo(),
                users,
                std::io::stdout(),
            );
            console::run(&api, &mut console).await?;
        }
        Commands::Whoami => {
            println!(
                "{}",
                display::render_user(config.auth.user(), config.auth.is_demo())
            );
        }
    }

    Ok(())
}

fn parse_field(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| format!("expected NAME=VALUE, got {raw:?}"))
}
