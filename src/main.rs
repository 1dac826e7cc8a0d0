use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

mod aggregate;
mod causal;
mod config;
mod db;
mod events;
mod ingest;
mod metrics;
mod models;
mod overlay;
mod report;
mod simulation;

use aggregate::Granularity;
use config::AppConfig;
use events::EventBook;
use models::{DailyRecord, EventDraft, ForecastHorizon, SalesMetrics};
use simulation::{Scenario, SimulationParams};

#[derive(Parser)]
#[command(name = "forecast-overlay")]
#[command(about = "Sales forecast aggregation and causal event overlay", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Where the daily series comes from: a forecast service response or a CSV upload.
#[derive(Args)]
#[group(required = true, multiple = false)]
struct SeriesSource {
    /// JSON body returned by the forecasting service
    #[arg(long)]
    forecast: Option<PathBuf>,
    /// CSV with date,actual,baseline columns
    #[arg(long)]
    csv: Option<PathBuf>,
}

#[derive(Args)]
struct EventFields {
    #[arg(long = "type")]
    type_label: String,
    #[arg(long)]
    start: Option<NaiveDate>,
    #[arg(long)]
    end: Option<NaiveDate>,
    #[arg(long, allow_hyphen_values = true)]
    impact: f64,
}

impl EventFields {
    fn draft(&self) -> EventDraft {
        EventDraft {
            type_label: self.type_label.clone(),
            start_date: self.start,
            end_date: self.end,
            impact_percent: self.impact,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Create or upgrade the session storage schema
    InitDb,
    /// Fold the series into chart buckets with causal events applied
    Aggregate {
        #[command(flatten)]
        source: SeriesSource,
        #[arg(long, default_value = "events.json")]
        events: PathBuf,
        #[arg(long, value_enum, default_value_t = Granularity::Monthly)]
        granularity: Granularity,
        /// Print JSON instead of a table; daily granularity emits per-day rows with the band
        #[arg(long)]
        json: bool,
    },
    /// Declare a causal event within the forecast horizon
    AddEvent {
        #[command(flatten)]
        source: SeriesSource,
        #[arg(long, default_value = "events.json")]
        events: PathBuf,
        #[command(flatten)]
        fields: EventFields,
    },
    /// Replace the fields of an existing causal event
    UpdateEvent {
        #[command(flatten)]
        source: SeriesSource,
        #[arg(long, default_value = "events.json")]
        events: PathBuf,
        #[arg(long)]
        id: Uuid,
        #[command(flatten)]
        fields: EventFields,
    },
    /// Delete a causal event
    RemoveEvent {
        #[arg(long, default_value = "events.json")]
        events: PathBuf,
        #[arg(long)]
        id: Uuid,
    },
    /// List declared causal events
    ListEvents {
        #[arg(long, default_value = "events.json")]
        events: PathBuf,
    },
    /// Show sales totals and forecast accuracy
    Metrics {
        #[command(flatten)]
        source: SeriesSource,
        #[arg(long, default_value = "events.json")]
        events: PathBuf,
    },
    /// Rank causal factor columns of a sales CSV by correlation with sales
    Correlate {
        #[arg(long)]
        csv: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Run an inventory scenario against the adjusted forecast
    Simulate {
        /// Forecast service JSON; without it demand is flat
        #[arg(long)]
        forecast: Option<PathBuf>,
        #[arg(long, default_value = "events.json")]
        events: PathBuf,
        #[arg(long, value_enum, default_value_t = Scenario::Baseline)]
        scenario: Scenario,
        #[arg(long, default_value_t = 1000)]
        stock: i64,
        #[arg(long, default_value_t = 2)]
        lead_time: u32,
        #[arg(long, default_value_t = 30)]
        days: u32,
        /// Flat average daily demand; overrides --forecast when both are given
        #[arg(long)]
        demand: Option<f64>,
        #[arg(long)]
        json: bool,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        source: SeriesSource,
        #[arg(long, default_value = "events.json")]
        events: PathBuf,
        #[arg(long, value_enum, default_value_t = Granularity::Monthly)]
        granularity: Granularity,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
    /// Store a forecast payload and event list under a session name
    SaveSession {
        #[arg(long)]
        name: String,
        #[arg(long)]
        forecast: PathBuf,
        #[arg(long, default_value = "events.json")]
        events: PathBuf,
    },
    /// Restore a saved session to local files
    LoadSession {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "forecast.json")]
        forecast_out: PathBuf,
        #[arg(long, default_value = "events.json")]
        events_out: PathBuf,
    },
}

struct Series {
    records: Vec<DailyRecord>,
    reported_metrics: Option<SalesMetrics>,
    service_total: Option<f64>,
    regressors: Vec<String>,
}

impl Series {
    fn horizon(&self) -> Option<ForecastHorizon> {
        ForecastHorizon::from_records(&self.records)
    }
}

fn load_series(source: &SeriesSource) -> anyhow::Result<Series> {
    match (&source.forecast, &source.csv) {
        (Some(path), _) => {
            let (response, records) = ingest::load_forecast_file(path)?;
            Ok(Series {
                records,
                reported_metrics: response.metrics(),
                service_total: response.monthly_total,
                regressors: response.regressors,
            })
        }
        (None, Some(path)) => Ok(Series {
            records: ingest::load_records_csv(path)?,
            reported_metrics: None,
            service_total: None,
            regressors: Vec::new(),
        }),
        (None, None) => anyhow::bail!("either --forecast or --csv is required"),
    }
}

fn load_book(path: &Path) -> anyhow::Result<EventBook> {
    Ok(EventBook::new(ingest::load_events_file(path)?))
}

async fn connect(config: &AppConfig) -> anyhow::Result<PgPool> {
    let database_url = config.require_database_url()?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(database_url)
        .await
        .context("failed to connect to Postgres")
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    match cli.command {
        Commands::InitDb => {
            let pool = connect(&config).await?;
            db::init_db(&pool).await?;
            println!("Schema ready.");
        }
        Commands::Aggregate {
            source,
            events,
            granularity,
            json,
        } => {
            let series = load_series(&source)?;
            let book = load_book(&events)?;
            let rows = overlay::apply_events(&series.records, book.events(), config.band);
            let buckets = aggregate::aggregate(&rows, granularity);

            if json && granularity == Granularity::Daily {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else if json {
                println!("{}", serde_json::to_string_pretty(&buckets)?);
            } else if buckets.is_empty() {
                println!("No records to aggregate.");
            } else {
                for bucket in &buckets {
                    println!(
                        "{:<24} actual {:>12} baseline {:>12} adjusted {:>12}",
                        bucket.bucket_label,
                        fmt_sum(bucket.actual_sum),
                        fmt_sum(bucket.baseline_sum),
                        fmt_sum(bucket.predicted_sum),
                    );
                    for (key, impact) in &bucket.per_event_sum {
                        println!("    {key}: {impact:+.2}");
                    }
                }
                if granularity == Granularity::Daily {
                    println!();
                    print!("{}", report::forecast_band_table(&rows));
                }
            }
        }
        Commands::AddEvent {
            source,
            events,
            fields,
        } => {
            let series = load_series(&source)?;
            let mut book = load_book(&events)?;
            let event = book.add(&fields.draft(), series.horizon())?;
            ingest::write_events_file(&events, book.events())?;
            println!(
                "Added {} ({} to {}, {:+.1}%) as {}.",
                event.type_label, event.start_date, event.end_date, event.impact_percent, event.id
            );
        }
        Commands::UpdateEvent {
            source,
            events,
            id,
            fields,
        } => {
            let series = load_series(&source)?;
            let mut book = load_book(&events)?;
            let event = book.update(id, &fields.draft(), series.horizon())?;
            ingest::write_events_file(&events, book.events())?;
            println!("Updated {}.", event.key());
        }
        Commands::RemoveEvent { events, id } => {
            let mut book = load_book(&events)?;
            let removed = book.remove(id)?;
            ingest::write_events_file(&events, book.events())?;
            println!("Removed {}.", removed.key());
        }
        Commands::ListEvents { events } => {
            let book = load_book(&events)?;
            if book.events().is_empty() {
                println!("No causal events declared.");
                return Ok(());
            }
            for event in book.events() {
                println!(
                    "- {} {} {} to {} ({:+.1}%)",
                    event.id,
                    event.type_label,
                    event.start_date,
                    event.end_date,
                    event.impact_percent
                );
            }
        }
        Commands::Metrics { source, events } => {
            let series = load_series(&source)?;
            let book = load_book(&events)?;
            let rows = overlay::apply_events(&series.records, book.events(), config.band);
            let buckets = aggregate::aggregate(&rows, Granularity::Monthly);
            let summary = metrics::summarize(&rows, &buckets);

            println!("Actual sales: {:.2}", summary.total_actual);
            println!("Baseline forecast: {:.2}", summary.total_baseline);
            println!("Adjusted forecast: {:.2}", summary.total_predicted);
            println!("Net event impact: {:+.2}", summary.total_event_impact);
            if let Some(total) = series.service_total {
                println!("Service forecast total: {total:.2}");
            }
            if !series.regressors.is_empty() {
                println!("Regressors: {}", series.regressors.join(", "));
            }
            match series
                .reported_metrics
                .or_else(|| metrics::accuracy_for_rows(&rows))
            {
                Some(accuracy) => println!(
                    "MAE {:.2}, RMSE {:.2}, MAPE {:.1}%",
                    accuracy.mae, accuracy.rmse, accuracy.mape
                ),
                None => println!("No overlapping actuals to score the forecast."),
            }
        }
        Commands::Correlate { csv, json } => {
            let correlations = causal::load_factor_correlations(&csv)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&correlations)?);
            } else if correlations.is_empty() {
                println!("No causal factor columns found.");
            } else {
                for factor in &correlations {
                    println!("{}: {:.3}", factor.factor, factor.correlation);
                }
            }
        }
        Commands::Simulate {
            forecast,
            events,
            scenario,
            stock,
            lead_time,
            days,
            demand,
            json,
        } => {
            let forecast_values = match forecast.filter(|_| demand.is_none()) {
                Some(path) => {
                    let (_, records) = ingest::load_forecast_file(&path)?;
                    let book = load_book(&events)?;
                    let values: Vec<f64> =
                        overlay::apply_events(&records, book.events(), config.band)
                            .into_iter()
                            .filter_map(|row| row.predicted)
                            .collect();
                    Some(values)
                }
                None => None,
            };
            let params = SimulationParams {
                scenario,
                stock,
                lead_time,
                days,
                mean_demand: demand,
            };
            let result = simulation::simulate(&params, forecast_values.as_deref());

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!(
                    "Scenario {}: final stock {}, shortages {}, service level {:.1}%",
                    result.scenario,
                    result.final_stock,
                    result.shortages,
                    result.service_level * 100.0
                );
                println!(
                    "Impact vs baseline: demand {}%, cost {}%, efficiency {}%",
                    result.impact.demand, result.impact.cost, result.impact.efficiency
                );
            }
        }
        Commands::Report {
            source,
            events,
            granularity,
            out,
        } => {
            let series = load_series(&source)?;
            let book = load_book(&events)?;
            let rows = overlay::apply_events(&series.records, book.events(), config.band);
            let buckets = aggregate::aggregate(&rows, granularity);
            let summary = metrics::summarize(&rows, &buckets);
            let report = report::build_report(&report::ReportInput {
                granularity,
                horizon: series.horizon(),
                summary: &summary,
                accuracy: series
                    .reported_metrics
                    .or_else(|| metrics::accuracy_for_rows(&rows)),
                events: book.events(),
                buckets: &buckets,
                rows: &rows,
            });
            std::fs::write(&out, report)?;
            println!("Report written to {}.", out.display());
        }
        Commands::SaveSession {
            name,
            forecast,
            events,
        } => {
            let body = std::fs::read_to_string(&forecast)
                .with_context(|| format!("failed to read forecast file {}", forecast.display()))?;
            ingest::parse_forecast_json(&body)?;
            let payload: serde_json::Value = serde_json::from_str(&body)?;
            let book = load_book(&events)?;

            let pool = connect(&config).await?;
            db::save_forecast(&pool, &name, &payload).await?;
            db::save_events(&pool, &name, book.events()).await?;
            println!("Saved session '{name}' with {} events.", book.events().len());
        }
        Commands::LoadSession {
            name,
            forecast_out,
            events_out,
        } => {
            let pool = connect(&config).await?;
            let (payload, records) = db::load_forecast(&pool, &name).await?;
            let events = db::load_events(&pool, &name).await?;

            std::fs::write(&forecast_out, serde_json::to_string_pretty(&payload)?)?;
            ingest::write_events_file(&events_out, &events)?;
            println!(
                "Restored session '{name}': {} days, {} events.",
                records.len(),
                events.len()
            );
        }
    }

    Ok(())
}

fn fmt_sum(value: Option<f64>) -> String {
    value.map_or_else(|| "-".to_string(), |v| format!("{v:.2}"))
}
