use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use dashboard_data::cache::{CacheKey, RefreshCache};
use dashboard_data::catalog::DatasetKind;
use dashboard_data::config::DashboardConfig;
use dashboard_data::{export, report, Generator};

#[derive(Parser)]
#[command(name = "dashboard")]
#[command(about = "Synthetic analytics dashboard data and reports", long_about = None)]
struct Cli {
    /// JSON file overriding the default dashboard parameters
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print headline metrics and goal progress
    Summary {
        #[arg(long)]
        days: Option<i64>,
    },
    /// Generate a markdown dashboard report
    Report {
        #[arg(long)]
        days: Option<i64>,
        /// Analytics period for the traffic section
        #[arg(long)]
        period: Option<i64>,
        #[arg(long, default_value = "dashboard.md")]
        out: PathBuf,
    },
    /// Write one generated dataset
    Export {
        dataset: DatasetKind,
        #[arg(long)]
        days: Option<i64>,
        #[arg(long, value_enum, default_value_t = Format::Csv)]
        format: Format,
        /// Defaults to stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
    Csv,
    Json,
}

fn init_logging() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    tracing_subscriber::registry()
        .with(env_filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .compact(),
        )
        .try_init()?;

    Ok(())
}

fn load_config(path: Option<&PathBuf>) -> anyhow::Result<DashboardConfig> {
    let Some(path) = path else {
        return Ok(DashboardConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config = DashboardConfig::from_json(&raw)
        .with_context(|| format!("invalid config {}", path.display()))?;
    info!(path = %path.display(), "loaded config");
    Ok(config)
}

fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();
    let mut config = load_config(cli.config.as_ref())?;

    let cache = RefreshCache::new();
    let mut generator = Generator::from_entropy();

    match cli.command {
        Commands::Summary { days } => {
            if let Some(days) = days {
                config.days = days;
            }
            config.validate()?;
            let overview = cache.get_or_generate(
                CacheKey::new(DatasetKind::Overview, config.days),
                || generator.overview(config.days),
            )?;
            let kpis = report::kpis(&overview, &config)?;

            println!("Dashboard over the last {} days:", config.days);
            println!("- Total sales: {:.0}", kpis.total_sales);
            if let Some(avg) = kpis.avg_customers {
                println!("- Average customers: {avg:.0}");
            }
            println!("- Total revenue: ${:.2}", kpis.total_revenue);
            if let Some(avg) = kpis.avg_conversion {
                println!("- Average conversion: {avg:.1}%");
            }
            println!(
                "- Sales goal: {:.1}% of {:.0}",
                kpis.sales_progress * 100.0,
                config.sales_goal
            );
            println!(
                "- Revenue goal: {:.1}% of ${:.0}",
                kpis.revenue_progress * 100.0,
                config.revenue_goal
            );
        }
        Commands::Report { days, period, out } => {
            if let Some(days) = days {
                config.days = days;
            }
            if let Some(period) = period {
                config.period_days = period;
            }
            let dashboard = report::load_dashboard(&cache, &mut generator, &config)?;
            let report = report::build_report(&dashboard, &config)?;
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
        Commands::Export {
            dataset,
            days,
            format,
            out,
        } => {
            let days = days.unwrap_or(match dataset {
                DatasetKind::Traffic => config.traffic_days,
                _ => config.days,
            });
            let table = cache.get_or_generate(CacheKey::new(dataset, days), || {
                generator.dataset(dataset, days)
            })?;
            info!(%dataset, rows = table.len(), "exporting dataset");

            let mut writer: Box<dyn Write> = match &out {
                Some(path) => Box::new(
                    std::fs::File::create(path)
                        .with_context(|| format!("failed to create {}", path.display()))?,
                ),
                None => Box::new(std::io::stdout().lock()),
            };
            match format {
                Format::Csv => export::write_csv(&table, &mut writer)?,
                Format::Json => {
                    serde_json::to_writer_pretty(&mut writer, &export::to_json(&table)?)?;
                    writeln!(writer)?;
                }
            }
            writer.flush()?;

            if let Some(path) = out {
                println!("Wrote {} {} rows to {}.", table.len(), dataset, path.display());
            }
        }
    }

    Ok(())
}
