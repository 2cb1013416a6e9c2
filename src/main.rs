use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use herald::approval::{ApprovalGate, AutoApprove, ConsoleGate};
use herald::collaborators::{KeywordTrendSource, SinkPublisher, TemplateGenerator};
use herald::config::{parse_platform_list, Config};
use herald::dispatch::{HistoryFilter, PostDispatcher, PostStatus};
use herald::models::Platform;
use herald::orchestrator::CycleOrchestrator;
use herald::planner::TimeSlotPlanner;
use herald::runner::{BackgroundRunner, RunnerConfig};
use herald::utils::SystemClock;

#[derive(Parser)]
#[command(
    name = "herald",
    version,
    about = "Trend-driven social publishing pipeline with slot-based scheduling",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Keywords for trend scanning (comma-separated)
    #[arg(short, long, global = true)]
    keywords: Option<String>,

    /// Target platforms (comma-separated: twitter, instagram, linkedin)
    #[arg(short, long, global = true)]
    platforms: Option<String>,

    /// Time zone label for scheduling
    #[arg(short, long, global = true)]
    time_zone: Option<String>,

    /// Simulate publishing without any external call
    #[arg(short, long, global = true)]
    dry_run: bool,

    /// Require human approval before scheduling each post
    #[arg(short = 'r', long, global = true)]
    human_review: bool,

    /// Hours between trend scans
    #[arg(long, global = true)]
    trend_interval: Option<u64>,

    /// Hours between content creation passes
    #[arg(long, global = true)]
    content_interval: Option<u64>,

    /// Maximum Twitter posts per day
    #[arg(long, global = true)]
    max_twitter: Option<u32>,

    /// Maximum Instagram posts per day
    #[arg(long, global = true)]
    max_instagram: Option<u32>,

    /// Maximum LinkedIn posts per day
    #[arg(long, global = true)]
    max_linkedin: Option<u32>,

    /// Directory for persisted pipeline state
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true, default_value = "text")]
    log_format: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one pipeline cycle and exit
    Run,

    /// Run as a daemon with scheduled triggers until interrupted
    Daemon,

    /// Print upcoming optimal publish times for a platform
    Plan {
        /// Platform to plan for
        #[arg(long, default_value = "twitter")]
        platform: String,

        /// Number of slots to print
        #[arg(short = 'n', long, default_value = "5")]
        count: usize,
    },

    /// Show posting history from the post log
    History {
        /// Filter by platform
        #[arg(long)]
        platform: Option<String>,

        /// Filter by status (pending, approved, rejected, dispatched, retrying, failed)
        #[arg(long)]
        status: Option<String>,

        /// Maximum entries to print
        #[arg(short = 'n', long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = build_config(&cli)?;
    setup_tracing(&cli.log_format, cli.verbose, &config)?;

    tracing::info!(
        platforms = ?config.pipeline.platforms,
        keywords = ?config.pipeline.keywords,
        time_zone = %config.pipeline.time_zone,
        dry_run = config.pipeline.dry_run,
        human_review = config.pipeline.human_review,
        "herald starting"
    );

    match cli.command {
        Commands::Run => run_once(config).await?,
        Commands::Daemon => run_daemon(config).await?,
        Commands::Plan { platform, count } => plan(config, &platform, count)?,
        Commands::History {
            platform,
            status,
            limit,
        } => history(config, platform.as_deref(), status.as_deref(), limit)?,
    }

    Ok(())
}

/// Merge file/env config with command-line overrides, then validate.
///
/// Validation failures abort startup with a non-zero exit code.
fn build_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    if let Some(keywords) = &cli.keywords {
        config.pipeline.keywords = keywords
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Some(platforms) = &cli.platforms {
        config.pipeline.platforms = parse_platform_list(platforms)?;
    }

    if let Some(tz) = &cli.time_zone {
        config.pipeline.time_zone = tz.clone();
    }

    if cli.dry_run {
        config.pipeline.dry_run = true;
    }

    if cli.human_review {
        config.pipeline.human_review = true;
    }

    if let Some(hours) = cli.trend_interval {
        config.pipeline.trend_scan_interval_hours = hours;
    }

    if let Some(hours) = cli.content_interval {
        config.pipeline.content_creation_interval_hours = hours;
    }

    if let Some(max) = cli.max_twitter {
        config
            .pipeline
            .max_posts_per_day
            .insert(Platform::Twitter.as_str().to_string(), max);
    }

    if let Some(max) = cli.max_instagram {
        config
            .pipeline
            .max_posts_per_day
            .insert(Platform::Instagram.as_str().to_string(), max);
    }

    if let Some(max) = cli.max_linkedin {
        config
            .pipeline
            .max_posts_per_day
            .insert(Platform::Linkedin.as_str().to_string(), max);
    }

    if let Some(dir) = &cli.data_dir {
        config.storage.data_dir = dir.clone();
    }

    config.validate()?;
    Ok(config)
}

fn setup_tracing(format: &str, verbose: bool, config: &Config) -> Result<()> {
    let directives = if verbose {
        String::from("herald=debug,info")
    } else {
        format!("herald={},warn", config.logging.level)
    };
    let env_filter = tracing_subscriber::EnvFilter::new(directives);

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer())
                .init();
        }
    }

    Ok(())
}

/// Wire the pipeline components from config
fn build_pipeline(config: &Config) -> (Arc<CycleOrchestrator>, Arc<PostDispatcher>) {
    let clock = Arc::new(SystemClock);

    let gate: Arc<dyn ApprovalGate> = if config.pipeline.human_review {
        Arc::new(ConsoleGate)
    } else {
        Arc::new(AutoApprove)
    };

    let dispatcher = Arc::new(PostDispatcher::new(
        config.storage.post_log_path(),
        Arc::new(SinkPublisher),
        config.retry_config(),
        config.external_timeout(),
        config.pipeline.dry_run,
        clock.clone(),
    ));

    let orchestrator = Arc::new(CycleOrchestrator::new(
        config.clone(),
        Arc::new(KeywordTrendSource),
        Arc::new(TemplateGenerator::default()),
        gate,
        dispatcher.clone(),
        clock,
    ));

    (orchestrator, dispatcher)
}

async fn run_once(config: Config) -> Result<()> {
    let (orchestrator, dispatcher) = build_pipeline(&config);

    let report = orchestrator.run_daily_cycle().await?;
    let summary = dispatcher.process_due().await?;

    println!("Cycle completed:");
    println!("  Trends refreshed:  {}", report.trends_refreshed);
    println!("  Content generated: {}", report.content_generated);
    println!("  Posts scheduled:   {}", report.posts_scheduled);
    println!("  Posts rejected:    {}", report.posts_rejected);
    println!("  Posts dispatched:  {}", summary.dispatched);

    Ok(())
}

async fn run_daemon(config: Config) -> Result<()> {
    let (orchestrator, dispatcher) = build_pipeline(&config);
    let runner = BackgroundRunner::new(
        RunnerConfig::from_config(&config),
        orchestrator,
        dispatcher,
        Arc::new(SystemClock),
    );

    runner.start();
    tracing::info!("Daemon running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    tracing::info!("Interrupt received, shutting down");
    runner.stop().await;

    Ok(())
}

fn plan(config: Config, platform: &str, count: usize) -> Result<()> {
    let platform = Platform::parse(platform)
        .ok_or_else(|| anyhow::anyhow!("unknown platform: {platform}"))?;

    let planner = TimeSlotPlanner::new(config.schedule.slot_template.clone());
    let from = chrono::Utc::now()
        + chrono::Duration::minutes(i64::from(config.schedule.schedule_lead_minutes));
    let times = planner.get_bulk_schedule(platform, count, from, config.schedule.min_gap_hours);

    println!("Next {count} publish slots for {platform}:");
    for (i, time) in times.iter().enumerate() {
        println!("  {}. {}", i + 1, time.format("%Y-%m-%d %H:%M (%a)"));
    }

    Ok(())
}

fn history(
    config: Config,
    platform: Option<&str>,
    status: Option<&str>,
    limit: usize,
) -> Result<()> {
    let platform = platform
        .map(|p| Platform::parse(p).ok_or_else(|| anyhow::anyhow!("unknown platform: {p}")))
        .transpose()?;
    let status = status
        .map(|s| PostStatus::parse(s).ok_or_else(|| anyhow::anyhow!("unknown status: {s}")))
        .transpose()?;

    let (_, dispatcher) = build_pipeline(&config);
    let filter = HistoryFilter {
        platform,
        status,
        ..Default::default()
    };
    let posts = dispatcher.history(&filter)?;

    if posts.is_empty() {
        println!("No matching posts in the log.");
        return Ok(());
    }

    for post in posts.iter().take(limit) {
        println!(
            "{}  {:<10} {:<10} attempts={} {}",
            post.scheduled_time.format("%Y-%m-%d %H:%M"),
            post.platform,
            post.status,
            post.attempt_count,
            post.remote_id.as_deref().unwrap_or("-"),
        );
    }

    Ok(())
}
