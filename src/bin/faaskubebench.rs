use anyhow::Context as _;
use chrono::{DateTime, Utc};
use clap::Parser;
use faaskubebench::{
    config::DEFAULT_EXPORTER_URL, report, types::ConsolidatedReport, BenchmarkConfig,
    ConsolidationEngine, Exporter, ExpositionParser, LoadRunner, MetricsExtractor, Scraper,
};
use std::path::PathBuf;
use tokio::task::JoinSet;

const EXPORTER_URL_ENV: &str = "FAASKUBEBENCH_EXPORTER_URL";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file
    //
    dotenvy::dotenv().ok();
    //
    // /////

    // Initialize tracing
    //
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    //
    // /////

    // Load benchmark configuration
    //
    let args = Arg::parse();
    let mut config = BenchmarkConfig::from_path(&args.config_path).with_context(|| {
        format!("failed to load config {}", args.config_path.display())
    })?;

    if let Some(url) = &args.exporter_url {
        config.scrape.url = url.clone();
    } else if config.scrape.url == DEFAULT_EXPORTER_URL {
        if let Ok(url) = std::env::var(EXPORTER_URL_ENV) {
            config.scrape.url = url;
        }
    }
    if args.no_exporter {
        config.exporter.enabled = false;
    }

    tracing::debug!("config: {config:#?}");
    //
    // /////

    let epoch = Utc::now();
    tracing::info!(
        "benchmark of {} on {} ({} x {} requests, concurrency {})",
        config.function,
        config.platform,
        config.executions,
        config.requests,
        config.concurrency
    );

    let exporter = config
        .exporter
        .enabled
        .then(|| Exporter::new(config.exporter.clone(), config.env_vars()));

    if let Some(exporter) = &exporter {
        exporter
            .start(epoch)
            .await
            .context("failed to start exporter")?;
    }

    let outcome = async {
        let report = benchmark(&config, epoch).await?;
        let summary = config.summary();

        print!("{}", report::render_summary(&report));

        if let Some(path) = &args.report {
            report::write_markdown(path, &report, &summary)
                .with_context(|| format!("failed to write report {}", path.display()))?;
        }

        if let Some(path) = &args.json {
            let json = serde_json::to_string_pretty(&serde_json::json!({
                "benchmark": summary,
                "report": report,
            }))?;
            std::fs::write(path, json)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }

        anyhow::Ok(())
    }
    .await;

    if let Some(exporter) = &exporter {
        if let Err(err) = exporter.stop().await {
            tracing::warn!("failed to stop exporter: {err}");
        }
    }

    outcome
}

/// Runs every execution, scrapes the exporter once and consolidates.
async fn benchmark(
    config: &BenchmarkConfig,
    epoch: DateTime<Utc>,
) -> anyhow::Result<ConsolidatedReport> {
    let (mut load_runner, load_runner_controller) = LoadRunner::new(config.to_hey_args());
    let (mut scraper, scraper_controller) =
        Scraper::new(config.scrape.clone()).context("failed to build scraper")?;

    let mut join_set = JoinSet::new();

    join_set.spawn(async move {
        load_runner.run().await;
    });

    join_set.spawn(async move {
        scraper.run().await;
    });

    let records = load_runner_controller
        .execute_all(config.executions)
        .await
        .context("load runner stopped")?;

    let body = match scraper_controller.scrape().await?.recv().await {
        Ok(body) => body,
        Err(err) => {
            tracing::warn!("continuing without cluster metrics: {err}");
            String::new()
        }
    };

    drop(load_runner_controller);
    drop(scraper_controller);
    join_set.join_all().await;

    let samples = ExpositionParser.parse(&body);
    let cluster = MetricsExtractor::new(config.metrics.clone()).extract(&samples);

    let runs = records
        .into_iter()
        .filter_map(|record| record.outcome.ok())
        .collect::<Vec<_>>();

    if runs.is_empty() {
        tracing::warn!("no run produced a usable result");
    }

    Ok(ConsolidationEngine::new(config.merge_policy).consolidate(&runs, &cluster, epoch))
}

#[derive(Debug, clap::Parser)]
struct Arg {
    /// benchmark YAML file
    config_path: PathBuf,

    /// write a Markdown report
    #[clap(long)]
    report: Option<PathBuf>,

    /// write the consolidated report as JSON
    #[clap(long)]
    json: Option<PathBuf>,

    /// exporter metrics endpoint
    #[clap(long = "exporter-url")]
    exporter_url: Option<String>,

    /// do not start or stop the exporter with docker compose
    #[clap(long = "no-exporter")]
    no_exporter: bool,
}
