use anyhow::Context;
use clap::Parser;
use nearest_amenity::core::orchestrator::partition_origins;
use nearest_amenity::domain::model::{OriginEntity, Progress};
use nearest_amenity::utils::error::ErrorSeverity;
use nearest_amenity::utils::{logger, validation::Validate};
use nearest_amenity::{
    persist_report, AmenityDiscoveryService, AppConfig, BatchOrchestrator, CliConfig, GeoCache,
    LocalJsonSink, OsrmRouteProvider, RouteDistanceResolver, RunState,
};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = CliConfig::parse();

    // logging
    if cli.json_logs {
        logger::init_json_logger();
    } else {
        logger::init_cli_logger(cli.verbose);
    }

    tracing::info!("Starting nearest-amenity");
    if cli.verbose {
        tracing::debug!("CLI config: {:?}", cli);
    }

    let mut config = match &cli.config {
        Some(path) => AppConfig::from_file(path)
            .with_context(|| format!("Failed to load config file '{}'", path))?,
        None => AppConfig::default(),
    };
    if let Some(output) = &cli.output {
        config.persistence.output_path = output.clone();
    }

    if let Err(e) = config.validate() {
        tracing::error!("❌ Configuration validation failed: {}", e);
        tracing::error!("💡 Suggestion: {}", e.recovery_suggestion());
        eprintln!("❌ {}", e.user_friendly_message());
        std::process::exit(1);
    }

    let Some(category) = config.category(&cli.category) else {
        let known: Vec<String> = config.category_definitions().into_iter().map(|c| c.key).collect();
        eprintln!("❌ Unknown category '{}'. Known categories: {}", cli.category, known.join(", "));
        std::process::exit(1);
    };

    let raw = tokio::fs::read_to_string(&cli.origins)
        .await
        .with_context(|| format!("Failed to read origins file '{}'", cli.origins))?;
    let origins: Vec<OriginEntity> =
        serde_json::from_str(&raw).with_context(|| format!("Origins file '{}' is not a JSON array of origins", cli.origins))?;
    tracing::info!("📂 Loaded {} origins from {}", origins.len(), cli.origins);

    if cli.dry_run {
        let (valid, invalid) = partition_origins(&origins);
        tracing::info!("🔍 DRY RUN MODE - No backend will be called");
        println!("Category: {} ({})", category.label, category.key);
        println!("Travel mode: {}", cli.mode);
        println!("Radius tiers: {:?}", config.search.radius_tiers);
        println!("Valid origins: {}", valid.len());
        println!("Invalid origins: {}", invalid.len());
        for entry in &invalid {
            println!("  - {}: {}", entry.origin_id, entry.reason);
        }
        return Ok(());
    }

    let cache = Arc::new(GeoCache::with_ttl(config.cache.ttl()));
    let discovery = AmenityDiscoveryService::new(config.discovery.clone(), config.category_definitions(), cache);
    let provider = OsrmRouteProvider::new(&config.routing)?;
    let resolver = RouteDistanceResolver::new(provider, &config.routing);

    let orchestrator = BatchOrchestrator::new(discovery, resolver, config.batch.clone(), config.search.radius_tiers.clone())
        .with_monitoring(cli.monitor)
        .with_observer(|progress: Progress| {
            tracing::info!("⏳ {}/{} origins processed", progress.processed, progress.total);
        });

    let cancel = orchestrator.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        tracing::warn!("🛑 Interrupt received, finishing in-flight origins (Ctrl-C again to abort)");
        cancel.cancel();
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("🛑 Aborted");
            std::process::exit(130);
        }
    });

    let report = orchestrator.run(&origins, &category.key, cli.mode).await;

    let sink = LocalJsonSink::new(&config.persistence.output_path, category.key.as_str());
    let persisted = persist_report(&sink, &report, &category.key, config.persistence.chunk_size).await;

    let summary_path = std::path::Path::new(&config.persistence.output_path).join(format!("{}_summary.json", category.key));
    let summary = serde_json::json!({
        "summary": report.summary(),
        "invalid": report.invalid,
        "no_result": report.no_result,
        "persistence": persisted,
        "partial_results": (report.state != RunState::Completed).then_some(&report.results),
    });
    tokio::fs::create_dir_all(&config.persistence.output_path).await?;
    tokio::fs::write(&summary_path, serde_json::to_vec_pretty(&summary)?)
        .await
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    let run_summary = report.summary();
    println!(
        "✅ {} resolved, {} without result, {} invalid ({} of {} processed)",
        run_summary.succeeded, run_summary.no_result, run_summary.invalid, run_summary.processed, run_summary.total
    );
    println!("📁 Output saved to: {}", config.persistence.output_path);

    match report.state {
        RunState::Completed => {}
        RunState::Cancelled => {
            eprintln!("⚠️ Run cancelled, partial results are listed in {}", summary_path.display());
            std::process::exit(130);
        }
        RunState::Failed => {
            if let Some(e) = &report.error {
                eprintln!("❌ {}", e.user_friendly_message());
                eprintln!("💡 Suggestion: {}", e.recovery_suggestion());
                let exit_code = match e.severity() {
                    ErrorSeverity::Low | ErrorSeverity::Medium => 2,
                    ErrorSeverity::High => 1,
                    ErrorSeverity::Critical => 3,
                };
                std::process::exit(exit_code);
            }
            std::process::exit(1);
        }
        RunState::Idle | RunState::Running => {}
    }

    let failed_chunks = persisted.as_ref().map_or(0, |p| p.failed_chunks());
    if failed_chunks > 0 {
        eprintln!("⚠️ {} result chunks could not be saved", failed_chunks);
        std::process::exit(2);
    }

    Ok(())
}
