use clap::Parser;
use ranking_engine::{
    args::Args,
    database::db::DbClient,
    messaging::{MatchResultConsumer, RabbitMqConfig},
    model::{ranking_engine::RankingEngine, structures::processing::CycleReport}
};
use std::{process::ExitCode, sync::Arc};
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&args.log_level))
        .init();

    let client = match DbClient::connect(&args.connection_string).await {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!("Failed to connect to the database: {}", e);
            return ExitCode::FAILURE;
        }
    };

    if args.init_schema {
        if let Err(e) = client.ensure_schema().await {
            error!("Failed to create schema: {}", e);
            return ExitCode::FAILURE;
        }
    }

    let engine = Arc::new(RankingEngine::with_store(client.clone(), args.scheduler_config()).with_lease(client));

    if let Some(sport_type) = args.recalculate {
        info!("Recalculating {} rankings", sport_type);
        let report = engine.calculate_rankings(sport_type).await;
        return finish(&report);
    }

    if args.run_now {
        return match engine.scheduler().run_cycle().await {
            Some(report) => finish(&report),
            None => {
                error!("A ranking cycle is already running");
                ExitCode::FAILURE
            }
        };
    }

    serve(engine).await
}

/// Prints the report and maps it to the process exit code.
fn finish(report: &CycleReport) -> ExitCode {
    match serde_json::to_string_pretty(report) {
        Ok(json) => println!("{}", json),
        Err(e) => warn!("Failed to serialize cycle report: {}", e)
    }

    if report.failed() > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

async fn serve(engine: Arc<RankingEngine>) -> ExitCode {
    let rabbitmq = match RabbitMqConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid RabbitMQ configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let consumer = if rabbitmq.enabled {
        let mut consumer = match MatchResultConsumer::connect_from_config(&rabbitmq).await {
            Ok(consumer) => consumer,
            Err(e) => {
                error!("Failed to start match result consumer: {}", e);
                return ExitCode::FAILURE;
            }
        };

        let engine = Arc::clone(&engine);
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            if let Err(e) = consumer.run(engine, rx).await {
                error!("Match result consumer failed: {}", e);
            }
            if let Err(e) = consumer.close().await {
                warn!("Failed to close RabbitMQ connection: {}", e);
            }
        }))
    } else {
        info!("RabbitMQ disabled, match results will not be consumed");
        None
    };

    let scheduler = tokio::spawn(engine.scheduler().run(shutdown_rx));

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutting down...");
    let _ = shutdown_tx.send(true);

    if let Err(e) = scheduler.await {
        error!("Scheduler task failed: {}", e);
    }
    if let Some(consumer) = consumer {
        if let Err(e) = consumer.await {
            error!("Consumer task failed: {}", e);
        }
    }

    ExitCode::SUCCESS
}
