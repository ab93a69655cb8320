use anyhow::{Context, Result};
use clap::Parser;
use loadagent_config::{AgentConfig, ConfigLoader};
use loadagent_core::QueueState;
use loadagent_execution::{
    LoadQueue, QueueRegistry, QueueStatisticsSnapshot, WorkerSnapshot,
};
use loadagent_logging::{init_logging_from_config, init_simple_tracing};
use serde::Serialize;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

mod cli;
mod demo;
mod plan;

use cli::{Cli, Commands, ConfigCommands};
use demo::demo_components;
use plan::QueuePlan;

/// What `loadagent run` prints once the queue has stopped
#[derive(Debug, Serialize)]
struct RunReport {
    queue: String,
    caller: String,
    pattern: String,
    state: QueueState,
    statistics: QueueStatisticsSnapshot,
    workers: Vec<WorkerSnapshot>,
}

impl RunReport {
    fn from_queue(queue: &LoadQueue) -> Self {
        Self {
            queue: queue.name().to_string(),
            caller: queue.caller().to_string(),
            pattern: queue.description().to_string(),
            state: queue.state(),
            statistics: queue.statistics().snapshot(),
            workers: queue.worker_snapshots(),
        }
    }
}

fn load_config(config_path: Option<&PathBuf>) -> Result<AgentConfig> {
    let loader = ConfigLoader::new();
    match config_path {
        Some(path) => loader
            .from_file(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => loader
            .from_env()
            .context("Failed to load configuration from environment"),
    }
}

fn init_logging(config: &AgentConfig, log_level: Option<&String>) -> Result<()> {
    match log_level {
        Some(level) => init_simple_tracing(level),
        None => init_logging_from_config(&config.logging),
    }
}

fn build_registry(config: &AgentConfig) -> Result<QueueRegistry> {
    QueueRegistry::from_config(Arc::new(demo_components()), config.queues.clone())
        .context("Invalid queue configuration")
}

async fn run_plan(config: &AgentConfig, plan_path: &Path) -> Result<()> {
    let plan = QueuePlan::from_file(plan_path)?;
    let registry = build_registry(config)?;

    let queue = registry
        .schedule_actions(plan.into_submission())
        .context("Failed to schedule queue")?;
    drive_queue(&registry, &queue, async {
        if tokio::signal::ctrl_c().await.is_err() {
            std::future::pending::<()>().await;
        }
    })
    .await?;

    let report = RunReport::from_queue(&queue);
    println!("{}", serde_json::to_string_pretty(&report)?);

    if report.state != QueueState::Finished {
        anyhow::bail!("Queue '{}' ended {}", report.queue, report.state);
    }
    if !report.statistics.passed {
        anyhow::bail!(
            "Queue '{}' did not reach its pass rate of {}%",
            report.queue,
            report.statistics.pass_rate
        );
    }
    Ok(())
}

/// Start `queue` and wait for it to stop. Every queue is cancelled when
/// `interrupt` resolves first, blocking patterns included.
async fn drive_queue(
    registry: &QueueRegistry,
    queue: &Arc<LoadQueue>,
    interrupt: impl Future<Output = ()>,
) -> Result<()> {
    queue.start().context("Failed to start queue")?;

    tokio::select! {
        _ = queue.wait_until_finished() => {}
        _ = interrupt => {
            warn!(queue = %queue.name(), "Interrupted, cancelling load queue");
            registry.cancel_all_queues().await;
        }
    }
    Ok(())
}

fn validate_plan(config: &AgentConfig, plan_path: &Path) -> Result<()> {
    let plan = QueuePlan::from_file(plan_path)?;
    let registry = build_registry(config)?;
    let queue = registry
        .schedule_actions(plan.into_submission())
        .context("Queue plan cannot be scheduled")?;

    println!("Queue plan is valid");
    println!("  queue:   {}", queue.name());
    println!("  pattern: {}", queue.description());
    Ok(())
}

fn handle_config_validate(config_file: &PathBuf) -> Result<()> {
    info!("Validating configuration file: {:?}", config_file);

    if !config_file.exists() {
        return Err(anyhow::anyhow!(
            "Configuration file not found: {:?}",
            config_file
        ));
    }

    load_config(Some(config_file))?;
    println!("Configuration file is valid");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_ref())?;
    init_logging(&config, cli.log_level.as_ref())?;
    debug!("Load agent CLI starting");

    match &cli.command {
        Commands::Run { plan } => run_plan(&config, plan).await,
        Commands::Validate { plan } => validate_plan(&config, plan),
        Commands::Config { config_cmd } => match config_cmd {
            ConfigCommands::Sample => {
                print!("{}", AgentConfig::generate_sample());
                Ok(())
            }
            ConfigCommands::Validate { config_file } => handle_config_validate(config_file),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::demo::DEMO_COMPONENT;
    use loadagent_config::QueueConfig;
    use loadagent_core::ActionRequest;
    use loadagent_execution::{ExecutionPattern, QueueSubmission};
    use std::time::Duration;

    fn registry() -> QueueRegistry {
        QueueRegistry::new(Arc::new(demo_components()), QueueConfig::default())
    }

    #[tokio::test]
    async fn test_interrupt_cancels_blocking_queue() {
        let registry = registry();
        let queue = registry
            .schedule_actions(QueueSubmission::new(
                "endless",
                vec![ActionRequest::new(DEMO_COMPONENT, "sleep").with_literal(20)],
                ExecutionPattern::all_at_once(2, 1).infinite().blocking(true),
            ))
            .unwrap();

        drive_queue(&registry, &queue, tokio::time::sleep(Duration::from_millis(100)))
            .await
            .unwrap();

        assert_eq!(queue.state(), QueueState::Canceled);
        assert!(queue.statistics().invocations_succeeded() > 0);
    }

    #[tokio::test]
    async fn test_finished_queue_reports_without_interrupt() {
        let registry = registry();
        let queue = registry
            .schedule_actions(QueueSubmission::new(
                "short",
                vec![ActionRequest::new(DEMO_COMPONENT, "echo").with_literal("hi")],
                ExecutionPattern::all_at_once(2, 3),
            ))
            .unwrap();

        drive_queue(&registry, &queue, std::future::pending())
            .await
            .unwrap();

        let report = RunReport::from_queue(&queue);
        assert_eq!(report.state, QueueState::Finished);
        assert_eq!(report.statistics.invocations_succeeded, 6);
        assert_eq!(report.workers.len(), 2);
        assert!(drive_queue(&registry, &queue, std::future::pending()).await.is_err());
    }
}
