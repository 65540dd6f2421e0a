//! Geostage Task Engine - Main Entry Point
//! Composition root: wires the hexagonal core to its Postgres/pgmq
//! adapters and starts the control-plane dispatchers, task executor,
//! janitor, maintenance scheduler, and JSON-RPC server.

mod telemetry;

use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use geostage_api_rpc::{server::RpcServerConfig, RpcServer};
use geostage_core::application::registry::{FieldSpec, FieldType, JobDefinition, ParameterSchema};
use geostage_core::application::worker::{shutdown_channel, Executor};
use geostage_core::application::{
    Controller, Dispatcher, Janitor, JanitorConfig, JobRegistry, MaintenanceScheduler,
    RetryPolicy, TaskHandlerRegistry,
};
use geostage_core::domain::{Task, TaskOutcome, TaskPlan, TaskResultStatus};
use geostage_core::port::id_provider::Sha256IdProvider;
use geostage_core::port::preflight::mocks::AlwaysPass;
use geostage_core::port::task_handler::{HandlerContext, HandlerError, TaskHandler};
use geostage_core::port::time_provider::SystemTimeProvider;
use geostage_core::port::{MaintenanceConfig, Queue};
use geostage_infra_broker::PgmqBroker;
use geostage_infra_postgres::{
    create_pool, run_migrations, PgApiRequestRepository, PgJobRepository, PgMaintenance,
    PgTaskRepository,
};

const VERSION: &str = env!("CARGO_PKG_VERSION");
const DEFAULT_STORE_URL: &str = "postgres://localhost/geostage";
const DEFAULT_BROKER_URL: &str = "postgres://localhost/geostage";

/// Placeholder unit-of-work handler. Concrete task implementations are
/// out of scope for this kernel (spec §1) -- this demonstrates the
/// registration seam the daemon exposes, not a real geospatial operation.
struct NoopTaskHandler;

#[async_trait]
impl TaskHandler for NoopTaskHandler {
    async fn handle(&self, task: &Task, ctx: &HandlerContext) -> Result<TaskOutcome, HandlerError> {
        ctx.heartbeat();
        info!(task_id = %task.task_id, task_type = %task.task_type, "noop handler invoked");
        Ok(TaskOutcome {
            status: TaskResultStatus::Completed,
            result_data: Some(task.parameters.clone()),
            error_details: None,
            next_stage_params: None,
        })
    }
}

/// Registers the demonstration `ingest_vector` job type: two stages, one
/// `fetch_tile` task per stage (SPEC_FULL §6 "job_type -> {...}" shape).
fn build_job_registry() -> JobRegistry {
    let mut registry = JobRegistry::new();

    registry.register(JobDefinition {
        job_type: "ingest_vector".to_string(),
        parameters_schema: ParameterSchema::new(vec![FieldSpec::required(
            "dataset_id",
            FieldType::String,
        )]),
        total_stages: 2,
        resource_validators: vec![Arc::new(AlwaysPass)],
        plan_stage: Arc::new(|job, stage| {
            vec![TaskPlan {
                task_type: "fetch_tile".to_string(),
                task_index: 0,
                parameters: job.parameters.clone(),
            }]
            .into_iter()
            .map(|mut plan| {
                plan.parameters["stage"] = serde_json::json!(stage);
                plan
            })
            .collect()
        }),
        finalize: Arc::new(|_job, stage_results| stage_results.clone()),
        sanitize_error: Arc::new(|raw| raw.to_string()),
    });

    registry
}

fn build_handler_registry() -> TaskHandlerRegistry {
    let mut handlers = TaskHandlerRegistry::new();
    handlers.register("fetch_tile", Arc::new(NoopTaskHandler));
    handlers
}

#[tokio::main]
async fn main() -> Result<()> {
    let log_format = std::env::var("GEOSTAGE_LOG_FORMAT").unwrap_or_else(|_| "pretty".to_string());

    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("geostage=info"))
        .expect("failed to create env filter");

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().pretty())
                .init();
        }
    }

    info!("geostage task engine v{} starting...", VERSION);

    if let Err(e) = telemetry::init_telemetry() {
        tracing::warn!(error = ?e, "failed to initialize OpenTelemetry (continuing without it)");
    }

    // 1. Load configuration
    let store_url =
        std::env::var("GEOSTAGE_STORE_URL").unwrap_or_else(|_| DEFAULT_STORE_URL.to_string());
    let broker_url =
        std::env::var("GEOSTAGE_BROKER_URL").unwrap_or_else(|_| DEFAULT_BROKER_URL.to_string());
    let rpc_port: u16 = std::env::var("GEOSTAGE_RPC_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9527);
    let retry_budget: i32 = std::env::var("GEOSTAGE_RETRY_BUDGET_DEFAULT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(geostage_core::application::worker::constants::DEFAULT_RETRY_BUDGET);
    let retry_base_delay_ms: i64 = geostage_core::application::worker::constants::DEFAULT_RETRY_BASE_DELAY_MS;
    let heartbeat_timeout_ms: i64 = std::env::var("GEOSTAGE_HEARTBEAT_TIMEOUT_MS")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(geostage_core::application::worker::constants::DEFAULT_HEARTBEAT_TIMEOUT_MS);
    let janitor_interval_ms: i64 = std::env::var("GEOSTAGE_JANITOR_INTERVAL_SECS")
        .ok()
        .and_then(|s: String| s.parse::<i64>().ok())
        .map(|secs| secs * 1000)
        .unwrap_or(geostage_core::application::worker::constants::DEFAULT_JANITOR_INTERVAL_MS);

    info!(store_url = %store_url, "initializing store...");

    // 2. Database
    let pool = create_pool(&store_url)
        .await
        .map_err(|e| anyhow::anyhow!("store pool creation failed: {e}"))?;
    run_migrations(&pool)
        .await
        .map_err(|e| anyhow::anyhow!("migration failed: {e}"))?;

    // 3. Broker
    info!(broker_url = %broker_url, "initializing broker...");
    let broker = Arc::new(
        PgmqBroker::new(&broker_url)
            .await
            .map_err(|e| anyhow::anyhow!("broker init failed: {e}"))?,
    );

    // 4. DI wiring
    let time_provider = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(Sha256IdProvider);
    let job_repo = Arc::new(PgJobRepository::new(pool.clone(), time_provider.clone()));
    let task_repo = Arc::new(PgTaskRepository::new(pool.clone(), time_provider.clone()));
    let api_request_repo = Arc::new(PgApiRequestRepository::new(pool.clone()));
    let maintenance = Arc::new(PgMaintenance::new(pool.clone()));

    let job_registry = Arc::new(build_job_registry());
    let handler_registry = Arc::new(build_handler_registry());

    let retry_policy = Arc::new(RetryPolicy::new(
        time_provider.clone(),
        retry_base_delay_ms,
        retry_budget,
    ));

    let controller = Arc::new(Controller::new(
        job_repo.clone(),
        task_repo.clone(),
        api_request_repo,
        broker.clone(),
        id_provider,
        time_provider.clone(),
        job_registry.clone(),
    ));

    // 5. Startup reconciliation sweep (replaces crash recovery -- the
    // janitor's sweep is idempotent and covers the same orphaned-state
    // cases a dedicated recovery pass would).
    info!("running startup reconciliation sweep...");
    let janitor_config = JanitorConfig {
        interval_ms: janitor_interval_ms,
        heartbeat_timeout_ms,
        ..JanitorConfig::default()
    };
    let janitor = Janitor::new(
        job_repo.clone(),
        task_repo.clone(),
        broker.clone(),
        controller.clone(),
        retry_policy.clone(),
        time_provider.clone(),
        janitor_config,
    );

    match janitor.sweep_once().await {
        Ok(report) => info!(?report, "startup reconciliation complete"),
        Err(e) => tracing::error!(error = ?e, "startup reconciliation failed"),
    }

    // 6. JSON-RPC server
    info!("starting JSON-RPC server...");
    let rpc_config = RpcServerConfig {
        port: rpc_port,
        ..Default::default()
    };
    let rpc_server = RpcServer::new(
        rpc_config,
        controller.clone(),
        job_repo.clone(),
        job_registry,
        maintenance.clone(),
    );
    let rpc_handle = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {e}"))?;

    // 7. Executor + dispatchers
    info!("starting executor and dispatchers...");
    let (shutdown_tx, shutdown_rx) = shutdown_channel();

    let executor = Executor::new(
        task_repo.clone(),
        broker.clone(),
        handler_registry,
        retry_policy.clone(),
        time_provider.clone(),
    );
    let executor_shutdown = shutdown_rx.clone();
    let executor_handle = tokio::spawn(async move {
        if let Err(e) = executor.run(executor_shutdown).await {
            tracing::error!(error = ?e, "executor failed");
        }
    });

    let jobs_dispatcher = Dispatcher::new(broker.clone(), controller.clone(), Queue::Jobs);
    let jobs_shutdown = shutdown_rx.clone();
    let jobs_dispatcher_handle = tokio::spawn(async move {
        if let Err(e) = jobs_dispatcher.run(jobs_shutdown).await {
            tracing::error!(error = ?e, "jobs dispatcher failed");
        }
    });

    let stage_done_dispatcher =
        Dispatcher::new(broker.clone(), controller.clone(), Queue::StageDone);
    let stage_done_shutdown = shutdown_rx.clone();
    let stage_done_dispatcher_handle = tokio::spawn(async move {
        if let Err(e) = stage_done_dispatcher.run(stage_done_shutdown).await {
            tracing::error!(error = ?e, "stage-done dispatcher failed");
        }
    });

    // 8. Janitor periodic loop
    info!("starting janitor...");
    tokio::spawn(async move {
        janitor.run().await;
    });

    // 9. Maintenance scheduler
    info!("starting maintenance scheduler...");
    let maintenance_scheduler = MaintenanceScheduler::new(maintenance, MaintenanceConfig::default(), 24);
    tokio::spawn(async move {
        maintenance_scheduler.run().await;
    });

    info!("system ready. waiting for jobs...");
    info!("press Ctrl+C to shutdown");

    // 10. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;

    info!("shutdown signal received, exiting gracefully...");

    shutdown_tx.shutdown();
    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {e}"))?;

    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), executor_handle).await;
    let _ = tokio::time::timeout(std::time::Duration::from_secs(5), jobs_dispatcher_handle).await;
    let _ = tokio::time::timeout(
        std::time::Duration::from_secs(5),
        stage_done_dispatcher_handle,
    )
    .await;

    info!("shutdown complete.");

    Ok(())
}
