//! Shared test harness: a fully wired kernel (store + broker + registries
//! + controller) against a real Postgres instance. Every test using this
//! module skips itself (prints a notice and returns) when
//! `GEOSTAGE_TEST_DATABASE_URL` is unset, the same pattern as
//! `infra-postgres`'s own repository tests.

use std::sync::Arc;
use std::time::Duration;

use geostage_core::application::registry::{FieldSpec, FieldType, JobDefinition, ParameterSchema};
use geostage_core::application::worker::{shutdown_channel, Executor, ShutdownSender};
use geostage_core::application::{Controller, Dispatcher, JobRegistry, RetryPolicy, TaskHandlerRegistry};
use geostage_core::domain::Job;
use geostage_core::port::id_provider::Sha256IdProvider;
use geostage_core::port::preflight::mocks::AlwaysPass;
use geostage_core::port::task_handler::TaskHandler;
use geostage_core::port::time_provider::SystemTimeProvider;
use geostage_core::port::{BrokerPort, JobRepository, Queue, TaskRepository, TimeProvider};
use geostage_infra_broker::PgmqBroker;
use geostage_infra_postgres::{
    create_pool, run_migrations, PgApiRequestRepository, PgJobRepository, PgTaskRepository,
};
use sqlx::PgPool;

pub fn test_database_url() -> Option<String> {
    std::env::var("GEOSTAGE_TEST_DATABASE_URL").ok()
}

pub struct Harness {
    pub controller: Arc<Controller>,
    pub job_repo: Arc<PgJobRepository>,
    pub task_repo: Arc<PgTaskRepository>,
    pub broker: Arc<PgmqBroker>,
    pub time_provider: Arc<dyn TimeProvider>,
    pub retry_policy: Arc<RetryPolicy>,
    pub pool: PgPool,
    shutdown_tx: ShutdownSender,
    runners: Vec<tokio::task::JoinHandle<()>>,
}

impl Harness {
    /// Stops every spawned executor/dispatcher loop and waits briefly for
    /// them to exit. Call at the end of every test that uses [`spin_up`].
    pub async fn shutdown(self) {
        self.shutdown_tx.shutdown();
        for handle in self.runners {
            let _ = tokio::time::timeout(Duration::from_secs(2), handle).await;
        }
    }
}

/// Builds a harness with one registered job type, wired against the real
/// store/broker. `registry` and `handlers` are provided by the caller so
/// each test can describe its own stage plan and task handlers.
pub async fn setup(registry: JobRegistry, handlers: TaskHandlerRegistry) -> Option<Harness> {
    let database_url = test_database_url()?;

    let pool = create_pool(&database_url).await.expect("pool creation");
    run_migrations(&pool).await.expect("migrations");

    let broker = Arc::new(
        PgmqBroker::new(&database_url)
            .await
            .expect("broker init"),
    );

    let time_provider: Arc<dyn TimeProvider> = Arc::new(SystemTimeProvider);
    let id_provider = Arc::new(Sha256IdProvider);
    let job_repo = Arc::new(PgJobRepository::new(pool.clone(), time_provider.clone()));
    let task_repo = Arc::new(PgTaskRepository::new(pool.clone(), time_provider.clone()));
    let api_request_repo = Arc::new(PgApiRequestRepository::new(pool.clone()));
    let job_registry = Arc::new(registry);
    let handler_registry = Arc::new(handlers);
    let retry_policy = Arc::new(RetryPolicy::new(time_provider.clone(), 10, 3));

    let controller = Arc::new(Controller::new(
        job_repo.clone() as Arc<dyn JobRepository>,
        task_repo.clone() as Arc<dyn TaskRepository>,
        api_request_repo,
        broker.clone() as Arc<dyn BrokerPort>,
        id_provider,
        time_provider.clone(),
        job_registry,
    ));

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    let mut runners = Vec::new();

    let executor = Executor::new(
        task_repo.clone() as Arc<dyn TaskRepository>,
        broker.clone() as Arc<dyn BrokerPort>,
        handler_registry,
        retry_policy.clone(),
        time_provider.clone(),
    );
    let executor_shutdown = shutdown_rx.clone();
    runners.push(tokio::spawn(async move {
        let _ = executor.run(executor_shutdown).await;
    }));

    let jobs_dispatcher = Dispatcher::new(
        broker.clone() as Arc<dyn BrokerPort>,
        controller.clone(),
        Queue::Jobs,
    );
    let jobs_shutdown = shutdown_rx.clone();
    runners.push(tokio::spawn(async move {
        let _ = jobs_dispatcher.run(jobs_shutdown).await;
    }));

    let stage_done_dispatcher = Dispatcher::new(
        broker.clone() as Arc<dyn BrokerPort>,
        controller.clone(),
        Queue::StageDone,
    );
    let stage_done_shutdown = shutdown_rx.clone();
    runners.push(tokio::spawn(async move {
        let _ = stage_done_dispatcher.run(stage_done_shutdown).await;
    }));

    Some(Harness {
        controller,
        job_repo,
        task_repo,
        broker,
        time_provider,
        retry_policy,
        pool,
        shutdown_tx,
        runners,
    })
}

/// Polls `find_by_id` until the job reaches a terminal status or the
/// timeout elapses, returning the last observed row.
pub async fn wait_for_terminal(job_repo: &PgJobRepository, job_id: &str, timeout: Duration) -> Job {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Some(job) = job_repo.find_by_id(&job_id.to_string()).await.unwrap() {
            if job.status.is_terminal() {
                return job;
            }
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("job {job_id} did not reach a terminal status within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

/// A single-stage job type: `plan_stage` fans out `n` identical tasks of
/// `task_type`, `finalize` just echoes the stage results back.
pub fn single_stage_definition(job_type: &str, task_type: &str, n: i32) -> JobDefinition {
    let task_type = task_type.to_string();
    JobDefinition {
        job_type: job_type.to_string(),
        parameters_schema: ParameterSchema::new(vec![FieldSpec::required(
            "dataset_id",
            FieldType::String,
        )]),
        total_stages: 1,
        resource_validators: vec![Arc::new(AlwaysPass)],
        plan_stage: Arc::new(move |job, _stage| {
            (0..n)
                .map(|i| geostage_core::domain::TaskPlan {
                    task_type: task_type.clone(),
                    task_index: i,
                    parameters: job.parameters.clone(),
                })
                .collect()
        }),
        finalize: Arc::new(|_job, stage_results| stage_results.clone()),
        sanitize_error: Arc::new(|raw| raw.to_string()),
    }
}

pub fn register_handler(task_type: &str, handler: Arc<dyn TaskHandler>) -> TaskHandlerRegistry {
    let mut registry = TaskHandlerRegistry::new();
    registry.register(task_type, handler);
    registry
}
