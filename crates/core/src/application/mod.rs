// Application Layer - orchestration logic over the domain and ports

pub mod controller;
pub mod dispatcher;
pub mod janitor;
pub mod maintenance;
pub mod registry;
pub mod retry;
pub mod worker;

pub use controller::{ApiRequestKey, Controller, SubmitOutcome};
pub use dispatcher::Dispatcher;
pub use janitor::{Janitor, JanitorConfig, JanitorReport};
pub use maintenance::MaintenanceScheduler;
pub use registry::{
    FieldSpec, FieldType, JobDefinition, JobRegistry, ParameterSchema, TaskHandlerRegistry,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use worker::{shutdown_channel, Executor, ShutdownSender, ShutdownToken};
