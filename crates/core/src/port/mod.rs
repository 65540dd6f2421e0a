// Port Layer - Interfaces for external dependencies

pub mod api_request_repository;
pub mod broker;
pub mod id_provider;
pub mod job_repository;
pub mod maintenance;
pub mod preflight;
pub mod task_handler;
pub mod task_repository;
pub mod time_provider;

// Re-exports
pub use api_request_repository::ApiRequestRepository;
pub use broker::{BrokerMessage, BrokerPort, Delivery, Queue};
pub use id_provider::{IdProvider, Sha256IdProvider};
pub use job_repository::{JobRepository, StageAdvanceOutcome};
pub use maintenance::{Maintenance, MaintenanceConfig, MaintenanceStats};
pub use preflight::PreflightValidator;
pub use task_handler::{HandlerContext, HandlerError, TaskHandler};
pub use task_repository::{CompleteOutcome, TaskRepository};
pub use time_provider::TimeProvider;
