//! Geostage SDK - Rust Client Library
//!
//! Provides a convenient client for interacting with the geospatial ETL
//! orchestration kernel's daemon.
//!
//! # Example
//!
//! ```no_run
//! use geostage_sdk::{GeostageClient, SubmitRequest};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Connect to daemon
//!     let client = GeostageClient::connect("http://127.0.0.1:9527").await?;
//!
//!     // Submit a job
//!     let response = client
//!         .submit("ingest_vector", SubmitRequest {
//!             parameters: json!({"dataset_id": "parcels-2024"}),
//!             ..Default::default()
//!         })
//!         .await?;
//!
//!     println!("Job submitted: {}", response.job_id);
//!
//!     Ok(())
//! }
//! ```

mod client;
mod error;
mod types;

pub use client::GeostageClient;
pub use error::{Result, SdkError};
pub use types::{
    MaintenanceRequest, MaintenanceResponse, StatsResponse, StatusRequest, StatusResponse,
    SubmitRequest, SubmitResponse,
};
