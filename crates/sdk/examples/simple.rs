//! Simple SDK Example
//!
//! Demonstrates basic usage of the Geostage SDK.
//!
//! # Usage
//!
//! 1. Start the daemon:
//!    ```bash
//!    cargo run --package geostage-daemon
//!    ```
//!
//! 2. Run this example:
//!    ```bash
//!    cargo run --package geostage-sdk --example simple
//!    ```

use geostage_sdk::{GeostageClient, SubmitRequest};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("Geostage SDK - Simple Example");
    println!("================================\n");

    // 1. Connect to daemon
    println!("1. Connecting to daemon...");
    let client = GeostageClient::connect("http://127.0.0.1:9527").await?;
    println!("   ✓ Connected\n");

    // 2. Submit a job
    println!("2. Submitting a job...");
    let submit_response = client
        .submit(
            "ingest_vector",
            SubmitRequest {
                parameters: json!({"dataset_id": "parcels-2024"}),
                ..Default::default()
            },
        )
        .await?;

    println!("   ✓ Job submitted:");
    println!("     - ID: {}", submit_response.job_id);
    println!("     - Already existed: {}", submit_response.already_existed);
    println!("     - Monitor URI: {}\n", submit_response.monitor_uri);

    // 3. Wait a bit for processing
    println!("3. Waiting 2 seconds...");
    tokio::time::sleep(tokio::time::Duration::from_secs(2)).await;
    println!("   ✓ Done\n");

    // 4. Poll status
    println!("4. Fetching job status...");
    let status = client.status(&submit_response.job_id).await?;

    println!("   ✓ Status retrieved:");
    println!("     - Status: {}", status.status);
    println!("     - Stage: {}/{}", status.stage, status.total_stages);
    if let Some(error) = &status.error_details {
        println!("     - Error: {}", error);
    }

    println!("\n✓ Example completed successfully!");

    Ok(())
}
