//! Geostage CLI - command-line interface for the task engine daemon.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tabled::{Table, Tabled};

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:9527";

#[derive(Parser)]
#[command(name = "geostage")]
#[command(about = "Geostage task engine CLI", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// RPC server URL
    #[arg(long, env = "GEOSTAGE_RPC_URL", default_value = DEFAULT_RPC_URL)]
    rpc_url: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a new job
    Submit {
        /// Job type (e.g. ingest_vector)
        #[arg(short, long)]
        job_type: String,

        /// Parameters as a JSON object string
        #[arg(short, long)]
        parameters: String,

        /// External dataset identifier for request-level idempotency.
        /// Requires --resource-id, --version-id and --data-type.
        #[arg(long)]
        dataset_id: Option<String>,

        /// External resource identifier for request-level idempotency.
        #[arg(long)]
        resource_id: Option<String>,

        /// External version identifier for request-level idempotency.
        #[arg(long)]
        version_id: Option<String>,

        /// Data type recorded alongside the idempotency record.
        #[arg(long)]
        data_type: Option<String>,
    },

    /// Look up a job's current state
    Status {
        /// Job ID
        job_id: String,
    },

    /// Show system status
    Stats,

    /// Run maintenance operations
    Maintenance {
        /// Force an ANALYZE even if the fragmentation threshold isn't hit
        #[arg(long)]
        force_analyze: bool,
    },
}

#[derive(Serialize)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    params: serde_json::Value,
    id: u64,
}

#[derive(Deserialize)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[allow(dead_code)]
    id: u64,
    result: Option<serde_json::Value>,
    error: Option<JsonRpcError>,
}

#[derive(Deserialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

#[derive(Deserialize, Tabled)]
struct SubmitResult {
    job_id: String,
    already_existed: bool,
    monitor_uri: String,
}

async fn call_rpc(url: &str, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
    let request = JsonRpcRequest {
        jsonrpc: "2.0".to_string(),
        method: method.to_string(),
        params,
        id: 1,
    };

    let client = reqwest::Client::new();
    let response: JsonRpcResponse = client
        .post(url)
        .json(&request)
        .send()
        .await
        .context("Failed to connect to daemon")?
        .json()
        .await
        .context("Failed to parse response")?;

    if let Some(error) = response.error {
        anyhow::bail!("RPC error ({}): {}", error.code, error.message);
    }

    response
        .result
        .ok_or_else(|| anyhow::anyhow!("No result in response"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Submit {
            job_type,
            parameters,
            dataset_id,
            resource_id,
            version_id,
            data_type,
        } => {
            let parameters_json: serde_json::Value =
                serde_json::from_str(&parameters).context("Invalid JSON parameters")?;

            let mut params = json!({ "parameters": parameters_json });
            let params_obj = params.as_object_mut().expect("object literal");
            if let Some(dataset_id) = dataset_id {
                params_obj.insert("dataset_id".to_string(), json!(dataset_id));
            }
            if let Some(resource_id) = resource_id {
                params_obj.insert("resource_id".to_string(), json!(resource_id));
            }
            if let Some(version_id) = version_id {
                params_obj.insert("version_id".to_string(), json!(version_id));
            }
            if let Some(data_type) = data_type {
                params_obj.insert("data_type".to_string(), json!(data_type));
            }

            let result = call_rpc(&cli.rpc_url, &format!("{job_type}.submit.v1"), params).await?;
            let submit_result: SubmitResult = serde_json::from_value(result)?;

            if submit_result.already_existed {
                println!("{}", "= Job already existed (idempotent submit)".yellow().bold());
            } else {
                println!("{}", "✓ Job submitted".green().bold());
            }
            println!();

            let table = Table::new(vec![submit_result]).to_string();
            println!("{}", table);
        }

        Commands::Status { job_id } => {
            let params = json!({ "job_id": job_id });

            let result = call_rpc(&cli.rpc_url, "job.status.v1", params).await?;

            println!("{}", format!("Job {}", job_id).cyan().bold());
            println!("  {} {}", "Type:".bold(), result["job_type"]);
            println!("  {} {}", "Status:".bold(), result["status"]);
            println!(
                "  {} {}/{}",
                "Stage:".bold(),
                result["stage"],
                result["total_stages"]
            );
            if let Some(error) = result["error_details"].as_str() {
                println!("  {} {}", "Error:".bold(), error.red());
            }
        }

        Commands::Stats => {
            println!("{}", "System Status".cyan().bold());
            println!();

            match call_rpc(&cli.rpc_url, "admin.stats.v1", json!({})).await {
                Ok(stats) => {
                    println!("  {} {}", "RPC URL:".bold(), cli.rpc_url);
                    println!("  {} {}", "Status:".bold(), "ONLINE".green());
                    println!();
                    println!("  {} {}", "Total Jobs:".bold(), stats["total_jobs"]);
                    println!("  {} {}", "Queued:".bold(), stats["queued_jobs"]);
                    println!("  {} {}", "Processing:".bold(), stats["processing_jobs"]);
                    println!("  {} {}", "Completed:".bold(), stats["completed_jobs"]);
                    println!("  {} {}", "Failed:".bold(), stats["failed_jobs"]);
                    println!(
                        "  {} {}",
                        "Completed w/ errors:".bold(),
                        stats["completed_with_errors_jobs"]
                    );
                    println!();
                    let db_mb =
                        stats["db_size_bytes"].as_i64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
                    println!("  {} {:.2} MB", "DB Size:".bold(), db_mb);
                    println!("  {} {} seconds", "Uptime:".bold(), stats["uptime_seconds"]);
                }
                Err(e) => {
                    println!("  {} {}", "Status:".bold(), "ERROR".red());
                    println!("  {} {}", "Error:".bold(), e);
                }
            }
        }

        Commands::Maintenance { force_analyze } => {
            println!("{}", "Running maintenance...".cyan().bold());
            println!();

            if force_analyze {
                println!("  {} Force ANALYZE enabled", "•".bold());
            }

            let params = json!({ "force_analyze": force_analyze });

            match call_rpc(&cli.rpc_url, "admin.maintenance.v1", params).await {
                Ok(result) => {
                    println!("  ✓ Maintenance completed");
                    println!();
                    if result["analyze_run"].as_bool().unwrap_or(false) {
                        println!("  {} ANALYZE executed", "✓".green());
                    } else {
                        println!("  ○ ANALYZE skipped (not needed)");
                    }
                    println!("  {} {} finished jobs deleted", "✓".green(), result["jobs_deleted"]);
                    println!(
                        "  {} {} janitor run records deleted",
                        "✓".green(),
                        result["janitor_runs_deleted"]
                    );
                    println!();
                    let size_before_mb =
                        result["db_size_before"].as_i64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
                    let size_after_mb =
                        result["db_size_after"].as_i64().unwrap_or(0) as f64 / (1024.0 * 1024.0);
                    println!(
                        "  {} {:.2} MB → {:.2} MB",
                        "DB Size:".bold(),
                        size_before_mb,
                        size_after_mb
                    );
                    let saved_mb = size_before_mb - size_after_mb;
                    if saved_mb > 0.0 {
                        println!("  {} {:.2} MB saved", "💾".bold(), saved_mb);
                    }
                }
                Err(e) => {
                    println!("  {} Maintenance failed: {}", "✗".red(), e);
                }
            }
        }
    }

    Ok(())
}
