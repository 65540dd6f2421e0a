//! JSON-RPC Server
//!
//! Implements the JSON-RPC 2.0 server over TCP (localhost only).

use crate::handler::RpcHandler;
use crate::types::{MaintenanceRequest, StatsRequest, StatusRequest, SubmitRequest};
use geostage_core::application::{Controller, JobRegistry};
use geostage_core::port::{JobRepository, Maintenance};
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

// jsonrpsee doesn't support Unix sockets directly (hyper limitation);
// TCP on localhost is the secure alternative (no external access).
const DEFAULT_SOCKET_PATH: &str = "~/.geostage/geostage.sock";
const DEFAULT_RPC_HOST: &str = "127.0.0.1";
const DEFAULT_RPC_PORT: u16 = 9527;

pub struct RpcServerConfig {
    pub socket_path: PathBuf, // Reserved for future UDS support
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            socket_path: shellexpand::tilde(DEFAULT_SOCKET_PATH).into_owned().into(),
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<RpcHandler>,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        controller: Arc<Controller>,
        job_repo: Arc<dyn JobRepository>,
        registry: Arc<JobRegistry>,
        maintenance: Arc<dyn Maintenance>,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(RpcHandler::new(controller, job_repo, registry, maintenance)),
        }
    }

    /// Starts the JSON-RPC server, registering one `{job_type}.submit.v1`
    /// method per job type in the registry, plus the fixed
    /// `job.status.v1`/`admin.*.v1` surface (SPEC_FULL §6).
    pub async fn start(self) -> Result<ServerHandle, String> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        info!(
            host = %self.config.host,
            port = %self.config.port,
            "starting JSON-RPC server on TCP (localhost only)"
        );

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|e| format!("failed to build server on {addr}: {e}"))?;

        let mut module = RpcModule::new(());

        for job_type in self.handler.registered_job_types() {
            let method_name: &'static str =
                Box::leak(format!("{job_type}.submit.v1").into_boxed_str());
            let handler = self.handler.clone();
            let job_type = job_type.clone();
            module
                .register_async_method(method_name, move |params, _, _| {
                    let handler = handler.clone();
                    let job_type = job_type.clone();
                    async move {
                        let req: SubmitRequest = params.parse()?;
                        handler.submit(&job_type, req).await
                    }
                })
                .map_err(|e| e.to_string())?;
        }

        let handler = self.handler.clone();
        module
            .register_async_method("job.status.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatusRequest = params.parse()?;
                    handler.status(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.stats.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: StatsRequest = params.parse()?;
                    handler.stats(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        let handler = self.handler.clone();
        module
            .register_async_method("admin.maintenance.v1", move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: MaintenanceRequest = params.parse()?;
                    handler.maintenance(req).await
                }
            })
            .map_err(|e| e.to_string())?;

        info!("JSON-RPC server started successfully");

        let handle = server.start(module);
        Ok(handle)
    }
}
