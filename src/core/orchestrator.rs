use anyhow::Result;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::{scheduler, worker};
use crate::context::AppContext;
use crate::rpc::RpcServer;
use crate::web::WebServer;

/// Owns the long-lived tasks of the daemon: scheduler, worker, RPC server and
/// web server. All of them stop when the shutdown token is cancelled.
pub struct Orchestrator {
    ctx: AppContext,
    shutdown: CancellationToken,
}

impl Orchestrator {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx,
            shutdown: CancellationToken::new(),
        }
    }

    /// Run until Ctrl-C or until one of the servers fails.
    pub async fn start(&self) -> Result<()> {
        info!(
            rpc = %self.ctx.config.rpc_bind,
            http = %self.ctx.config.http_bind,
            "arkd starting"
        );

        let mut tasks = JoinSet::new();
        tasks.spawn(scheduler::run(self.ctx.clone(), self.shutdown.clone()));
        tasks.spawn(worker::run(self.ctx.clone(), self.shutdown.clone()));

        let rpc = RpcServer::new(self.ctx.clone(), self.ctx.config.rpc_bind);
        let shutdown = self.shutdown.clone();
        tasks.spawn(async move {
            if let Err(e) = rpc.start(shutdown.clone()).await {
                error!(error = %e, "RPC server failed");
                shutdown.cancel();
            }
        });

        let web = WebServer::new(self.ctx.clone(), self.ctx.config.http_bind);
        let shutdown = self.shutdown.clone();
        tasks.spawn(async move {
            if let Err(e) = web.start(shutdown.clone()).await {
                error!(error = %e, "Web server failed");
                shutdown.cancel();
            }
        });

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("Shutdown requested"),
            _ = self.shutdown.cancelled() => {}
        }
        self.shutdown.cancel();

        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Daemon task panicked");
            }
        }

        info!("arkd stopped");
        Ok(())
    }
}
