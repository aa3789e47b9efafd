//! JSON-RPC 2.0 command server.
//!
//! - `protocol`: request/response/notification types and error codes
//! - `transport`: TCP listener with newline-delimited JSON framing
//! - `methods`: method dispatcher over [`crate::service::Service`]
//! - `client`: client used by the CLI
//!
//! Connected clients also receive `status_update` and `job_updated`
//! notifications as the daemon state changes.

pub mod client;
pub mod methods;
pub mod protocol;
mod transport;

use std::net::SocketAddr;

use tokio_util::sync::CancellationToken;

use crate::context::AppContext;
use transport::Transport;

pub use client::{ClientError, RpcClient};
pub use methods::MethodHandler;
pub use protocol::{Notification, Request, Response, RpcError};

pub struct RpcServer {
    transport: Transport,
}

impl RpcServer {
    pub fn new(ctx: AppContext, bind_addr: SocketAddr) -> Self {
        let handler = MethodHandler::new(ctx);
        Self {
            transport: Transport::new(bind_addr, handler),
        }
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn start(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        self.transport.listen(shutdown).await
    }
}
