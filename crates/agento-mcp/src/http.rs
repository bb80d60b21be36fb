// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Loopback streamable-HTTP serving for in-process MCP servers.
//!
//! Every server binds an ephemeral port on 127.0.0.1 and lives until its
//! [`CancellationToken`] fires.  The subprocess reaches it through the
//! returned [`McpServerDescriptor`].

use std::net::SocketAddr;
use std::sync::Arc;

use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use agento_claude::McpServerDescriptor;

use crate::server::ToolSetServer;
use crate::toolset::McpToolSet;

/// A served in-process MCP endpoint.
#[derive(Debug, Clone)]
pub struct ServerBinding {
    pub addr: SocketAddr,
    pub url: String,
}

impl ServerBinding {
    /// Descriptor handed to the subprocess via `--mcp-config`.
    pub fn descriptor(&self) -> McpServerDescriptor {
        McpServerDescriptor::Http {
            url: self.url.clone(),
        }
    }
}

/// Serve `toolset` over streamable HTTP on a fresh loopback port.
///
/// The listening task shuts down when `cancel` fires; callers own the token
/// (per-session servers hand over a child token of the requesting context).
pub async fn serve_toolset(
    toolset: Arc<dyn McpToolSet>,
    cancel: CancellationToken,
) -> anyhow::Result<ServerBinding> {
    let handler = ToolSetServer::new(toolset);
    let service = StreamableHttpService::new(
        move || Ok(handler.clone()),
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig::default(),
    );

    let router = axum::Router::new().nest_service("/mcp", service);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let url = format!("http://{addr}/mcp");

    debug!(%addr, "mcp server listening");

    tokio::spawn(async move {
        let shutdown = cancel.cancelled_owned();
        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown)
            .await
        {
            debug!("mcp server terminated: {e}");
        }
    });

    Ok(ServerBinding { addr, url })
}

// ─── Unit tests ───────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::toolset::tests::EchoToolSet;

    #[tokio::test]
    async fn binds_a_loopback_port_and_stops_on_cancel() {
        let cancel = CancellationToken::new();
        let binding = serve_toolset(Arc::new(EchoToolSet), cancel.clone())
            .await
            .unwrap();
        assert!(binding.url.starts_with("http://127.0.0.1:"));
        assert!(binding.url.ends_with("/mcp"));

        // The port is really bound while the token is live.
        assert!(tokio::net::TcpStream::connect(binding.addr).await.is_ok());

        cancel.cancel();
        // Give the graceful shutdown a moment, then the port must refuse.
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        assert!(tokio::net::TcpStream::connect(binding.addr).await.is_err());
    }

    #[tokio::test]
    async fn descriptor_is_streamable_http() {
        let cancel = CancellationToken::new();
        let binding = serve_toolset(Arc::new(EchoToolSet), cancel.clone())
            .await
            .unwrap();
        let McpServerDescriptor::Http { url } = binding.descriptor() else {
            panic!("expected http descriptor");
        };
        assert_eq!(url, binding.url);
        cancel.cancel();
    }

    #[tokio::test]
    async fn two_servers_get_distinct_ports() {
        let cancel = CancellationToken::new();
        let a = serve_toolset(Arc::new(EchoToolSet), cancel.clone())
            .await
            .unwrap();
        let b = serve_toolset(Arc::new(EchoToolSet), cancel.clone())
            .await
            .unwrap();
        assert_ne!(a.addr, b.addr);
        cancel.cancel();
    }
}
