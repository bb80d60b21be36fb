// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
//!
//! Integration registry — lifecycle of per-integration MCP servers.
//!
//! Each enabled and authenticated integration gets one in-process MCP
//! server whose tool set is built by the [`IntegrationStarter`] registered
//! for the integration's `type`.  The registry is provider-agnostic: it
//! never interprets credentials, it only wires starters to the serving
//! path.
//!
//! Per-session filtered servers are created on demand for the capability
//! composer and are NOT recorded here — their lifetime belongs to the
//! requesting session's cancellation token.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use agento_claude::McpServerDescriptor;
use agento_config::Integration;

use crate::http::serve_toolset;
use crate::toolset::{FilteredToolSet, McpToolSet};

/// Builds the tool set for one integration instance.
///
/// Implementations live with the provider code (calendar, email, ...) and
/// are injected per integration `type`, keeping the registry independent of
/// any provider.
#[async_trait]
pub trait IntegrationStarter: Send + Sync {
    async fn start(&self, integration: &Integration) -> anyhow::Result<Arc<dyn McpToolSet>>;
}

/// Read access to integration records, injected so the registry can re-read
/// configuration on [`IntegrationRegistry::reload`].
#[async_trait]
pub trait IntegrationSource: Send + Sync {
    async fn get(&self, id: &str) -> anyhow::Result<Option<Integration>>;
    async fn list(&self) -> anyhow::Result<Vec<Integration>>;
}

struct RunningIntegration {
    descriptor: McpServerDescriptor,
    toolset: Arc<dyn McpToolSet>,
    cancel: CancellationToken,
}

/// Process-wide registry of running integration servers, keyed by
/// integration id.
pub struct IntegrationRegistry {
    source: Arc<dyn IntegrationSource>,
    starters: HashMap<String, Arc<dyn IntegrationStarter>>,
    running: RwLock<HashMap<String, RunningIntegration>>,
    /// Parent of every per-integration server token; firing it stops them
    /// all at shutdown.
    root: CancellationToken,
}

impl IntegrationRegistry {
    pub fn new(
        source: Arc<dyn IntegrationSource>,
        starters: HashMap<String, Arc<dyn IntegrationStarter>>,
    ) -> Self {
        Self {
            source,
            starters,
            running: RwLock::new(HashMap::new()),
            root: CancellationToken::new(),
        }
    }

    /// Start servers for every enabled + authenticated integration.
    /// One integration failing to start never aborts the others.
    pub async fn start_all(&self) {
        let integrations = match self.source.list().await {
            Ok(list) => list,
            Err(e) => {
                warn!("could not list integrations at startup: {e}");
                return;
            }
        };
        for integration in integrations {
            if !integration.enabled || !integration.is_authenticated() {
                continue;
            }
            if let Err(e) = self.start_one(&integration).await {
                warn!(id = %integration.id, "integration server failed to start: {e}");
            }
        }
    }

    async fn start_one(&self, integration: &Integration) -> anyhow::Result<()> {
        let Some(starter) = self.starters.get(&integration.kind) else {
            anyhow::bail!("no starter registered for type {:?}", integration.kind);
        };
        let toolset = starter.start(integration).await?;
        let cancel = self.root.child_token();
        let binding = serve_toolset(toolset.clone(), cancel.clone()).await?;
        info!(id = %integration.id, url = %binding.url, "integration server started");

        let mut running = self.running.write().await;
        // Replace any previous instance for this id.
        if let Some(old) = running.insert(
            integration.id.clone(),
            RunningIntegration {
                descriptor: binding.descriptor(),
                toolset,
                cancel,
            },
        ) {
            old.cancel.cancel();
        }
        Ok(())
    }

    /// Stop, re-read the record, and start again.  A deleted or disabled
    /// integration simply ends up stopped (no-op restart).
    pub async fn reload(&self, id: &str) -> anyhow::Result<()> {
        self.stop(id).await;
        match self.source.get(id).await? {
            Some(integration) if integration.enabled && integration.is_authenticated() => {
                self.start_one(&integration).await
            }
            _ => Ok(()),
        }
    }

    /// Cancel and remove one integration server.
    pub async fn stop(&self, id: &str) {
        let mut running = self.running.write().await;
        if let Some(entry) = running.remove(id) {
            entry.cancel.cancel();
            info!(id, "integration server stopped");
        }
    }

    /// Stop everything (shutdown path).
    pub async fn stop_all(&self) {
        self.root.cancel();
        self.running.write().await.clear();
    }

    /// Descriptor of a running integration server.
    pub async fn descriptor(&self, id: &str) -> Option<McpServerDescriptor> {
        self.running.read().await.get(id).map(|r| r.descriptor.clone())
    }

    /// Snapshot of every running server's descriptor, keyed by integration
    /// id.
    pub async fn all_server_configs(&self) -> BTreeMap<String, McpServerDescriptor> {
        self.running
            .read()
            .await
            .iter()
            .map(|(id, r)| (id.clone(), r.descriptor.clone()))
            .collect()
    }

    /// Start a per-session server exposing only `tools` of the given
    /// integration.  Lifetime is owned by `cancel` (the caller's context);
    /// the server is not recorded in the registry.
    ///
    /// Returns `None` when the integration is not running and cannot be
    /// started — the capability composer skips such servers silently.
    pub async fn start_filtered_server(
        &self,
        id: &str,
        tools: BTreeSet<String>,
        cancel: CancellationToken,
    ) -> Option<McpServerDescriptor> {
        let toolset = {
            let running = self.running.read().await;
            running.get(id).map(|r| r.toolset.clone())
        };
        let toolset = match toolset {
            Some(toolset) => toolset,
            // Not running (e.g. started after boot): build a one-off tool
            // set from the stored record without registering it.
            None => {
                let integration = self.source.get(id).await.ok().flatten()?;
                if !integration.enabled || !integration.is_authenticated() {
                    return None;
                }
                let starter = self.starters.get(&integration.kind)?;
                match starter.start(&integration).await {
                    Ok(toolset) => toolset,
                    Err(e) => {
                        warn!(id, "filtered server start failed: {e}");
                        return None;
                    }
                }
            }
        };

        let filtered = Arc::new(FilteredToolSet::new(toolset, tools));
        match serve_toolset(filtered, cancel).await {
            Ok(binding) => Some(binding.descriptor()),
            Err(e) => {
                warn!(id, "filtered server failed to bind: {e}");
                None
            }
        }
    }
}

// ─── Unit tests ───────────────────────────────────────────────────────────────
