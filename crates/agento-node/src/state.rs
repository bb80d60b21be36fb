// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: Apache-2.0
use std::sync::Arc;

use async_trait::async_trait;

use agento_config::{Integration, ProfileStore};
use agento_core::AgentRunner;
use agento_mcp::{IntegrationRegistry, IntegrationSource};
use agento_scheduler::{EventBus, Scheduler};
use agento_sessions::SessionIndex;
use agento_store::Store;

use crate::live::LiveRegistry;

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<Store>,
    pub runner: Arc<AgentRunner>,
    pub scheduler: Scheduler,
    pub sessions: Arc<SessionIndex>,
    pub integrations: Arc<IntegrationRegistry>,
    pub profiles: ProfileStore,
    pub live: Arc<LiveRegistry>,
    pub bus: EventBus,
}

/// Adapter that lets the integration registry read records from the store
/// without the mcp crate depending on the persistence layer.
pub struct StoreIntegrationSource(pub Arc<Store>);

#[async_trait]
impl IntegrationSource for StoreIntegrationSource {
    async fn get(&self, id: &str) -> anyhow::Result<Option<Integration>> {
        match self.0.get_integration(id).await {
            Ok(integration) => Ok(Some(integration)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn list(&self) -> anyhow::Result<Vec<Integration>> {
        Ok(self.0.list_integrations().await?)
    }
}
