//! Process-local payload persister.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use url::Url;

use super::PayloadPersister;
use crate::error::{Error, Result};

/// Keeps payloads in memory under `memory://payloads/<key>`.
///
/// Clones share the same map, so a decider and an activity worker in one
/// process see each other's payloads.
#[derive(Debug, Clone, Default)]
pub struct MemoryPersister {
    payloads: Arc<RwLock<HashMap<String, Value>>>,
}

impl MemoryPersister {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored payloads.
    pub async fn len(&self) -> usize {
        self.payloads.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.payloads.read().await.is_empty()
    }
}

#[async_trait]
impl PayloadPersister for MemoryPersister {
    fn scheme(&self) -> &str {
        "memory"
    }

    async fn load(&self, uri: &Url) -> Result<Value> {
        let key = uri.path().trim_start_matches('/');
        self.payloads
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| Error::PayloadNotFound(uri.to_string()))
    }

    async fn save(&self, key: &str, payload: &Value) -> Result<Url> {
        let uri = Url::parse(&format!("memory://payloads/{key}"))?;
        self.payloads
            .write()
            .await
            .insert(key.to_owned(), payload.clone());
        Ok(uri)
    }
}
