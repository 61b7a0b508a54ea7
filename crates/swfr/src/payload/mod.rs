//! Inline or external storage of activity payloads.
//!
//! The coordinator caps the size of inputs and results, so payloads above
//! [`PayloadLimits::inline_limit`] are written to an external persister and
//! replaced by a reference object:
//!
//! ```text
//! {"uri": "memory://payloads/<key>"}
//! ```
//!
//! [`PayloadStore::load`] dereferences such objects through the persister
//! registered for the URI scheme and passes every other value through,
//! including `{"uri": ..}` objects naming a scheme nobody registered.
//! Two persisters ship with the crate:
//!
//! - [`MemoryPersister`]: process-local map, for tests and single-process setups
//! - [`PgPersister`]: PostgreSQL table (requires `postgres` feature)

mod memory;
#[cfg(feature = "postgres")]
mod postgres;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;
use url::Url;

pub use memory::MemoryPersister;
#[cfg(feature = "postgres")]
pub use postgres::PgPersister;

use crate::error::{Error, Result};

/// A backend that stores externalized payloads.
///
/// Saves must be idempotent: the same key may be written more than once
/// when a decision or activity task is retried.
#[async_trait]
pub trait PayloadPersister: Send + Sync + 'static {
    /// URI scheme this persister owns (e.g. `"memory"`, `"pg"`).
    fn scheme(&self) -> &str;

    /// Read the payload a reference points at.
    async fn load(&self, uri: &Url) -> Result<Value>;

    /// Store `payload` under `key` and return its URI.
    async fn save(&self, key: &str, payload: &Value) -> Result<Url>;
}

/// Size thresholds for payload routing, in bytes of serialized JSON.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PayloadLimits {
    /// Largest payload sent inline. Default: 32 KiB.
    pub inline_limit: usize,
    /// Largest payload accepted at all. Default: 400 KiB.
    pub external_limit: usize,
}

impl Default for PayloadLimits {
    fn default() -> Self {
        Self {
            inline_limit: 32 * 1024,
            external_limit: 400 * 1024,
        }
    }
}

/// Routes payloads between inline values and registered persisters.
///
/// Cheap to clone; persisters are shared.
///
/// # Example
///
/// ```
/// use swfr::payload::{MemoryPersister, PayloadStore};
///
/// let store = PayloadStore::new().with_external(MemoryPersister::new());
/// assert_eq!(store.external_scheme(), Some("memory"));
/// ```
#[derive(Clone, Default)]
pub struct PayloadStore {
    persisters: HashMap<String, Arc<dyn PayloadPersister>>,
    external: Option<String>,
    limits: PayloadLimits,
}

impl PayloadStore {
    /// A store with no persisters: payloads above the inline limit are rejected.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store externalizing into a fresh [`MemoryPersister`].
    pub fn in_memory() -> Self {
        Self::new().with_external(MemoryPersister::new())
    }

    /// Register a persister for loading references with its scheme.
    pub fn with_persister(mut self, persister: impl PayloadPersister) -> Self {
        self.register(Arc::new(persister));
        self
    }

    /// Register a persister and use it for saving oversized payloads.
    pub fn with_external(mut self, persister: impl PayloadPersister) -> Self {
        let scheme = self.register(Arc::new(persister));
        self.external = Some(scheme);
        self
    }

    /// Override the size thresholds.
    pub fn with_limits(mut self, limits: PayloadLimits) -> Self {
        self.limits = limits;
        self
    }

    fn register(&mut self, persister: Arc<dyn PayloadPersister>) -> String {
        let scheme = persister.scheme().to_owned();
        self.persisters.insert(scheme.clone(), persister);
        scheme
    }

    pub fn limits(&self) -> PayloadLimits {
        self.limits
    }

    /// Scheme of the persister used for saving, if any.
    pub fn external_scheme(&self) -> Option<&str> {
        self.external.as_deref()
    }

    /// Dereference `payload` if it is a reference, otherwise return it as is.
    ///
    /// Only URIs whose scheme has a registered persister are references. An
    /// activity returning `{"uri": "s3://bucket/tile.tif"}` gets that value
    /// back untouched.
    pub async fn load(&self, payload: Value) -> Result<Value> {
        let Some((uri, persister)) = self.reference(&payload) else {
            return Ok(payload);
        };
        debug!(uri = %uri, "Loading external payload");
        persister.load(&uri).await
    }

    /// Returns `true` if [`load`](Self::load) would dereference `value`.
    pub fn is_reference(&self, value: &Value) -> bool {
        self.reference(value).is_some()
    }

    fn reference(&self, value: &Value) -> Option<(Url, &Arc<dyn PayloadPersister>)> {
        let uri = Url::parse(payload_uri(value)?).ok()?;
        let persister = self.persisters.get(uri.scheme())?;
        Some((uri, persister))
    }

    /// Return `payload` inline if small enough, otherwise store it and
    /// return a reference.
    pub async fn save(&self, key: &str, payload: Value) -> Result<Value> {
        let size = payload.to_string().len();
        if size <= self.limits.inline_limit {
            return Ok(payload);
        }
        if size > self.limits.external_limit {
            return Err(Error::PayloadTooLarge {
                key: key.to_owned(),
                size,
                limit: self.limits.external_limit,
            });
        }

        let persister = self
            .external
            .as_ref()
            .and_then(|scheme| self.persisters.get(scheme))
            .ok_or(Error::NoExternalPersister)?;
        let uri = persister.save(key, &payload).await?;
        debug!(key, size, uri = %uri, "Externalized payload");
        Ok(json!({ "uri": uri.as_str() }))
    }
}

impl std::fmt::Debug for PayloadStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut schemes: Vec<_> = self.persisters.keys().collect();
        schemes.sort();
        f.debug_struct("PayloadStore")
            .field("persisters", &schemes)
            .field("external", &self.external)
            .field("limits", &self.limits)
            .finish()
    }
}

/// The URI of a payload reference, if `value` is one.
///
/// A reference is an object whose only field is a string `uri`.
pub fn payload_uri(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) if map.len() == 1 => map.get("uri").and_then(Value::as_str),
        _ => None,
    }
}
