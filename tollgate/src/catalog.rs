//! Resource catalog: maps a resource identifier to its origin, price, and
//! owner.
//!
//! Resources are immutable once published and looked up read-only per
//! request. The catalog itself is behind the [`ResourceCatalog`] trait; the
//! gateway usually serves from a [`StaticCatalog`] loaded at startup from
//! configuration or from a remote registry via [`load_catalog`].

use alloy_primitives::Address;
use async_trait::async_trait;
use futures_util::StreamExt;
use futures_util::stream;
use std::collections::HashMap;
use url::Url;

/// How many registry entries [`load_catalog`] reads concurrently.
const REGISTRY_FAN_OUT: usize = 8;

/// A published pay-per-use resource.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Stable resource identifier (also the registry service id).
    pub id: String,
    /// Address of the resource owner (payment recipient).
    pub owner: Address,
    /// Origin URL requests are proxied to after settlement.
    pub origin_url: Url,
    /// Price per call in atomic token units.
    pub price_per_call: u64,
    /// Token asset the price is denominated in.
    pub asset: Address,
    /// Service category (e.g., `"api"`, `"inference"`).
    pub service_type: String,
}

/// Read-only lookup of published resources.
pub trait ResourceCatalog: Send + Sync {
    /// Resolves a resource by id.
    fn resolve(&self, id: &str) -> Option<Resource>;
}

/// Catalog backed by a fixed in-memory map, built once at startup.
#[derive(Debug, Default)]
pub struct StaticCatalog {
    resources: HashMap<String, Resource>,
}

impl StaticCatalog {
    /// Builds a catalog from an iterator of resources.
    ///
    /// Later entries with a duplicate id replace earlier ones.
    pub fn new(resources: impl IntoIterator<Item = Resource>) -> Self {
        Self {
            resources: resources.into_iter().map(|r| (r.id.clone(), r)).collect(),
        }
    }

    /// Number of published resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Returns `true` if no resources are published.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceCatalog for StaticCatalog {
    fn resolve(&self, id: &str) -> Option<Resource> {
        self.resources.get(id).cloned()
    }
}

/// Errors reading from an external registry.
#[derive(Debug, Clone, thiserror::Error)]
pub enum RegistryError {
    /// The registry itself could not be reached or enumerated.
    #[error("registry unavailable: {0}")]
    Unavailable(String),
    /// One entry was present but could not be decoded into a [`Resource`].
    #[error("invalid registry entry: {0}")]
    InvalidEntry(String),
}

/// Read access to an external service registry.
#[async_trait]
pub trait RegistryReader: Send + Sync {
    /// Lists all published service ids.
    async fn list_ids(&self) -> Result<Vec<String>, RegistryError>;

    /// Fetches one service entry by id.
    async fn fetch(&self, id: &str) -> Result<Resource, RegistryError>;
}

/// Outcome of a registry load: the entries that resolved plus per-entry
/// failures. Failures are isolated, never dropped — a registry with one bad
/// entry still yields the rest.
#[derive(Debug, Default)]
pub struct CatalogLoad {
    /// Successfully loaded resources.
    pub resources: Vec<Resource>,
    /// Entries that failed, with the id and the reason.
    pub failures: Vec<(String, RegistryError)>,
}

/// Loads every registry entry with bounded concurrency.
///
/// At most [`REGISTRY_FAN_OUT`] fetches are in flight at a time. A failing
/// entry lands in [`CatalogLoad::failures`] without aborting the rest.
///
/// # Errors
///
/// Returns [`RegistryError::Unavailable`] only when the id enumeration
/// itself fails; individual entry failures are reported in the result.
pub async fn load_catalog<R: RegistryReader>(reader: &R) -> Result<CatalogLoad, RegistryError> {
    let ids = reader.list_ids().await?;
    let total = ids.len();

    let results: Vec<(String, Result<Resource, RegistryError>)> = stream::iter(ids)
        .map(|id| async move {
            let fetched = reader.fetch(&id).await;
            (id, fetched)
        })
        .buffer_unordered(REGISTRY_FAN_OUT)
        .collect()
        .await;

    let mut load = CatalogLoad::default();
    for (id, result) in results {
        match result {
            Ok(resource) => load.resources.push(resource),
            Err(err) => {
                tracing::warn!(service = %id, error = %err, "Skipping registry entry");
                load.failures.push((id, err));
            }
        }
    }
    tracing::info!(
        loaded = load.resources.len(),
        failed = load.failures.len(),
        total,
        "Loaded resource catalog from registry"
    );
    Ok(load)
}

/// Error deriving a display name from a service URI.
#[derive(Debug, Clone, thiserror::Error)]
pub enum NameParseError {
    /// The URI could not be parsed at all.
    #[error("unparseable service URI: {0}")]
    InvalidUri(String),
    /// The URI parsed but has no usable host or path segment.
    #[error("service URI has no usable name component")]
    NoNameComponent,
}

/// Derives a human-readable display name from a service URI.
///
/// Uses the last non-empty path segment, falling back to the host. This is
/// best-effort parsing made explicit: callers that want a silent fallback
/// use [`display_name_or_default`].
///
/// # Errors
///
/// Returns [`NameParseError`] when the URI is unparseable or carries no
/// name component.
pub fn derive_display_name(uri: &str) -> Result<String, NameParseError> {
    let parsed = Url::parse(uri).map_err(|e| NameParseError::InvalidUri(e.to_string()))?;
    if let Some(segments) = parsed.path_segments() {
        if let Some(last) = segments.filter(|s| !s.is_empty()).next_back() {
            return Ok(last.to_owned());
        }
    }
    parsed
        .host_str()
        .map(str::to_owned)
        .ok_or(NameParseError::NoNameComponent)
}

/// Display name with the defined fallback `service-<id>`.
#[must_use]
pub fn display_name_or_default(uri: &str, id: &str) -> String {
    derive_display_name(uri).unwrap_or_else(|err| {
        tracing::debug!(service = %id, error = %err, "Falling back to default display name");
        format!("service-{id}")
    })
}
