//! Resource getters
//!
//! The dependency resolver looks resources up through the narrow
//! [`ResourceGetter`] capability, one instantiation per resource kind. This
//! keeps the resolver agnostic to whether a lookup is served from a local
//! reflector cache, a live API call, or an in-memory fixture.
//!
//! Implementations shared between concurrent resolutions must themselves be
//! safe for concurrent reads; the resolver adds no locking of its own.

use crate::crd::{ReportDataSource, ReportGenerationQuery, Report, ScheduledReport};
use crate::error::{OperatorError, Result};
use k8s_openapi::NamespaceResourceScope;
use kube::api::Api;
use kube::runtime::reflector::{ObjectRef, Store};
use kube::{Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tracing::trace;

/// Looks up a resource of kind `K` by namespace and name
pub trait ResourceGetter<K> {
    /// Fetch the named resource, or fail with `NotFound` (or any other error
    /// the backing store produces, which is propagated unchanged)
    fn get(&self, namespace: &str, name: &str) -> Result<Arc<K>>;
}

impl<K, F> ResourceGetter<K> for F
where
    F: Fn(&str, &str) -> Result<Arc<K>>,
{
    fn get(&self, namespace: &str, name: &str) -> Result<Arc<K>> {
        self(namespace, name)
    }
}

/// Kind name of a CRD type, used in error messages
fn kind_of<K: Resource<DynamicType = ()>>() -> String {
    K::kind(&()).to_string()
}

/// One getter per resource kind, borrowed for the duration of a resolution
#[derive(Clone, Copy)]
pub struct Getters<'a> {
    /// ReportGenerationQuery lookups
    pub queries: &'a dyn ResourceGetter<ReportGenerationQuery>,
    /// ReportDataSource lookups
    pub data_sources: &'a dyn ResourceGetter<ReportDataSource>,
    /// Report lookups
    pub reports: &'a dyn ResourceGetter<Report>,
    /// ScheduledReport lookups
    pub scheduled_reports: &'a dyn ResourceGetter<ScheduledReport>,
}

/// In-memory getter keyed by (namespace, name)
#[derive(Debug, Clone)]
pub struct MemoryGetter<K> {
    objects: BTreeMap<(String, String), Arc<K>>,
}

impl<K> Default for MemoryGetter<K> {
    fn default() -> Self {
        Self {
            objects: BTreeMap::new(),
        }
    }
}

impl<K: Resource<DynamicType = ()>> MemoryGetter<K> {
    /// Create an empty getter
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a resource, replacing any previous one with the same key
    ///
    /// Resources without a namespace are stored under `default`.
    pub fn insert(&mut self, obj: K) -> Option<Arc<K>> {
        let namespace = obj.namespace().unwrap_or_else(|| "default".to_string());
        let name = obj.name_any();
        self.objects.insert((namespace, name), Arc::new(obj))
    }

    /// Number of stored resources
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// Whether no resources are stored
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    /// Iterate over stored resources in (namespace, name) order
    pub fn iter(&self) -> impl Iterator<Item = &Arc<K>> {
        self.objects.values()
    }
}

impl<K: Resource<DynamicType = ()>> FromIterator<K> for MemoryGetter<K> {
    fn from_iter<I: IntoIterator<Item = K>>(iter: I) -> Self {
        let mut getter = Self::new();
        for obj in iter {
            getter.insert(obj);
        }
        getter
    }
}

impl<K: Resource<DynamicType = ()>> ResourceGetter<K> for MemoryGetter<K> {
    fn get(&self, namespace: &str, name: &str) -> Result<Arc<K>> {
        self.objects
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
            .ok_or_else(|| OperatorError::not_found(kind_of::<K>(), namespace, name))
    }
}

/// Read-through getter backed by a reflector cache
pub struct StoreGetter<K>
where
    K: Resource<DynamicType = ()> + 'static,
{
    store: Store<K>,
}

impl<K> StoreGetter<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    /// Wrap a reflector store
    pub fn new(store: Store<K>) -> Self {
        Self { store }
    }
}

impl<K> ResourceGetter<K> for StoreGetter<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    fn get(&self, namespace: &str, name: &str) -> Result<Arc<K>> {
        let key = ObjectRef::<K>::new(name).within(namespace);
        trace!(kind = %kind_of::<K>(), namespace, name, "Reading from cache");
        self.store
            .get(&key)
            .ok_or_else(|| OperatorError::not_found(kind_of::<K>(), namespace, name))
    }
}

/// Getter that reads live from the Kubernetes API
///
/// Each lookup blocks the calling worker thread on the API request, so it
/// must be used from a multi-threaded tokio runtime.
pub struct ApiGetter<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> ApiGetter<K> {
    /// Create a getter using the given client
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }
}

/// Handle of the current runtime, if it allows blocking a worker thread
fn blocking_handle() -> Result<Handle> {
    let handle = Handle::try_current().map_err(|e| {
        OperatorError::InvalidConfig(format!("live lookups require a tokio runtime: {}", e))
    })?;
    match handle.runtime_flavor() {
        RuntimeFlavor::MultiThread => Ok(handle),
        flavor => Err(OperatorError::InvalidConfig(format!(
            "live lookups require a multi-threaded tokio runtime, found {:?}",
            flavor
        ))),
    }
}

impl<K> ResourceGetter<K> for ApiGetter<K>
where
    K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug,
{
    fn get(&self, namespace: &str, name: &str) -> Result<Arc<K>> {
        let handle = blocking_handle()?;
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);

        trace!(kind = %kind_of::<K>(), namespace, name, "Reading from API server");
        match tokio::task::block_in_place(|| handle.block_on(api.get(name))) {
            Ok(obj) => Ok(Arc::new(obj)),
            Err(kube::Error::Api(ae)) if ae.code == 404 => {
                Err(OperatorError::not_found(kind_of::<K>(), namespace, name))
            }
            Err(e) => Err(OperatorError::from(e)),
        }
    }
}
