//! In-memory gateway
//!
//! A simulated provider that keeps resources in a map. It enforces the two
//! provider behaviours the lifecycle engine has to cope with: a resource
//! that is still referenced by another one cannot be deleted (`Conflict`),
//! and a protected resource is never deleted (`Protected`). Faults can be
//! scripted per operation and target, and every call is recorded.
//!
//! The state can be persisted to `.stackflow/memory-state.json` so that
//! successive CLI runs see each other's effects.

use crate::error::{CloudError, ErrorKind, GatewayError, GatewayResult, Result};
use crate::gateway::{CloudGateway, DiscoveredResource, Filter, Lifecycle, ResourceSpec};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::fs;
use tokio::sync::Mutex;

const STATE_VERSION: u32 = 1;

/// Gateway operation, used for fault injection and call accounting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Describe,
    Create,
    Delete,
    Detach,
}

/// One recorded gateway call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub operation: Operation,
    pub resource_type: String,
    /// Resource id for delete/detach, logical name for create, type for describe
    pub target: String,
}

/// A resource held by the memory gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemoryResource {
    pub id: String,
    pub resource_type: String,
    #[serde(default)]
    pub deployment: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parent_ids: BTreeMap<String, String>,
    #[serde(default)]
    pub attached_to: BTreeSet<String>,
    #[serde(default)]
    pub protected: bool,
    #[serde(default)]
    pub lifecycle: Lifecycle,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl MemoryResource {
    pub fn new(resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            deployment: None,
            name: None,
            parent_ids: BTreeMap::new(),
            attached_to: BTreeSet::new(),
            protected: false,
            lifecycle: Lifecycle::Active,
            attributes: BTreeMap::new(),
        }
    }

    pub fn in_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = Some(deployment.into());
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_parent(mut self, resource_type: impl Into<String>, id: impl Into<String>) -> Self {
        self.parent_ids.insert(resource_type.into(), id.into());
        self
    }

    pub fn attached_to(mut self, holder_id: impl Into<String>) -> Self {
        self.attached_to.insert(holder_id.into());
        self
    }

    pub fn protected(mut self) -> Self {
        self.protected = true;
        self
    }

    pub fn terminated(mut self) -> Self {
        self.lifecycle = Lifecycle::Terminated;
        self
    }

    fn is_live(&self) -> bool {
        self.lifecycle == Lifecycle::Active
    }

    /// Whether this resource holds a reference to `id`
    fn references(&self, id: &str) -> bool {
        self.parent_ids.values().any(|p| p == id) || self.attached_to.contains(id)
    }

    fn matches(&self, filter: &Filter) -> bool {
        if let Some(deployment) = &filter.deployment
            && self.deployment.as_ref() != Some(deployment)
        {
            return false;
        }
        if let Some(name) = &filter.name
            && self.name.as_ref() != Some(name)
        {
            return false;
        }
        if let Some(id) = &filter.id
            && &self.id != id
        {
            return false;
        }
        if let Some(holder) = &filter.attached_to
            && !self.attached_to.contains(holder)
        {
            return false;
        }
        true
    }

    fn to_discovered(&self) -> DiscoveredResource {
        DiscoveredResource {
            id: self.id.clone(),
            resource_type: self.resource_type.clone(),
            deployment: self.deployment.clone(),
            name: self.name.clone(),
            parent_ids: self.parent_ids.clone(),
            attached_to: self.attached_to.clone(),
            protected: self.protected,
            lifecycle: self.lifecycle,
        }
    }
}

/// Persisted form of the gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
struct MemoryState {
    version: u32,
    next_id: u64,
    resources: BTreeMap<String, MemoryResource>,
}

impl Default for MemoryState {
    fn default() -> Self {
        Self {
            version: STATE_VERSION,
            next_id: 1,
            resources: BTreeMap::new(),
        }
    }
}

#[derive(Debug)]
struct Fault {
    operation: Operation,
    target: String,
    kind: ErrorKind,
    remaining: u32,
}

#[derive(Debug, Default)]
struct Inner {
    state: MemoryState,
    faults: Vec<Fault>,
    calls: Vec<Call>,
}

impl Inner {
    /// Consume one scripted fault matching the operation and any of the targets
    fn take_fault(&mut self, operation: Operation, targets: &[&str]) -> Option<ErrorKind> {
        let index = self.faults.iter().position(|f| {
            f.operation == operation && f.remaining > 0 && targets.contains(&f.target.as_str())
        })?;
        let fault = &mut self.faults[index];
        fault.remaining -= 1;
        let kind = fault.kind;
        if fault.remaining == 0 {
            self.faults.remove(index);
        }
        Some(kind)
    }

    fn record(&mut self, operation: Operation, resource_type: &str, target: &str) {
        self.calls.push(Call {
            operation,
            resource_type: resource_type.to_string(),
            target: target.to_string(),
        });
    }
}

/// Simulated provider backed by a map
#[derive(Debug, Default)]
pub struct MemoryGateway {
    inner: Mutex<Inner>,
    path: Option<PathBuf>,
    latency: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
}

/// Decrements the in-flight counter even when the call future is dropped
struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` before it takes effect
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Open a gateway persisted at `path`, starting empty if the file is missing
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let state = if path.exists() {
            let content = fs::read_to_string(&path).await?;
            let state: MemoryState = serde_json::from_str(&content)?;
            if state.version > STATE_VERSION {
                return Err(CloudError::StateError(format!(
                    "State file version {} is newer than supported version {}",
                    state.version, STATE_VERSION
                )));
            }
            tracing::debug!(
                path = %path.display(),
                resources = state.resources.len(),
                "Loaded memory gateway state"
            );
            state
        } else {
            tracing::debug!(path = %path.display(), "Memory state not found, starting empty");
            MemoryState::default()
        };

        Ok(Self {
            inner: Mutex::new(Inner {
                state,
                ..Default::default()
            }),
            path: Some(path),
            ..Default::default()
        })
    }

    /// Write the state back to the file it was opened from
    pub async fn save(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        if let Some(dir) = path.parent()
            && !dir.as_os_str().is_empty()
        {
            fs::create_dir_all(dir).await?;
        }

        let content = {
            let inner = self.inner.lock().await;
            serde_json::to_string_pretty(&inner.state)?
        };

        let backup = path.with_extension("json.backup");
        if path.exists() {
            if backup.exists() {
                fs::remove_file(&backup).await?;
            }
            fs::rename(path, &backup).await?;
        }
        fs::write(path, content).await?;

        tracing::debug!(path = %path.display(), "Saved memory gateway state");
        Ok(())
    }

    /// Add a resource as if it had been created out of band
    pub async fn insert(&self, resource: MemoryResource) {
        let mut inner = self.inner.lock().await;
        inner.state.resources.insert(resource.id.clone(), resource);
    }

    /// Make the next `times` calls of `operation` on `target` fail with `kind`.
    ///
    /// `target` is matched against the resource id, the logical name used on
    /// create, and the resource type.
    pub async fn inject(
        &self,
        operation: Operation,
        target: impl Into<String>,
        kind: ErrorKind,
        times: u32,
    ) {
        let mut inner = self.inner.lock().await;
        inner.faults.push(Fault {
            operation,
            target: target.into(),
            kind,
            remaining: times,
        });
    }

    /// Number of calls of `operation` made so far
    pub async fn calls(&self, operation: Operation) -> usize {
        let inner = self.inner.lock().await;
        inner.calls.iter().filter(|c| c.operation == operation).count()
    }

    /// All calls made so far, in order
    pub async fn call_log(&self) -> Vec<Call> {
        self.inner.lock().await.calls.clone()
    }

    /// Whether a live resource with this id exists
    pub async fn contains(&self, id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.state.resources.get(id).is_some_and(MemoryResource::is_live)
    }

    /// Snapshot of every resource
    pub async fn resources(&self) -> Vec<MemoryResource> {
        let inner = self.inner.lock().await;
        inner.state.resources.values().cloned().collect()
    }

    /// Id of the live resource with the given type and logical name
    pub async fn find(&self, resource_type: &str, name: &str) -> Option<String> {
        let inner = self.inner.lock().await;
        inner
            .state
            .resources
            .values()
            .find(|r| r.is_live() && r.resource_type == resource_type && r.name.as_deref() == Some(name))
            .map(|r| r.id.clone())
    }

    /// Highest number of calls that were in flight at the same time
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn enter(&self) -> InFlight<'_> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        let guard = InFlight(&self.in_flight);
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        guard
    }
}

fn injected(kind: ErrorKind, operation: Operation, target: &str) -> GatewayError {
    GatewayError::new(kind, format!("injected {kind} on {operation:?} {target}"))
}

#[async_trait]
impl CloudGateway for MemoryGateway {
    fn name(&self) -> &str {
        "memory"
    }

    async fn describe(
        &self,
        resource_type: &str,
        filter: &Filter,
    ) -> GatewayResult<Vec<DiscoveredResource>> {
        let _in_flight = self.enter().await;
        let mut inner = self.inner.lock().await;
        inner.record(Operation::Describe, resource_type, resource_type);
        if let Some(kind) = inner.take_fault(Operation::Describe, &[resource_type]) {
            return Err(injected(kind, Operation::Describe, resource_type));
        }

        Ok(inner
            .state
            .resources
            .values()
            .filter(|r| r.resource_type == resource_type && r.matches(filter))
            .map(MemoryResource::to_discovered)
            .collect())
    }

    async fn create(
        &self,
        resource_type: &str,
        spec: &ResourceSpec,
        parent_ids: &BTreeMap<String, String>,
    ) -> GatewayResult<String> {
        let _in_flight = self.enter().await;
        let mut inner = self.inner.lock().await;
        inner.record(Operation::Create, resource_type, &spec.name);
        if let Some(kind) = inner.take_fault(Operation::Create, &[&spec.name, resource_type]) {
            return Err(injected(kind, Operation::Create, &spec.name));
        }

        let duplicate = inner.state.resources.values().any(|r| {
            r.is_live()
                && r.resource_type == resource_type
                && r.deployment.as_deref() == Some(spec.deployment.as_str())
                && r.name.as_deref() == Some(spec.name.as_str())
        });
        if duplicate {
            return Err(GatewayError::conflict(format!(
                "{resource_type} '{}' already exists",
                spec.name
            )));
        }

        for (parent_type, parent_id) in parent_ids {
            let live = inner
                .state
                .resources
                .get(parent_id)
                .is_some_and(|p| p.is_live() && &p.resource_type == parent_type);
            if !live {
                return Err(GatewayError::validation(format!(
                    "parent {parent_type} '{parent_id}' does not exist"
                )));
            }
        }

        let id = format!("{resource_type}-{:04}", inner.state.next_id);
        inner.state.next_id += 1;

        let mut resource = MemoryResource::new(resource_type, id.clone())
            .in_deployment(spec.deployment.clone())
            .named(spec.name.clone());
        resource.parent_ids = parent_ids.clone();
        resource.attributes = spec.attributes.clone();
        inner.state.resources.insert(id.clone(), resource);

        tracing::debug!(resource_type, id = %id, "Created");
        Ok(id)
    }

    async fn delete(&self, resource_type: &str, id: &str) -> GatewayResult<()> {
        let _in_flight = self.enter().await;
        let mut inner = self.inner.lock().await;
        inner.record(Operation::Delete, resource_type, id);
        if let Some(kind) = inner.take_fault(Operation::Delete, &[id, resource_type]) {
            return Err(injected(kind, Operation::Delete, id));
        }

        match inner.state.resources.get(id) {
            Some(r) if r.is_live() && r.resource_type == resource_type => {
                if r.protected {
                    return Err(GatewayError::protected(format!("{id} is protected")));
                }
            }
            _ => return Err(GatewayError::not_found(format!("{resource_type} '{id}' not found"))),
        }

        if let Some(holder) = inner
            .state
            .resources
            .values()
            .find(|r| r.is_live() && r.id != id && r.references(id))
        {
            return Err(GatewayError::conflict(format!(
                "{id} is in use by {} '{}'",
                holder.resource_type, holder.id
            )));
        }

        inner.state.resources.remove(id);
        tracing::debug!(resource_type, id, "Deleted");
        Ok(())
    }

    async fn detach(
        &self,
        resource_type: &str,
        id: &str,
        from_parent_id: &str,
    ) -> GatewayResult<()> {
        let _in_flight = self.enter().await;
        let mut inner = self.inner.lock().await;
        inner.record(Operation::Detach, resource_type, id);
        if let Some(kind) = inner.take_fault(Operation::Detach, &[id, resource_type]) {
            return Err(injected(kind, Operation::Detach, id));
        }

        let resource = match inner.state.resources.get_mut(id) {
            Some(r) if r.is_live() && r.resource_type == resource_type => r,
            _ => return Err(GatewayError::not_found(format!("{resource_type} '{id}' not found"))),
        };

        let was_attached = resource.attached_to.remove(from_parent_id);
        let before = resource.parent_ids.len();
        resource.parent_ids.retain(|_, p| p != from_parent_id);
        if !was_attached && resource.parent_ids.len() == before {
            return Err(GatewayError::not_found(format!(
                "{id} is not attached to {from_parent_id}"
            )));
        }

        tracing::debug!(resource_type, id, from = from_parent_id, "Detached");
        Ok(())
    }
}
