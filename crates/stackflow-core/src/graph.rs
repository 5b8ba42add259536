//! Resource graph
//!
//! The concrete instances of one deployment, keyed by [`InstanceKey`], with
//! adjacency derived from the registry on demand. The graph is created fresh
//! for every run and only the executor's scheduling loop mutates it.

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use stackflow_cloud::{DiscoveredResource, ErrorKind, Lifecycle, ResourceSpec};
use stackflow_registry::{Deployment, Registry};
use std::collections::{BTreeMap, BTreeSet};

/// Identity of an instance within a graph: `type/name` for declared
/// instances, `type/<provider-id>` for instances only the provider knows.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceKey(String);

impl InstanceKey {
    pub fn new(resource_type: &str, name: &str) -> Self {
        Self(format!("{resource_type}/{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for InstanceKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why an instance ended up `Skipped`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    /// Nothing to do; the instance already is where the run wants it
    AlreadyInGoalState,
    Protected,
    BlockedByDependencyFailure,
    Cancelled,
    /// The run stopped after a validation error elsewhere
    Aborted,
    DryRun,
}

impl SkipReason {
    /// Whether this skip makes the run `Partial`
    pub fn is_degrading(self) -> bool {
        !matches!(self, SkipReason::AlreadyInGoalState | SkipReason::DryRun)
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::AlreadyInGoalState => write!(f, "already-in-goal-state"),
            SkipReason::Protected => write!(f, "protected"),
            SkipReason::BlockedByDependencyFailure => write!(f, "blocked-by-dependency-failure"),
            SkipReason::Cancelled => write!(f, "cancelled"),
            SkipReason::Aborted => write!(f, "aborted"),
            SkipReason::DryRun => write!(f, "dry-run"),
        }
    }
}

/// Lifecycle state of an instance during a run
///
/// ```text
/// Discovered ─▶ Detaching ─▶ Creating/Deleting ─▶ Ready | Absent | Skipped | Failed
///                   └──────▶ Detached (attachments)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "kebab-case")]
pub enum InstanceState {
    Discovered,
    Detaching,
    Creating,
    Deleting,
    Ready,
    Absent,
    Detached,
    Skipped(SkipReason),
    Failed,
}

impl InstanceState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            InstanceState::Ready
                | InstanceState::Absent
                | InstanceState::Detached
                | InstanceState::Skipped(_)
                | InstanceState::Failed
        )
    }

    /// Failed, or skipped because something it needed failed
    pub fn is_failure(self) -> bool {
        matches!(
            self,
            InstanceState::Failed
                | InstanceState::Skipped(SkipReason::BlockedByDependencyFailure)
                | InstanceState::Skipped(SkipReason::Aborted)
                | InstanceState::Skipped(SkipReason::Cancelled)
        )
    }
}

impl std::fmt::Display for InstanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InstanceState::Discovered => write!(f, "discovered"),
            InstanceState::Detaching => write!(f, "detaching"),
            InstanceState::Creating => write!(f, "creating"),
            InstanceState::Deleting => write!(f, "deleting"),
            InstanceState::Ready => write!(f, "ready"),
            InstanceState::Absent => write!(f, "absent"),
            InstanceState::Detached => write!(f, "detached"),
            InstanceState::Skipped(_) => write!(f, "skipped"),
            InstanceState::Failed => write!(f, "failed"),
        }
    }
}

/// One concrete resource of the deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceInstance {
    pub key: InstanceKey,
    pub resource_type: String,

    /// Logical name, for declared instances
    pub name: Option<String>,

    /// Provider id, once known
    pub id: Option<String>,

    pub state: InstanceState,

    /// Parent type -> in-graph parent
    pub parents: BTreeMap<String, InstanceKey>,

    /// Parent type -> provider id, as reported by the provider
    pub parent_ids: BTreeMap<String, String>,

    /// Provider ids of the resources this one is attached to
    pub attached_ids: BTreeSet<String>,

    pub protected: bool,
    pub lifecycle: Lifecycle,
    pub attributes: BTreeMap<String, String>,
    pub declared: bool,

    pub last_error: Option<ErrorKind>,

    /// Human-readable detail of the last transition
    pub note: Option<String>,

    /// Retries spent on this instance
    pub retries: u32,
}

impl ResourceInstance {
    pub fn new(key: InstanceKey, resource_type: impl Into<String>) -> Self {
        Self {
            key,
            resource_type: resource_type.into(),
            name: None,
            id: None,
            state: InstanceState::Discovered,
            parents: BTreeMap::new(),
            parent_ids: BTreeMap::new(),
            attached_ids: BTreeSet::new(),
            protected: false,
            lifecycle: Lifecycle::Active,
            attributes: BTreeMap::new(),
            declared: false,
            last_error: None,
            note: None,
            retries: 0,
        }
    }

    /// Whether the provider currently holds a live resource for this instance
    pub fn exists(&self) -> bool {
        self.id.is_some() && self.lifecycle == Lifecycle::Active
    }

    /// Name shown to users: provider id when known, logical name otherwise
    pub fn display_id(&self) -> &str {
        self.id
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or(self.key.as_str())
    }

    pub fn spec(&self, deployment: &str) -> ResourceSpec {
        ResourceSpec {
            deployment: deployment.to_string(),
            name: self.name.clone().unwrap_or_else(|| self.key.to_string()),
            attributes: self.attributes.clone(),
        }
    }

    fn absorb(&mut self, found: DiscoveredResource) {
        self.id = Some(found.id);
        self.protected = found.protected;
        self.lifecycle = found.lifecycle;
        for (parent_type, parent_id) in found.parent_ids {
            self.parent_ids.entry(parent_type).or_insert(parent_id);
        }
        self.attached_ids.extend(found.attached_to);
        if self.name.is_none() {
            self.name = found.name;
        }
    }
}

/// Instances of one deployment
#[derive(Debug, Clone, Default)]
pub struct ResourceGraph {
    deployment: String,
    instances: BTreeMap<InstanceKey, ResourceInstance>,
}

impl ResourceGraph {
    pub fn new(deployment: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            instances: BTreeMap::new(),
        }
    }

    /// Graph of the instances a deployment declares, before any discovery
    pub fn from_deployment(deployment: &Deployment) -> Self {
        let mut graph = Self::new(deployment.name.clone());
        for declared in &deployment.resources {
            let key = InstanceKey::new(&declared.resource_type, &declared.name);
            let mut instance = ResourceInstance::new(key.clone(), declared.resource_type.clone());
            instance.name = Some(declared.name.clone());
            instance.attributes = declared.attributes.clone();
            instance.declared = true;
            instance.parents = declared
                .parents
                .iter()
                .map(|(t, n)| (t.clone(), InstanceKey::new(t, n)))
                .collect();
            graph.instances.insert(key, instance);
        }
        graph
    }

    pub fn deployment(&self) -> &str {
        &self.deployment
    }

    pub fn insert(&mut self, instance: ResourceInstance) {
        self.instances.insert(instance.key.clone(), instance);
    }

    pub fn get(&self, key: &InstanceKey) -> Option<&ResourceInstance> {
        self.instances.get(key)
    }

    pub fn get_mut(&mut self, key: &InstanceKey) -> Option<&mut ResourceInstance> {
        self.instances.get_mut(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceInstance> {
        self.instances.values()
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn of_type<'a>(&'a self, resource_type: &'a str) -> impl Iterator<Item = &'a ResourceInstance> {
        self.instances
            .values()
            .filter(move |i| i.resource_type == resource_type)
    }

    /// Key of the instance holding a provider id
    pub fn find_by_id(&self, id: &str) -> Option<&InstanceKey> {
        self.instances
            .values()
            .find(|i| i.id.as_deref() == Some(id))
            .map(|i| &i.key)
    }

    /// Merge a provider record into the graph and return its key
    ///
    /// A record matches a declared instance by deployment and name, or an
    /// existing instance by provider id; otherwise it becomes a new instance.
    pub fn merge_discovered(&mut self, found: DiscoveredResource) -> InstanceKey {
        let by_name = found
            .name
            .as_deref()
            .filter(|_| found.deployment.as_deref() == Some(self.deployment.as_str()))
            .map(|name| InstanceKey::new(&found.resource_type, name))
            .filter(|key| self.instances.contains_key(key));

        let key = by_name
            .or_else(|| self.find_by_id(&found.id).cloned())
            .unwrap_or_else(|| InstanceKey::new(&found.resource_type, &found.id));

        let instance = self
            .instances
            .entry(key.clone())
            .or_insert_with(|| ResourceInstance::new(key.clone(), found.resource_type.clone()));
        instance.absorb(found);
        key
    }

    /// Resolve provider-level parent links to in-graph keys, and pick the
    /// single instance of a dependency type as implicit parent.
    pub fn link(&mut self, registry: &Registry) -> Result<()> {
        let by_id: BTreeMap<String, InstanceKey> = self
            .instances
            .values()
            .filter_map(|i| i.id.clone().map(|id| (id, i.key.clone())))
            .collect();

        let mut by_type: BTreeMap<&str, Vec<InstanceKey>> = BTreeMap::new();
        for instance in self.instances.values() {
            by_type
                .entry(instance.resource_type.as_str())
                .or_default()
                .push(instance.key.clone());
        }

        let mut links: Vec<(InstanceKey, String, InstanceKey)> = Vec::new();
        for instance in self.instances.values() {
            let descriptor = registry
                .get(&instance.resource_type)
                .ok_or_else(|| CoreError::UnknownType(instance.resource_type.clone()))?;

            for dep_type in &descriptor.depends_on {
                if instance.parents.contains_key(dep_type) {
                    continue;
                }
                let parent = instance
                    .parent_ids
                    .get(dep_type)
                    .and_then(|id| by_id.get(id))
                    .cloned()
                    .or_else(|| match by_type.get(dep_type.as_str()) {
                        Some(only) if only.len() == 1 => Some(only[0].clone()),
                        _ => None,
                    });
                if let Some(parent) = parent {
                    links.push((instance.key.clone(), dep_type.clone(), parent));
                }
            }
        }

        for (key, parent_type, parent) in links {
            if let Some(instance) = self.instances.get_mut(&key) {
                instance.parents.insert(parent_type, parent);
            }
        }
        Ok(())
    }

    /// In-graph keys of the resources an attachment is attached to
    pub fn holders(&self, key: &InstanceKey) -> BTreeSet<InstanceKey> {
        let Some(instance) = self.instances.get(key) else {
            return BTreeSet::new();
        };
        instance
            .attached_ids
            .iter()
            .filter_map(|id| self.find_by_id(id).cloned())
            .collect()
    }

    /// For every instance, the instances that must precede it in creation
    /// order. Deletion order is the reverse.
    ///
    /// - `depends-on`: the explicit parent of that type if it is in the
    ///   graph, otherwise every instance of that type.
    /// - `blocked-by`: an instance of a blocking type follows the holders it
    ///   is attached to (every holder, if it records no attachment).
    pub fn dependencies(
        &self,
        registry: &Registry,
    ) -> Result<BTreeMap<InstanceKey, BTreeSet<InstanceKey>>> {
        let mut deps: BTreeMap<InstanceKey, BTreeSet<InstanceKey>> = self
            .instances
            .keys()
            .map(|k| (k.clone(), BTreeSet::new()))
            .collect();

        for instance in self.instances.values() {
            let descriptor = registry
                .get(&instance.resource_type)
                .ok_or_else(|| CoreError::UnknownType(instance.resource_type.clone()))?;

            let mut preds = BTreeSet::new();
            for dep_type in &descriptor.depends_on {
                match instance.parents.get(dep_type) {
                    Some(parent) if self.instances.contains_key(parent) => {
                        preds.insert(parent.clone());
                    }
                    _ => preds.extend(self.of_type(dep_type).map(|i| i.key.clone())),
                }
            }

            for holder in registry.holders_of(&instance.resource_type) {
                let attached: BTreeSet<InstanceKey> = self
                    .holders(&instance.key)
                    .into_iter()
                    .filter(|k| {
                        self.instances
                            .get(k)
                            .is_some_and(|h| h.resource_type == holder.name)
                    })
                    .collect();
                if attached.is_empty() && instance.attached_ids.is_empty() {
                    preds.extend(self.of_type(&holder.name).map(|i| i.key.clone()));
                } else {
                    preds.extend(attached);
                }
            }

            preds.remove(&instance.key);
            if let Some(entry) = deps.get_mut(&instance.key) {
                *entry = preds;
            }
        }

        Ok(deps)
    }
}
