//! Registry data model

use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

/// One resource type and its relationships
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTypeDescriptor {
    pub name: String,

    /// Types whose instances must exist before this type is created
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Types whose attached instances must be released before this type is deleted
    #[serde(default)]
    pub blocked_by: Vec<String>,

    /// Instances are discovered and detached, never created or deleted
    #[serde(default)]
    pub attachment: bool,
}

impl ResourceTypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            depends_on: Vec::new(),
            blocked_by: Vec::new(),
            attachment: false,
        }
    }

    pub fn depends_on<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.depends_on.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn blocked_by<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.blocked_by.extend(types.into_iter().map(Into::into));
        self
    }

    pub fn attachment(mut self) -> Self {
        self.attachment = true;
        self
    }
}

/// Which gateway a topology talks to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ProviderConfig {
    /// Simulated provider persisted to a JSON file
    Memory { state: Option<PathBuf> },
    /// Amazon Web Services
    Aws {
        region: Option<String>,
        profile: Option<String>,
    },
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig::Memory { state: None }
    }
}

impl ProviderConfig {
    pub fn name(&self) -> &str {
        match self {
            ProviderConfig::Memory { .. } => "memory",
            ProviderConfig::Aws { .. } => "aws",
        }
    }
}

/// A resource declared inside a deployment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredResource {
    pub resource_type: String,
    pub name: String,

    /// Parent type -> parent name within the same deployment
    #[serde(default)]
    pub parents: BTreeMap<String, String>,

    /// Attributes passed to the gateway on create
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl DeclaredResource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
            parents: BTreeMap::new(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        self.parents.insert(resource_type.into(), name.into());
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A named scope of resources that is created or destroyed as a unit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    pub name: String,
    pub resources: Vec<DeclaredResource>,
}

impl Deployment {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            resources: Vec::new(),
        }
    }

    pub fn with_resource(mut self, resource: DeclaredResource) -> Self {
        self.resources.push(resource);
        self
    }

    pub fn get(&self, resource_type: &str, name: &str) -> Option<&DeclaredResource> {
        self.resources
            .iter()
            .find(|r| r.resource_type == resource_type && r.name == name)
    }
}

/// The resource descriptor registry plus the deployments of one topology
#[derive(Debug, Clone, Default)]
pub struct Registry {
    pub project: Option<String>,
    pub provider: ProviderConfig,
    types: Vec<ResourceTypeDescriptor>,
    index: HashMap<String, usize>,
    deployments: BTreeMap<String, Deployment>,
}

impl Registry {
    /// Build a validated registry from type descriptors in declaration order
    pub fn from_types(types: Vec<ResourceTypeDescriptor>) -> Result<Self> {
        let mut registry = Registry::default();
        for descriptor in types {
            registry.declare(descriptor)?;
        }
        registry.validate()?;
        Ok(registry)
    }

    /// Append a type; relationships are checked by [`Registry::validate`]
    pub fn declare(&mut self, descriptor: ResourceTypeDescriptor) -> Result<()> {
        if self.index.contains_key(&descriptor.name) {
            return Err(RegistryError::DuplicateType(descriptor.name));
        }
        self.index.insert(descriptor.name.clone(), self.types.len());
        self.types.push(descriptor);
        Ok(())
    }

    /// Add a deployment; checked by [`Registry::validate`]
    pub fn add_deployment(&mut self, deployment: Deployment) -> Result<()> {
        if self.deployments.contains_key(&deployment.name) {
            return Err(RegistryError::InvalidConfig(format!(
                "deployment '{}' is declared more than once",
                deployment.name
            )));
        }
        self.deployments.insert(deployment.name.clone(), deployment);
        Ok(())
    }

    pub fn with_deployment(mut self, deployment: Deployment) -> Result<Self> {
        self.add_deployment(deployment)?;
        self.validate()?;
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ResourceTypeDescriptor> {
        self.index.get(name).map(|&i| &self.types[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Declaration position of a type, used as the ordering tie-break
    pub fn order_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    /// Types in declaration order
    pub fn types(&self) -> &[ResourceTypeDescriptor] {
        &self.types
    }

    pub fn is_attachment(&self, name: &str) -> bool {
        self.get(name).is_some_and(|t| t.attachment)
    }

    /// Types that list `blocker` in their `blocked-by` set
    pub fn holders_of(&self, blocker: &str) -> Vec<&ResourceTypeDescriptor> {
        self.types
            .iter()
            .filter(|t| t.blocked_by.iter().any(|b| b == blocker))
            .collect()
    }

    pub fn deployment(&self, name: &str) -> Result<&Deployment> {
        self.deployments
            .get(name)
            .ok_or_else(|| RegistryError::DeploymentNotFound(name.to_string()))
    }

    pub fn deployments(&self) -> impl Iterator<Item = &Deployment> {
        self.deployments.values()
    }

    /// Check every reference in the registry and its deployments
    pub fn validate(&self) -> Result<()> {
        for descriptor in &self.types {
            for referenced in descriptor.depends_on.iter().chain(&descriptor.blocked_by) {
                if !self.contains(referenced) {
                    return Err(RegistryError::UndeclaredType {
                        type_name: referenced.clone(),
                        referenced_by: descriptor.name.clone(),
                    });
                }
            }
        }

        for deployment in self.deployments.values() {
            self.validate_deployment(deployment)?;
        }
        Ok(())
    }

    fn validate_deployment(&self, deployment: &Deployment) -> Result<()> {
        let mut seen = HashSet::new();
        for resource in &deployment.resources {
            let descriptor = self.get(&resource.resource_type).ok_or_else(|| {
                RegistryError::UndeclaredType {
                    type_name: resource.resource_type.clone(),
                    referenced_by: format!("deployment '{}'", deployment.name),
                }
            })?;

            if descriptor.attachment {
                return Err(RegistryError::InvalidConfig(format!(
                    "{} '{}' in deployment '{}': attachment types cannot be declared",
                    resource.resource_type, resource.name, deployment.name
                )));
            }

            if !seen.insert((&resource.resource_type, &resource.name)) {
                return Err(RegistryError::InvalidConfig(format!(
                    "{} '{}' is declared more than once in deployment '{}'",
                    resource.resource_type, resource.name, deployment.name
                )));
            }

            for (parent_type, parent_name) in &resource.parents {
                if !descriptor.depends_on.contains(parent_type) {
                    return Err(RegistryError::InvalidConfig(format!(
                        "{} '{}': parent type '{}' is not in depends-on of '{}'",
                        resource.resource_type, resource.name, parent_type, descriptor.name
                    )));
                }
                if deployment.get(parent_type, parent_name).is_none() {
                    return Err(RegistryError::InvalidConfig(format!(
                        "{} '{}': parent {} '{}' is not declared in deployment '{}'",
                        resource.resource_type,
                        resource.name,
                        parent_type,
                        parent_name,
                        deployment.name
                    )));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_registry() -> Registry {
        Registry::from_types(vec![
            ResourceTypeDescriptor::new("network"),
            ResourceTypeDescriptor::new("subnet").depends_on(["network"]),
            ResourceTypeDescriptor::new("security-group")
                .depends_on(["network"])
                .blocked_by(["network-interface"]),
            ResourceTypeDescriptor::new("network-interface")
                .depends_on(["security-group"])
                .attachment(),
        ])
        .unwrap()
    }

    #[test]
    fn test_declaration_order() {
        let registry = sample_registry();
        assert_eq!(registry.order_of("network"), Some(0));
        assert_eq!(registry.order_of("security-group"), Some(2));
        assert_eq!(registry.order_of("bucket"), None);
    }

    #[test]
    fn test_holders_of() {
        let registry = sample_registry();
        let holders: Vec<_> = registry
            .holders_of("network-interface")
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        assert_eq!(holders, vec!["security-group"]);
        assert!(registry.is_attachment("network-interface"));
    }

    #[test]
    fn test_undeclared_dependency_is_fatal() {
        let err = Registry::from_types(vec![
            ResourceTypeDescriptor::new("subnet").depends_on(["network"]),
        ])
        .unwrap_err();
        assert!(matches!(
            err,
            RegistryError::UndeclaredType { ref type_name, ref referenced_by }
                if type_name == "network" && referenced_by == "subnet"
        ));
    }

    #[test]
    fn test_undeclared_blocker_is_fatal() {
        let err = Registry::from_types(vec![
            ResourceTypeDescriptor::new("security-group").blocked_by(["network-interface"]),
        ])
        .unwrap_err();
        assert!(matches!(err, RegistryError::UndeclaredType { .. }));
    }

    #[test]
    fn test_duplicate_type() {
        let err = Registry::from_types(vec![
            ResourceTypeDescriptor::new("network"),
            ResourceTypeDescriptor::new("network"),
        ])
        .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateType(name) if name == "network"));
    }

    #[test]
    fn test_deployment_validation() {
        let deployment = Deployment::new("web")
            .with_resource(DeclaredResource::new("network", "main"))
            .with_resource(DeclaredResource::new("subnet", "a").with_parent("network", "main"));
        let registry = sample_registry().with_deployment(deployment).unwrap();
        assert_eq!(registry.deployment("web").unwrap().resources.len(), 2);
        assert!(matches!(
            registry.deployment("api"),
            Err(RegistryError::DeploymentNotFound(_))
        ));
    }

    #[test]
    fn test_deployment_rejects_attachment() {
        let deployment = Deployment::new("web")
            .with_resource(DeclaredResource::new("network-interface", "eni"));
        let err = sample_registry().with_deployment(deployment).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfig(_)));
    }

    #[test]
    fn test_deployment_rejects_unknown_parent() {
        let deployment = Deployment::new("web")
            .with_resource(DeclaredResource::new("subnet", "a").with_parent("network", "main"));
        let err = sample_registry().with_deployment(deployment).unwrap_err();
        assert!(matches!(err, RegistryError::InvalidConfig(_)));
    }

    #[test]
    fn test_deployment_rejects_undeclared_type() {
        let deployment =
            Deployment::new("web").with_resource(DeclaredResource::new("load-balancer", "lb"));
        let err = sample_registry().with_deployment(deployment).unwrap_err();
        assert!(matches!(err, RegistryError::UndeclaredType { .. }));
    }
}
