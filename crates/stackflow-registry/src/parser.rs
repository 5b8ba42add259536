//! stack.kdl parser
//!
//! Parses the topology KDL into a validated [`Registry`].

use crate::error::{RegistryError, Result};
use crate::model::{DeclaredResource, Deployment, ProviderConfig, Registry, ResourceTypeDescriptor};
use kdl::{KdlDocument, KdlNode, KdlValue};
use std::path::{Path, PathBuf};

/// Parse a topology file into a [`Registry`]
pub fn parse_topology_file(path: &Path) -> Result<Registry> {
    let content = std::fs::read_to_string(path)?;
    parse_topology(&content)
}

/// Parse topology KDL into a [`Registry`]
pub fn parse_topology(content: &str) -> Result<Registry> {
    let doc: KdlDocument = content.parse()?;

    let mut registry = Registry::default();
    let mut deployments = Vec::new();

    for node in doc.nodes() {
        match node.name().value() {
            "project" => {
                registry.project = first_string(node);
            }
            "provider" => {
                registry.provider = parse_provider(node)?;
            }
            "resource-type" => {
                registry.declare(parse_resource_type(node)?)?;
            }
            "deployment" => {
                deployments.push(parse_deployment(node)?);
            }
            other => {
                tracing::debug!(node = other, "Ignoring unknown top-level node");
            }
        }
    }

    // Deployments may appear before the types they use
    for deployment in deployments {
        registry.add_deployment(deployment)?;
    }

    registry.validate()?;
    tracing::debug!(
        types = registry.types().len(),
        deployments = registry.deployments().count(),
        "Parsed topology"
    );
    Ok(registry)
}

fn first_string(node: &KdlNode) -> Option<String> {
    node.entries()
        .first()
        .and_then(|e| e.value().as_string())
        .map(|s| s.to_string())
}

/// Positional string arguments of a node
fn string_args(node: &KdlNode) -> Vec<String> {
    node.entries()
        .iter()
        .filter(|e| e.name().is_none())
        .filter_map(|e| e.value().as_string())
        .map(|s| s.to_string())
        .collect()
}

fn value_to_string(value: &KdlValue) -> Option<String> {
    match value {
        KdlValue::String(s) => Some(s.clone()),
        KdlValue::Integer(i) => Some(i.to_string()),
        KdlValue::Float(f) => Some(f.to_string()),
        KdlValue::Bool(b) => Some(b.to_string()),
        KdlValue::Null => None,
    }
}

fn parse_provider(node: &KdlNode) -> Result<ProviderConfig> {
    let kind = first_string(node).ok_or_else(|| {
        RegistryError::InvalidConfig("provider needs a name (\"aws\" or \"memory\")".to_string())
    })?;

    let setting = |key: &str| {
        node.children()
            .and_then(|children| children.get(key))
            .and_then(first_string)
    };

    match kind.as_str() {
        "memory" => Ok(ProviderConfig::Memory {
            state: setting("state").map(PathBuf::from),
        }),
        "aws" => Ok(ProviderConfig::Aws {
            region: setting("region"),
            profile: setting("profile"),
        }),
        other => Err(RegistryError::InvalidConfig(format!(
            "unknown provider '{other}'"
        ))),
    }
}

fn parse_resource_type(node: &KdlNode) -> Result<ResourceTypeDescriptor> {
    let name = first_string(node).ok_or_else(|| {
        RegistryError::InvalidConfig("resource-type needs a name".to_string())
    })?;

    let mut descriptor = ResourceTypeDescriptor::new(name);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "depends-on" => descriptor.depends_on.extend(string_args(child)),
                "blocked-by" => descriptor.blocked_by.extend(string_args(child)),
                "attachment" => {
                    // bare `attachment` or `attachment #true`
                    descriptor.attachment = child
                        .entries()
                        .first()
                        .and_then(|e| e.value().as_bool())
                        .unwrap_or(true);
                }
                other => {
                    return Err(RegistryError::InvalidConfig(format!(
                        "resource-type '{}': unknown setting '{}'",
                        descriptor.name, other
                    )));
                }
            }
        }
    }

    Ok(descriptor)
}

fn parse_deployment(node: &KdlNode) -> Result<Deployment> {
    let name = first_string(node)
        .ok_or_else(|| RegistryError::InvalidConfig("deployment needs a name".to_string()))?;

    let mut deployment = Deployment::new(name);

    if let Some(children) = node.children() {
        for child in children.nodes() {
            if child.name().value() == "resource" {
                deployment.resources.push(parse_resource(child, &deployment.name)?);
            }
        }
    }

    Ok(deployment)
}

/// `resource "<type>" "<name>" { parent "<type>" "<name>"; <attr> "<value>" }`
fn parse_resource(node: &KdlNode, deployment: &str) -> Result<DeclaredResource> {
    let args = string_args(node);
    let [resource_type, name] = args.as_slice() else {
        return Err(RegistryError::InvalidConfig(format!(
            "deployment '{deployment}': resource needs a type and a name"
        )));
    };

    let mut resource = DeclaredResource::new(resource_type.clone(), name.clone());

    if let Some(children) = node.children() {
        for child in children.nodes() {
            match child.name().value() {
                "parent" => {
                    let parent = string_args(child);
                    let [parent_type, parent_name] = parent.as_slice() else {
                        return Err(RegistryError::InvalidConfig(format!(
                            "{resource_type} '{name}': parent needs a type and a name"
                        )));
                    };
                    resource
                        .parents
                        .insert(parent_type.clone(), parent_name.clone());
                }
                key => {
                    let value = child
                        .entries()
                        .first()
                        .and_then(|e| value_to_string(e.value()))
                        .ok_or_else(|| {
                            RegistryError::InvalidConfig(format!(
                                "{resource_type} '{name}': attribute '{key}' needs a value"
                            ))
                        })?;
                    resource.attributes.insert(key.to_string(), value);
                }
            }
        }
    }

    Ok(resource)
}
