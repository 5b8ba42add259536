//! Cloud gateway trait definition

use crate::error::GatewayResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

/// Cloud gateway abstraction trait
///
/// Every provider (AWS, the in-memory simulator) implements this trait.
/// Resource types are passed as registry type names such as `"network"` or
/// `"security-group"`; a provider that does not know a type answers with
/// [`ErrorKind::Validation`](crate::ErrorKind::Validation).
#[async_trait]
pub trait CloudGateway: Send + Sync {
    /// Returns the provider name (e.g., "aws", "memory")
    fn name(&self) -> &str;

    /// List the live resources of a type matching the filter
    async fn describe(
        &self,
        resource_type: &str,
        filter: &Filter,
    ) -> GatewayResult<Vec<DiscoveredResource>>;

    /// Create a resource and return its provider-assigned id
    ///
    /// `parent_ids` maps parent resource types to the provider ids of the
    /// already created parents.
    async fn create(
        &self,
        resource_type: &str,
        spec: &ResourceSpec,
        parent_ids: &BTreeMap<String, String>,
    ) -> GatewayResult<String>;

    /// Delete a resource by provider id
    async fn delete(&self, resource_type: &str, id: &str) -> GatewayResult<()>;

    /// Release resource `id` from the resource `from_parent_id` it is attached to
    async fn detach(&self, resource_type: &str, id: &str, from_parent_id: &str)
    -> GatewayResult<()>;
}

/// Describe filter. Unset fields match everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    /// Deployment tag the resource carries
    pub deployment: Option<String>,

    /// Logical name the resource carries
    pub name: Option<String>,

    /// Provider id
    pub id: Option<String>,

    /// Provider id of a resource this one is attached to
    pub attached_to: Option<String>,
}

impl Filter {
    pub fn deployment(deployment: impl Into<String>) -> Self {
        Self {
            deployment: Some(deployment.into()),
            ..Default::default()
        }
    }

    pub fn id(id: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            ..Default::default()
        }
    }

    pub fn attached_to(holder_id: impl Into<String>) -> Self {
        Self {
            attached_to: Some(holder_id.into()),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

/// Everything a provider needs to create one resource
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Deployment (scope) the resource belongs to
    pub deployment: String,

    /// Logical name, unique per type within the deployment
    pub name: String,

    /// Provider-specific attributes (e.g. `cidr-block`)
    pub attributes: BTreeMap<String, String>,
}

impl ResourceSpec {
    pub fn new(deployment: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            deployment: deployment.into(),
            name: name.into(),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Provider-side lifecycle of a discovered resource
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifecycle {
    #[default]
    Active,
    /// Still listed by the provider but already gone for all purposes
    Terminated,
}

/// A resource as reported by [`CloudGateway::describe`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveredResource {
    /// Provider-assigned id
    pub id: String,

    /// Registry type name
    pub resource_type: String,

    /// Deployment tag, if the resource carries one
    pub deployment: Option<String>,

    /// Logical name, if the resource carries one
    pub name: Option<String>,

    /// Parent type -> parent provider id
    #[serde(default)]
    pub parent_ids: BTreeMap<String, String>,

    /// Provider ids of resources this one is attached to
    #[serde(default)]
    pub attached_to: BTreeSet<String>,

    /// Whether the provider will refuse to delete the resource
    #[serde(default)]
    pub protected: bool,

    #[serde(default)]
    pub lifecycle: Lifecycle,
}

impl DiscoveredResource {
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
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.lifecycle == Lifecycle::Terminated
    }
}

/// Retry configuration for gateway operations
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,

    /// Initial delay between retries
    pub initial_delay: Duration,

    /// Maximum delay between retries
    pub max_delay: Duration,

    /// Backoff multiplier
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// No waiting between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            initial_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay before retry number `attempt` (0-based), capped at `max_delay`
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_secs_f64(delay).min(self.max_delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_for_attempt() {
        let config = RetryConfig {
            max_attempts: 6,
            initial_delay: Duration::from_millis(1000),
            max_delay: Duration::from_millis(10000),
            backoff_multiplier: 2.0,
        };

        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(2000));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(4000));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(8000));
        assert_eq!(config.delay_for_attempt(4), Duration::from_millis(10000)); // capped at max
    }

    #[test]
    fn test_immediate_never_waits() {
        let config = RetryConfig::immediate(5);
        assert_eq!(config.delay_for_attempt(3), Duration::ZERO);
    }

    #[test]
    fn test_filter_builders() {
        let filter = Filter::deployment("web").with_name("main");
        assert_eq!(filter.deployment.as_deref(), Some("web"));
        assert_eq!(filter.name.as_deref(), Some("main"));
        assert!(filter.id.is_none());
    }
}
