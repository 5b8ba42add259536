//! Building the resource graph of a scope from the registry and the provider

use crate::error::{CoreError, Result};
use crate::graph::{InstanceKey, ResourceGraph};
use crate::plan::Direction;
use crate::retry::with_retry;
use stackflow_cloud::{CloudGateway, DiscoveredResource, Filter, RetryConfig};
use stackflow_registry::Registry;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Discover the instances of `deployment` that a `direction` run covers
///
/// - Create: the declared instances, each looked up by name so that already
///   existing resources are recognised.
/// - Delete: the declared instances plus everything the provider reports for
///   the deployment, plus the attachments holding any of them.
pub async fn discover(
    gateway: &dyn CloudGateway,
    registry: &Registry,
    deployment: &str,
    direction: Direction,
    retry: &RetryConfig,
    call_timeout: Option<Duration>,
) -> Result<ResourceGraph> {
    let declared = registry.deployment(deployment)?;
    let mut graph = ResourceGraph::from_deployment(declared);

    match direction {
        Direction::Create => {
            for resource in &declared.resources {
                let filter = Filter::deployment(deployment).with_name(resource.name.clone());
                let mut found = describe(gateway, &resource.resource_type, &filter, retry, call_timeout)
                    .await?
                    .into_iter()
                    .filter(|r| !r.is_terminated());
                if let Some(existing) = found.next() {
                    if found.next().is_some() {
                        warn!(
                            resource_type = %resource.resource_type,
                            name = %resource.name,
                            "Several live resources share this name, using the first"
                        );
                    }
                    graph.merge_discovered(existing);
                }
            }
        }
        Direction::Delete => {
            for descriptor in registry.types().iter().filter(|t| !t.attachment) {
                let filter = Filter::deployment(deployment);
                for found in describe(gateway, &descriptor.name, &filter, retry, call_timeout).await? {
                    graph.merge_discovered(found);
                }
            }
            discover_attachments(gateway, registry, &mut graph, retry, call_timeout).await?;
        }
    }

    graph.link(registry)?;
    info!(
        deployment,
        direction = %direction,
        instances = graph.len(),
        existing = graph.iter().filter(|i| i.exists()).count(),
        "Discovery complete"
    );
    Ok(graph)
}

/// Find the blocking attachments of every live holder in the graph
async fn discover_attachments(
    gateway: &dyn CloudGateway,
    registry: &Registry,
    graph: &mut ResourceGraph,
    retry: &RetryConfig,
    call_timeout: Option<Duration>,
) -> Result<()> {
    let holders: Vec<(InstanceKey, String, Vec<String>)> = graph
        .iter()
        .filter(|i| i.exists())
        .filter_map(|i| {
            let blockers = &registry.get(&i.resource_type)?.blocked_by;
            let id = i.id.clone()?;
            (!blockers.is_empty()).then(|| (i.key.clone(), id, blockers.clone()))
        })
        .collect();

    for (holder, holder_id, blockers) in holders {
        for blocker in blockers {
            let filter = Filter::attached_to(holder_id.clone());
            for mut found in describe(gateway, &blocker, &filter, retry, call_timeout).await? {
                found.attached_to.insert(holder_id.clone());
                let key = graph.merge_discovered(found);
                debug!(attachment = %key, holder = %holder, "Discovered attachment");
            }
        }
    }
    Ok(())
}

async fn describe(
    gateway: &dyn CloudGateway,
    resource_type: &str,
    filter: &Filter,
    retry: &RetryConfig,
    call_timeout: Option<Duration>,
) -> Result<Vec<DiscoveredResource>> {
    let attempted = with_retry(retry, call_timeout, "describe", || {
        gateway.describe(resource_type, filter)
    })
    .await;

    match attempted.result {
        Ok(found) => Ok(found),
        Err(err) if err.is_not_found() => Ok(Vec::new()),
        Err(source) => Err(CoreError::Discovery {
            resource_type: resource_type.to_string(),
            source,
        }),
    }
}
