//! Dependency resolver
//!
//! Orders a [`ResourceGraph`] with Kahn's algorithm. Among instances that
//! are ready at the same time, the one whose type was declared first wins,
//! then the smaller key, so the same graph always yields the same plan.
//! The key is `type/name` for declared instances and `type/id` for the
//! undeclared ones discovery adds, so declared instances order the same
//! before and after they exist.
//! A delete plan is the creation order reversed, with each step waiting for
//! the instances that depended on it.

use crate::error::{CoreError, Result};
use crate::graph::{InstanceKey, ResourceGraph};
use crate::plan::{Action, Direction, OperationPlan, PlanStep};
use stackflow_registry::Registry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// Compute the operation plan for applying `direction` to the whole graph
pub fn resolve(
    graph: &ResourceGraph,
    registry: &Registry,
    direction: Direction,
) -> Result<OperationPlan> {
    let deps = graph.dependencies(registry)?;
    let mut order = creation_order(&deps, registry, graph)?;

    let preds_of: BTreeMap<InstanceKey, BTreeSet<InstanceKey>> = match direction {
        Direction::Create => deps,
        Direction::Delete => {
            order.reverse();
            invert(&deps)
        }
    };

    let position: HashMap<&InstanceKey, usize> =
        order.iter().enumerate().map(|(i, k)| (k, i)).collect();

    let steps = order
        .iter()
        .map(|key| {
            let resource_type = graph
                .get(key)
                .map(|i| i.resource_type.clone())
                .unwrap_or_default();
            let action = match direction {
                Direction::Create => Action::Create,
                Direction::Delete if registry.is_attachment(&resource_type) => Action::Detach,
                Direction::Delete => Action::Delete,
            };
            let mut after: Vec<usize> = preds_of
                .get(key)
                .map(|preds| preds.iter().filter_map(|p| position.get(p).copied()).collect())
                .unwrap_or_default();
            after.sort_unstable();

            PlanStep {
                key: key.clone(),
                resource_type,
                action,
                after,
            }
        })
        .collect();

    let plan = OperationPlan {
        deployment: graph.deployment().to_string(),
        direction,
        steps,
    };
    tracing::debug!(
        deployment = %plan.deployment,
        direction = %direction,
        steps = plan.len(),
        "Resolved plan"
    );
    Ok(plan)
}

/// Kahn's algorithm over `deps` (key -> keys that must come first)
fn creation_order(
    deps: &BTreeMap<InstanceKey, BTreeSet<InstanceKey>>,
    registry: &Registry,
    graph: &ResourceGraph,
) -> Result<Vec<InstanceKey>> {
    let rank = |key: &InstanceKey| -> usize {
        graph
            .get(key)
            .and_then(|i| registry.order_of(&i.resource_type))
            .unwrap_or(usize::MAX)
    };

    let dependents = invert(deps);
    let mut in_degree: BTreeMap<&InstanceKey, usize> =
        deps.iter().map(|(k, preds)| (k, preds.len())).collect();

    let mut ready: BTreeSet<(usize, &InstanceKey)> = in_degree
        .iter()
        .filter(|&(_, &d)| d == 0)
        .map(|(&k, _)| (rank(k), k))
        .collect();

    let mut order = Vec::with_capacity(deps.len());
    while let Some((_, key)) = ready.pop_first() {
        order.push(key.clone());
        if let Some(next) = dependents.get(key) {
            for dependent in next {
                if let Some(degree) = in_degree.get_mut(dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        ready.insert((rank(dependent), dependent));
                    }
                }
            }
        }
    }

    if order.len() < deps.len() {
        let placed: BTreeSet<&InstanceKey> = order.iter().collect();
        let stuck: BTreeSet<&InstanceKey> = deps.keys().filter(|k| !placed.contains(k)).collect();
        let cycle = cycle_members(stuck, &dependents);
        tracing::warn!(instances = ?cycle, "Dependency cycle detected");
        return Err(CoreError::CycleDetected(cycle));
    }

    Ok(order)
}

/// Narrow the unplaceable instances down to the ones on or between cycles
/// by repeatedly dropping those with no dependent left in the set.
fn cycle_members(
    mut stuck: BTreeSet<&InstanceKey>,
    dependents: &BTreeMap<InstanceKey, BTreeSet<InstanceKey>>,
) -> Vec<String> {
    loop {
        let sinks: Vec<&InstanceKey> = stuck
            .iter()
            .copied()
            .filter(|k| {
                dependents
                    .get(*k)
                    .is_none_or(|ds| !ds.iter().any(|d| stuck.contains(d)))
            })
            .collect();
        if sinks.is_empty() {
            break;
        }
        for sink in sinks {
            stuck.remove(sink);
        }
    }
    stuck.into_iter().map(ToString::to_string).collect()
}

fn invert(
    edges: &BTreeMap<InstanceKey, BTreeSet<InstanceKey>>,
) -> BTreeMap<InstanceKey, BTreeSet<InstanceKey>> {
    let mut inverted: BTreeMap<InstanceKey, BTreeSet<InstanceKey>> = edges
        .keys()
        .map(|k| (k.clone(), BTreeSet::new()))
        .collect();
    for (key, targets) in edges {
        for target in targets {
            inverted
                .entry(target.clone())
                .or_default()
                .insert(key.clone());
        }
    }
    inverted
}

#[cfg(test)]
mod tests {
    use super::*;
    use stackflow_cloud::DiscoveredResource;
    use stackflow_registry::{DeclaredResource, Deployment, ResourceTypeDescriptor};

    fn network_registry() -> Registry {
        Registry::from_types(vec![
            ResourceTypeDescriptor::new("network"),
            ResourceTypeDescriptor::new("subnet").depends_on(["network"]),
            ResourceTypeDescriptor::new("security-group")
                .depends_on(["network"])
                .blocked_by(["network-interface"]),
            ResourceTypeDescriptor::new("network-interface").attachment(),
            ResourceTypeDescriptor::new("compute-instance").depends_on(["subnet", "security-group"]),
        ])
        .unwrap()
    }

    fn web_graph() -> ResourceGraph {
        let deployment = Deployment::new("web")
            .with_resource(DeclaredResource::new("compute-instance", "app"))
            .with_resource(DeclaredResource::new("security-group", "app"))
            .with_resource(DeclaredResource::new("subnet", "b"))
            .with_resource(DeclaredResource::new("subnet", "a"))
            .with_resource(DeclaredResource::new("network", "main"));
        ResourceGraph::from_deployment(&deployment)
    }

    fn keys(plan: &OperationPlan) -> Vec<String> {
        plan.keys().map(ToString::to_string).collect()
    }

    #[test]
    fn test_create_order_is_topological_and_deterministic() {
        let plan = resolve(&web_graph(), &network_registry(), Direction::Create).unwrap();
        assert_eq!(
            keys(&plan),
            vec![
                "network/main",
                "subnet/a",
                "subnet/b",
                "security-group/app",
                "compute-instance/app"
            ]
        );
        assert!(plan.steps.iter().all(|s| s.action == Action::Create));

        // compute-instance waits for both subnets and the security group
        assert_eq!(plan.steps[4].after, vec![1, 2, 3]);
    }

    #[test]
    fn test_delete_is_reverse_of_create() {
        let graph = web_graph();
        let registry = network_registry();
        let create = resolve(&graph, &registry, Direction::Create).unwrap();
        let delete = resolve(&graph, &registry, Direction::Delete).unwrap();

        let mut reversed = keys(&create);
        reversed.reverse();
        assert_eq!(keys(&delete), reversed);

        // network is deleted after everything that lives in it
        assert_eq!(delete.steps[4].key.as_str(), "network/main");
        assert_eq!(delete.steps[4].after, vec![1, 2, 3]);
        assert!(delete.steps.iter().all(|s| s.action == Action::Delete));
    }

    #[test]
    fn test_delete_detaches_attachments_first() {
        let registry = network_registry();
        let mut graph = ResourceGraph::new("web");
        graph.merge_discovered(DiscoveredResource::new("network", "vpc-1"));
        graph.merge_discovered(DiscoveredResource::new("subnet", "subnet-1"));
        graph.merge_discovered(DiscoveredResource::new("security-group", "sg-1"));
        let mut eni = DiscoveredResource::new("network-interface", "eni-1");
        eni.attached_to.insert("sg-1".to_string());
        graph.merge_discovered(eni);
        graph.link(&registry).unwrap();

        let plan = resolve(&graph, &registry, Direction::Delete).unwrap();
        let sg = plan.position(&InstanceKey::new("security-group", "sg-1")).unwrap();
        let eni = plan.position(&InstanceKey::new("network-interface", "eni-1")).unwrap();
        assert!(eni < sg);
        assert_eq!(plan.steps[eni].action, Action::Detach);
        assert!(plan.steps[sg].after.contains(&eni));
        assert_eq!(plan.steps.last().unwrap().key.as_str(), "network/vpc-1");
    }

    #[test]
    fn test_cycle_detected() {
        let registry = Registry::from_types(vec![
            ResourceTypeDescriptor::new("network"),
            ResourceTypeDescriptor::new("subnet").depends_on(["network", "security-group"]),
            ResourceTypeDescriptor::new("security-group").depends_on(["subnet"]),
        ])
        .unwrap();
        let deployment = Deployment::new("web")
            .with_resource(DeclaredResource::new("network", "main"))
            .with_resource(DeclaredResource::new("subnet", "a"))
            .with_resource(DeclaredResource::new("security-group", "app"));
        let graph = ResourceGraph::from_deployment(&deployment);

        let err = resolve(&graph, &registry, Direction::Delete).unwrap_err();
        match err {
            CoreError::CycleDetected(instances) => {
                assert_eq!(instances, vec!["security-group/app", "subnet/a"]);
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn test_cycle_members_excludes_downstream() {
        let registry = Registry::from_types(vec![
            ResourceTypeDescriptor::new("a").depends_on(["b"]),
            ResourceTypeDescriptor::new("b").depends_on(["a"]),
            ResourceTypeDescriptor::new("c").depends_on(["a"]),
        ])
        .unwrap();
        let deployment = Deployment::new("web")
            .with_resource(DeclaredResource::new("a", "1"))
            .with_resource(DeclaredResource::new("b", "1"))
            .with_resource(DeclaredResource::new("c", "1"));
        let graph = ResourceGraph::from_deployment(&deployment);

        let err = resolve(&graph, &registry, Direction::Create).unwrap_err();
        assert!(matches!(err, CoreError::CycleDetected(ref i) if i == &vec!["a/1", "b/1"]));
    }

    #[test]
    fn test_empty_graph() {
        let plan = resolve(&ResourceGraph::new("web"), &network_registry(), Direction::Create)
            .unwrap();
        assert!(plan.is_empty());
    }
}
