use crate::project::Project;
use colored::Colorize;
use stackflow_core::{Direction, ResourceGraph, resolve};
use std::process::ExitCode;

/// Check the topology without contacting the provider
pub fn handle(project: &Project) -> anyhow::Result<ExitCode> {
    println!("{}", "Validating topology...".blue());
    println!("Topology: {}", project.topology.display().to_string().cyan());
    println!("Project: {}", project.name().cyan());
    println!("Provider: {}", project.registry.provider.name());
    println!();

    let types = project.registry.types();
    println!("Resource types: {}", types.len());
    for descriptor in types {
        let mut relations = Vec::new();
        if !descriptor.depends_on.is_empty() {
            relations.push(format!("depends on {}", descriptor.depends_on.join(", ")));
        }
        if !descriptor.blocked_by.is_empty() {
            relations.push(format!("blocked by {}", descriptor.blocked_by.join(", ")));
        }
        if descriptor.attachment {
            relations.push("attachment".to_string());
        }
        if relations.is_empty() {
            println!("  • {}", descriptor.name.cyan());
        } else {
            println!("  • {} ({})", descriptor.name.cyan(), relations.join("; "));
        }
    }

    println!();
    let mut deployments = 0;
    for deployment in project.registry.deployments() {
        deployments += 1;
        let mut graph = ResourceGraph::from_deployment(deployment);
        graph.link(&project.registry)?;
        let plan = resolve(&graph, &project.registry, Direction::Create)?;
        println!(
            "  {} {}: {} resources, {} steps to create",
            "✓".green(),
            deployment.name.cyan(),
            graph.len(),
            plan.len()
        );
    }
    if deployments == 0 {
        println!("  {} No deployments declared", "ℹ".blue());
    }

    println!();
    println!("{}", "✓ Topology is valid".green().bold());
    Ok(ExitCode::SUCCESS)
}
