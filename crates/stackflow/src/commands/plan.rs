use crate::output;
use crate::project::{self, Gateway, Overrides, Project};
use colored::Colorize;
use stackflow_core::{Direction, discover, resolve};
use std::process::ExitCode;

pub async fn handle(
    project: &Project,
    deployment: &str,
    direction: Direction,
) -> anyhow::Result<ExitCode> {
    let settings = project::load_settings(Overrides::default())?;
    let gateway = Gateway::connect(project).await?;

    println!(
        "{} {} against {}",
        "Discovering".blue(),
        deployment.cyan(),
        project.registry.provider.name()
    );
    let graph = discover(
        gateway.shared().as_ref(),
        &project.registry,
        deployment,
        direction,
        &project::retry_config(&settings),
        settings.call_timeout(),
    )
    .await?;
    let plan = resolve(&graph, &project.registry, direction)?;

    println!();
    output::print_plan(&plan);
    Ok(ExitCode::SUCCESS)
}
