use crate::output::{self, Progress};
use crate::project::{self, Gateway, Overrides, Project};
use anyhow::Context;
use colored::Colorize;
use stackflow_core::{
    CancellationToken, Direction, Executor, ReportArchive, discover, resolve,
};
use std::process::ExitCode;

pub struct ApplyArgs {
    pub deployment: String,
    pub direction: Direction,
    pub overrides: Overrides,
    pub dry_run: bool,
    pub archive: bool,
}

pub async fn handle(project: &Project, args: ApplyArgs) -> anyhow::Result<ExitCode> {
    let settings = project::load_settings(args.overrides)?;
    let options = project::execute_options(&settings, args.dry_run);
    let archive = ReportArchive::new(&project.root);

    // A dry run changes nothing, so it does not take the lock
    let lock = if args.dry_run {
        None
    } else {
        Some(archive.acquire_lock().await?)
    };

    let gateway = Gateway::connect(project).await?;
    println!(
        "{} {} against {}",
        "Discovering".blue(),
        args.deployment.cyan(),
        project.registry.provider.name()
    );
    let mut graph = discover(
        gateway.shared().as_ref(),
        &project.registry,
        &args.deployment,
        args.direction,
        &options.retry,
        options.call_timeout,
    )
    .await?;
    let plan = resolve(&graph, &project.registry, args.direction)?;

    println!();
    output::print_plan(&plan);
    println!();

    let cancel = CancellationToken::new();
    let signal = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                eprintln!(
                    "{}",
                    "Interrupted: waiting for in-flight steps, starting no new ones".yellow()
                );
                cancel.cancel();
            }
        })
    };

    let executor = Executor::new(gateway.shared(), options);
    let report = executor
        .run(&project.registry, &mut graph, &plan, &cancel, &mut Progress)
        .await;
    signal.abort();

    if !args.dry_run {
        gateway.persist().await?;
    }

    println!();
    output::print_report(&report);

    if settings.archive && args.archive {
        let path = archive
            .save(&report)
            .await
            .context("failed to archive run report")?;
        tracing::info!(path = %path.display(), "Run report archived");
    }

    if let Some(lock) = lock {
        lock.release().await?;
    }

    Ok(ExitCode::from(report.exit_code() as u8))
}
