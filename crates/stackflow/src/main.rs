mod commands;
mod output;
mod project;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use colored::Colorize;
use stackflow_config::ConfigError;
use stackflow_core::{CoreError, Direction};
use stackflow_registry::RegistryError;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "stack")]
#[command(about = "Create and tear down cloud resource stacks in dependency order", long_about = None)]
struct Cli {
    /// Topology file (default: stack.kdl in this directory or a parent)
    #[arg(short, long, global = true)]
    file: Option<PathBuf>,

    /// More log output on stderr (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the ordered steps a run would take, without changing anything
    Plan {
        /// Deployment to plan
        deployment: String,
        /// Goal for every resource of the deployment
        #[arg(value_enum)]
        direction: DirectionArg,
    },
    /// Create or delete every resource of a deployment
    Apply {
        /// Deployment to apply
        deployment: String,
        /// Goal for every resource of the deployment
        #[arg(value_enum)]
        direction: DirectionArg,
        /// Maximum number of steps in flight
        #[arg(short, long)]
        workers: Option<usize>,
        /// Attempts per gateway call, including the first
        #[arg(long)]
        max_attempts: Option<u32>,
        /// Walk the plan without calling the provider
        #[arg(long)]
        dry_run: bool,
        /// Do not keep the run report under .stackflow/runs
        #[arg(long)]
        no_archive: bool,
    },
    /// Check the topology file and the dependency order of every deployment
    Validate,
    /// Show archived run reports
    Report {
        /// Run id (default: the most recent run)
        run_id: Option<String>,
        /// Print the raw JSON report
        #[arg(long)]
        json: bool,
        /// List archived run ids
        #[arg(long, conflicts_with_all = ["run_id", "json"])]
        list: bool,
    },
    /// Show version information
    Version,
}

#[derive(Clone, Copy, ValueEnum)]
enum DirectionArg {
    Create,
    Delete,
}

impl From<DirectionArg> for Direction {
    fn from(arg: DirectionArg) -> Self {
        match arg {
            DirectionArg::Create => Direction::Create,
            DirectionArg::Delete => Direction::Delete,
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => tracing::Level::WARN,
        1 => tracing::Level::INFO,
        _ => tracing::Level::DEBUG,
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

/// 3 for problems in the topology or settings, 2 for everything else
fn exit_code_for(err: &anyhow::Error) -> u8 {
    let configuration = err.chain().any(|cause| {
        cause
            .downcast_ref::<CoreError>()
            .is_some_and(CoreError::is_configuration)
            || cause.is::<RegistryError>()
            || cause.is::<ConfigError>()
    });
    if configuration { 3 } else { 2 }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {:#}", "Error:".red().bold(), err);
            ExitCode::from(exit_code_for(&err))
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let file = cli.file;
    let load = || project::Project::load(file.as_deref());

    match cli.command {
        // Version needs no topology
        Commands::Version => {
            println!("stackflow {}", env!("CARGO_PKG_VERSION"));
            Ok(ExitCode::SUCCESS)
        }
        Commands::Plan {
            deployment,
            direction,
        } => commands::plan::handle(&load()?, &deployment, direction.into()).await,
        Commands::Apply {
            deployment,
            direction,
            workers,
            max_attempts,
            dry_run,
            no_archive,
        } => {
            let args = commands::apply::ApplyArgs {
                deployment,
                direction: direction.into(),
                overrides: project::Overrides {
                    workers,
                    max_attempts,
                },
                dry_run,
                archive: !no_archive,
            };
            commands::apply::handle(&load()?, args).await
        }
        Commands::Validate => commands::validate::handle(&load()?),
        Commands::Report { run_id, json, list } => {
            commands::report::handle(&load()?, run_id.as_deref(), json, list).await
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_exit_code_for_configuration_errors() {
        let cycle = anyhow::Error::new(CoreError::CycleDetected(vec!["a/x".to_string()]));
        assert_eq!(exit_code_for(&cycle), 3);

        let missing = anyhow::Error::new(RegistryError::DeploymentNotFound("prod".to_string()))
            .context("failed to plan");
        assert_eq!(exit_code_for(&missing), 3);

        let lock = anyhow::Error::new(CoreError::LockError("held".to_string()));
        assert_eq!(exit_code_for(&lock), 2);
    }

    #[test]
    fn test_apply_arguments() {
        let cli = Cli::try_parse_from([
            "stack", "apply", "web", "delete", "--workers", "2", "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Apply {
                deployment,
                direction,
                workers,
                dry_run,
                ..
            } => {
                assert_eq!(deployment, "web");
                assert_eq!(Direction::from(direction), Direction::Delete);
                assert_eq!(workers, Some(2));
                assert!(dry_run);
            }
            _ => panic!("Expected apply"),
        }
    }
}
