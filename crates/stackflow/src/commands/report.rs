use crate::output;
use crate::project::Project;
use colored::Colorize;
use stackflow_core::ReportArchive;
use std::process::ExitCode;

pub async fn handle(
    project: &Project,
    run_id: Option<&str>,
    json: bool,
    list: bool,
) -> anyhow::Result<ExitCode> {
    let archive = ReportArchive::new(&project.root);

    if list {
        let ids = archive.list().await?;
        if ids.is_empty() {
            println!("No archived runs");
        }
        for id in ids {
            println!("{id}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let report = match run_id {
        Some(id) => archive.load(id).await?,
        None => match archive.latest().await? {
            Some(report) => report,
            None => {
                println!("{} No archived runs", "ℹ".blue());
                return Ok(ExitCode::SUCCESS);
            }
        },
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        output::print_report(&report);
    }
    Ok(ExitCode::SUCCESS)
}
