//! Terminal rendering of plans, progress and reports

use colored::{ColoredString, Colorize};
use stackflow_core::{
    Action, InstanceState, OperationPlan, RunObserver, RunReport, RunStatus, Transition,
};

fn action_marker(action: Action) -> ColoredString {
    let marker = format!("{} {}", action.symbol(), action);
    match action {
        Action::Create => marker.green(),
        Action::Delete => marker.red(),
        Action::Detach => marker.yellow(),
    }
}

fn colored_state(state: InstanceState, width: usize) -> ColoredString {
    let text = format!("{:<width$}", state.to_string());
    match state {
        InstanceState::Ready | InstanceState::Absent | InstanceState::Detached => text.green(),
        InstanceState::Skipped(_) => text.yellow(),
        InstanceState::Failed => text.red().bold(),
        _ => text.normal(),
    }
}

fn colored_status(status: RunStatus) -> ColoredString {
    match status {
        RunStatus::AllSucceeded => status.to_string().green().bold(),
        RunStatus::Partial => status.to_string().yellow().bold(),
        RunStatus::Failed => status.to_string().red().bold(),
    }
}

pub fn print_plan(plan: &OperationPlan) {
    println!(
        "Plan for {} ({}):",
        plan.deployment.cyan().bold(),
        plan.direction
    );

    if plan.is_empty() {
        println!("  Nothing to do");
        return;
    }

    let width = plan.keys().map(|k| k.as_str().len()).max().unwrap_or(0);
    for (index, step) in plan.steps.iter().enumerate() {
        let after = if step.after.is_empty() {
            String::new()
        } else {
            let numbers: Vec<String> = step.after.iter().map(|i| (i + 1).to_string()).collect();
            format!("after {}", numbers.join(", "))
        };
        println!(
            "  {:>3}. {:<8} {:<width$}  {}",
            index + 1,
            action_marker(step.action),
            step.key.as_str(),
            after.dimmed()
        );
    }
    println!();
    println!("{}", plan.summary());
}

/// Prints each transition as the executor records it
pub struct Progress;

impl RunObserver for Progress {
    fn on_transition(&mut self, transition: &Transition) {
        let marker = match transition.to {
            InstanceState::Ready | InstanceState::Absent | InstanceState::Detached => "✓".green(),
            InstanceState::Skipped(_) => "⚠".yellow(),
            InstanceState::Failed => "✗".red(),
            _ => "•".cyan(),
        };
        let note = transition.note.as_deref().unwrap_or_default();
        println!("  {} {} {} {}", marker, transition.key, transition.to, note.dimmed());
    }
}

pub fn print_report(report: &RunReport) {
    let mode = if report.dry_run { " (dry run)" } else { "" };
    println!(
        "Run {} {} {}{}",
        report.run_id.cyan(),
        report.direction,
        report.deployment.bold(),
        mode
    );

    if !report.outcomes.is_empty() {
        let type_width = column_width("TYPE", report.outcomes.iter().map(|o| o.resource_type.len()));
        let id_width = column_width("ID", report.outcomes.iter().map(|o| o.id.len()));
        let state_width = column_width(
            "STATE",
            report.outcomes.iter().map(|o| o.state.to_string().len()),
        );

        println!();
        println!(
            "  {:<type_width$}  {:<id_width$}  {:<state_width$}  {}",
            "TYPE".bold(),
            "ID".bold(),
            "STATE".bold(),
            "DETAIL".bold()
        );
        for outcome in &report.outcomes {
            let mut detail = outcome.detail();
            if let Some(kind) = outcome.error_kind
                && outcome.state == InstanceState::Failed
            {
                detail = format!("{detail} [{kind}]");
            }
            println!(
                "  {:<type_width$}  {:<id_width$}  {}  {}",
                outcome.resource_type,
                outcome.id,
                colored_state(outcome.state, state_width),
                detail
            );
        }
    }

    println!();
    if let Some(reason) = &report.aborted {
        println!("{} {}", "Aborted:".red().bold(), reason);
    }
    if report.cancelled {
        println!("{}", "Cancelled before every step started".yellow());
    }
    println!(
        "{}: {} succeeded, {} failed, {} skipped in {} ms",
        colored_status(report.status),
        report.succeeded(),
        report.failed(),
        report.skipped(),
        report.duration_ms()
    );
}

fn column_width(header: &str, widths: impl Iterator<Item = usize>) -> usize {
    widths.max().unwrap_or(0).max(header.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_width() {
        assert_eq!(column_width("ID", [3, 8, 5].into_iter()), 8);
        assert_eq!(column_width("STATE", [2].into_iter()), 5);
        assert_eq!(column_width("TYPE", std::iter::empty()), 4);
    }
}
