//! Display formatting for CLI output
//!
//! One status line per resource while an apply runs, then a summary.

use console::style;
use kapply_kube::{ApplyReport, OutcomeObserver, ReconcileOutcome, ResourceOutcome};

/// Prints each outcome to stdout as it arrives
pub struct ConsoleObserver;

impl OutcomeObserver for ConsoleObserver {
    fn on_outcome(&self, outcome: &ResourceOutcome) {
        println!("{}", status_line(outcome));
    }
}

/// e.g. `✓ Service team-a/svc-prod created`
pub fn status_line(outcome: &ResourceOutcome) -> String {
    let target = style(outcome.display_name()).cyan();
    match &outcome.outcome {
        ReconcileOutcome::Created => {
            format!("{} {} {}", style("✓").green().bold(), target, style("created").green())
        }
        ReconcileOutcome::Updated => {
            format!("{} {} {}", style("✓").blue().bold(), target, style("updated").blue())
        }
        ReconcileOutcome::Skipped { reason } => format!(
            "{} {} {} {}",
            style("⚠").yellow(),
            target,
            style("skipped").yellow(),
            style(format!("({})", reason)).dim()
        ),
        ReconcileOutcome::Failed { reason } => format!(
            "{} {} {}\n    {} {}",
            style("✗").red().bold(),
            target,
            style("failed").red(),
            style("error:").red(),
            reason
        ),
    }
}

pub fn print_summary(report: &ApplyReport) {
    let icon = if report.has_failures() {
        style("✗").red().bold()
    } else {
        style("✓").green().bold()
    };
    println!();
    println!("{} {}", icon, report.summary());
}
