//! Console rendering for `--show-plan` and `--status`.

use colored::Colorize;
use tabled::settings::Style;
use tabled::{Table, Tabled};

use crate::action::RebootPoint;
use crate::check::{CheckResult, CheckStatus};
use crate::plan::Plan;
use crate::state::{CompletionRecord, CompletionResult, RunState};

#[derive(Tabled)]
struct CheckRow {
    #[tabled(rename = "CHECK")]
    name: String,
    #[tabled(rename = "STATUS")]
    status: String,
    #[tabled(rename = "DETAILS")]
    details: String,
}

#[derive(Tabled)]
struct StatusRow {
    #[tabled(rename = "FIELD")]
    field: &'static str,
    #[tabled(rename = "VALUE")]
    value: String,
}

/// Print the stages and actions of `plan`.
pub fn print_plan(plan: &Plan) {
    println!();
    println!(
        "{}",
        format!("Upgrade plan for phase '{}'", plan.phase()).bold()
    );
    println!("{}", "-".repeat(60));

    for (index, stage) in plan.stages().iter().enumerate() {
        println!(
            "{}",
            format!("Stage [{}/{}]: {}", index + 1, plan.len(), stage.name)
                .cyan()
                .bold()
        );
        for action in &stage.actions {
            let reboot = match action.reboot_request(plan.phase()) {
                Some(request) => {
                    let when = match request.point {
                        RebootPoint::AfterCurrentStage => "after this stage",
                        RebootPoint::AfterLastStage => "after the last stage",
                    };
                    match request.next_phase {
                        Some(next) => format!(" [reboot {when}, continue in {next}]"),
                        None => format!(" [reboot {when}]"),
                    }
                }
                None => String::new(),
            };
            println!(
                "  - {}: {}{}",
                action.name(),
                action.description(),
                reboot.yellow()
            );
        }
    }
    println!();
}

/// Print pre-flight check results as a table.
pub fn print_check_results(results: &[CheckResult]) {
    if results.is_empty() {
        println!("No pre-flight checks for this phase");
        return;
    }
    let rows: Vec<CheckRow> = results
        .iter()
        .map(|r| CheckRow {
            name: r.name.clone(),
            status: match r.status {
                CheckStatus::Pass => r.status.to_string().green().to_string(),
                CheckStatus::Fail => r.status.to_string().red().to_string(),
            },
            details: match r.status {
                CheckStatus::Pass => String::new(),
                CheckStatus::Fail => r.description.clone(),
            },
        })
        .collect();
    println!("{}", "Pre-flight checks:".bold());
    println!("{}", Table::new(&rows).with(Style::sharp()));
}

/// Print the persisted run state and the completion record, if any.
pub fn print_status(state: Option<&RunState>, completion: Option<&CompletionRecord>) {
    let mut rows = Vec::new();
    match state {
        Some(state) => {
            rows.push(StatusRow {
                field: "upgrader",
                value: state.upgrader.clone(),
            });
            rows.push(StatusRow {
                field: "phase",
                value: state.phase.to_string(),
            });
            rows.push(StatusRow {
                field: "last completed stage",
                value: state
                    .last_completed_stage
                    .clone()
                    .unwrap_or_else(|| "-".to_string()),
            });
            rows.push(StatusRow {
                field: "completed",
                value: state.completed.to_string(),
            });
            rows.push(StatusRow {
                field: "updated at",
                value: state.updated_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
            });
        }
        None => println!("{}", "No upgrade in progress".dimmed()),
    }

    if let Some(record) = completion {
        let result = match record.result {
            CompletionResult::Success => record.result.to_string().green().to_string(),
            CompletionResult::Failure => record.result.to_string().red().to_string(),
        };
        rows.push(StatusRow {
            field: "result",
            value: result,
        });
        if let Some(message) = &record.message {
            rows.push(StatusRow {
                field: "message",
                value: message.clone(),
            });
        }
        rows.push(StatusRow {
            field: "finished at",
            value: record.finished_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        });
    }

    if !rows.is_empty() {
        println!("{}", Table::new(&rows).with(Style::sharp()));
    }
}
